use anyhow::{bail, Context, Result};
use clap::Parser;
use image::Rgb;
use seeds_rust::arrays::SampleImage;
use seeds_rust::common::{Binning, Config, Geometry, PixelUpdate};
use seeds_rust::draw;
use seeds_rust::export;
use seeds_rust::seeds::{count_superpixels, iterate, Segmentation};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image file or directory with .png/.jpg/.jpeg images
    input: PathBuf,

    /// Requested number of superpixels
    #[arg(short, long, default_value_t = 400)]
    superpixels: usize,

    /// Histogram bins per color channel
    #[arg(short, long, default_value_t = 5)]
    bins: usize,

    /// Half-width of the smoothing prior window, 0 disables the prior
    #[arg(long, default_value_t = 1)]
    neighborhood: usize,

    /// Minimum score margin for a block move
    #[arg(long, default_value_t = 0.1)]
    confidence: f32,

    /// Weight of the spatial term in mean pixel scoring
    #[arg(long, default_value_t = 0.25)]
    spatial_weight: f32,

    /// Sweeps per block level, the pixel level runs twice as many
    #[arg(short, long, default_value_t = 2)]
    iterations: u32,

    /// Bin sample values uniformly instead of equalizing over the image
    #[arg(long)]
    uniform: bool,

    /// Score pixel moves against histograms instead of running means
    #[arg(long)]
    histogram_scoring: bool,

    /// Write <stem>_contours.png with superpixel boundaries drawn in
    #[arg(long)]
    contour: bool,

    /// Write <stem>_mean.png with every superpixel filled by its mean color
    #[arg(long)]
    mean: bool,

    /// Write <stem>.csv with the label grid
    #[arg(long)]
    csv: bool,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let images = collect_images(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    if images.is_empty() {
        bail!("no .png/.jpg/.jpeg images under {}", args.input.display());
    }
    tracing::info!("{} images to segment", images.len());

    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    let config = Config {
        number_of_bins: args.bins,
        binning: if args.uniform {
            Binning::Uniform
        } else {
            Binning::Equalized
        },
        pixel_update: if args.histogram_scoring {
            PixelUpdate::Histogram
        } else {
            PixelUpdate::MeanPixel
        },
        neighborhood_size: args.neighborhood,
        minimum_confidence: args.confidence,
        spatial_weight: args.spatial_weight,
        iterations: args.iterations,
        ..Config::default()
    };

    let mut total_seconds = 0.0f64;
    let mut segmented = 0usize;
    for path in &images {
        match process_image(path, &args, &config) {
            Ok(seconds) => {
                total_seconds += seconds;
                segmented += 1;
            }
            Err(error) => tracing::error!("{}: {error:#}", path.display()),
        }
    }
    if segmented > 0 {
        tracing::info!(
            "segmented {} images, {:.3} seconds per image on average",
            segmented,
            total_seconds / segmented as f64
        );
    }
    Ok(())
}

fn collect_images(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut images = Vec::new();
    for entry in fs::read_dir(input)? {
        let path = entry?.path();
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.to_ascii_lowercase());
        if matches!(extension.as_deref(), Some("png" | "jpg" | "jpeg")) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

fn process_image(path: &Path, args: &Args, config: &Config) -> Result<f64> {
    let decoded =
        image::open(path).with_context(|| format!("failed to decode {}", path.display()))?;
    let rgb = decoded.to_rgb8();
    let width = rgb.width() as usize;
    let height = rgb.height() as usize;
    let image = SampleImage::from_srgb(rgb.as_raw(), width, height);
    let geometry = Geometry::for_superpixel_count(width, height, args.superpixels)?;

    let start = Instant::now();
    let mut segmentation = Segmentation::initialize(&image, &geometry, config)?;
    iterate(&image, config, &mut segmentation);
    let seconds = start.elapsed().as_secs_f64();

    tracing::info!(
        "{}: {} superpixels in {:.3}s",
        path.display(),
        count_superpixels(segmentation.labels()),
        seconds
    );

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("image");
    if args.contour {
        let mut contours = rgb.clone();
        draw::contour_image(&mut contours, segmentation.labels(), Rgb([204, 0, 0]));
        let target = args.output.join(format!("{stem}_contours.png"));
        contours
            .save(&target)
            .with_context(|| format!("failed to write {}", target.display()))?;
    }
    if args.mean {
        let target = args.output.join(format!("{stem}_mean.png"));
        draw::mean_image(&rgb, segmentation.labels())
            .save(&target)
            .with_context(|| format!("failed to write {}", target.display()))?;
    }
    if args.csv {
        let target = args.output.join(format!("{stem}.csv"));
        let file = fs::File::create(&target)
            .with_context(|| format!("failed to write {}", target.display()))?;
        let mut writer = BufWriter::new(file);
        export::write_csv(&mut writer, segmentation.labels())
            .and_then(|_| writer.flush())
            .with_context(|| format!("failed to write {}", target.display()))?;
    }
    Ok(seconds)
}
