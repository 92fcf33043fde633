use criterion::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seeds_rust::arrays::SampleImage;
use seeds_rust::block::block_sweep;
use seeds_rust::common::{Config, Geometry, PixelUpdate};
use seeds_rust::pixel::pixel_sweep;
use seeds_rust::seeds::{iterate, Segmentation};
use std::time::Duration;

/// Seeded patchwork of flat regions with a gradient and some noise, so the
/// sweeps have real edges to settle on and every run sees the same image.
fn synthetic_rgb(width: usize, height: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(24);
    let mut data = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        for col in 0..width {
            let patch = ((row / 60 + col / 60) % 5) as u8 * 50;
            data.push(patch.saturating_add(rng.gen_range(0..20)));
            data.push((col * 255 / width) as u8);
            data.push((row * 255 / height) as u8);
        }
    }
    data
}

fn bench_srgb_conversion(c: &mut Criterion) {
    sas::init();
    let width = 1920;
    let height = 1080;
    let rgb = synthetic_rgb(width, height);
    c.bench_function("srgb_to_cielab", |b| {
        b.iter(|| {
            let _ = black_box(SampleImage::from_srgb(&rgb, width, height));
        });
    });
}

fn bench_initialize(c: &mut Criterion) {
    sas::init();
    let width = 1920;
    let height = 1080;
    let rgb = synthetic_rgb(width, height);
    let image = SampleImage::from_srgb(&rgb, width, height);
    let geometry = Geometry::for_superpixel_count(width, height, 400).unwrap();
    let config = Config::default();
    c.bench_function("initialize", |b| {
        b.iter(|| {
            let _ = black_box(Segmentation::initialize(&image, &geometry, &config).unwrap());
        });
    });
}

fn bench_block_sweep(c: &mut Criterion) {
    sas::init();
    let width = 1920;
    let height = 1080;
    let rgb = synthetic_rgb(width, height);
    let image = SampleImage::from_srgb(&rgb, width, height);
    let geometry = Geometry::for_superpixel_count(width, height, 400).unwrap();
    let config = Config::default();
    let mut segmentation = Segmentation::initialize(&image, &geometry, &config).unwrap();
    c.bench_function("block_sweep", |b| {
        b.iter(|| {
            let _ = black_box(block_sweep(&config, &mut segmentation));
        });
    });
}

fn bench_pixel_sweep(c: &mut Criterion) {
    sas::init();
    let width = 1920;
    let height = 1080;
    let rgb = synthetic_rgb(width, height);
    let image = SampleImage::from_srgb(&rgb, width, height);
    let geometry = Geometry::for_superpixel_count(width, height, 400).unwrap();
    let mut group = c.benchmark_group("pixel sweep");
    let variants = [PixelUpdate::Histogram, PixelUpdate::MeanPixel];
    for variant in variants {
        let config = Config {
            pixel_update: variant,
            ..Config::default()
        };
        let mut segmentation = Segmentation::initialize(&image, &geometry, &config).unwrap();
        iterate(&image, &config, &mut segmentation);
        group.bench_with_input(
            BenchmarkId::new("pixel_sweep", format!("{:?}", variant)),
            &config,
            |b, config| {
                b.iter(|| {
                    let _ = black_box(pixel_sweep(config, &mut segmentation));
                });
            },
        );
    }
}

fn bench_segment(c: &mut Criterion) {
    sas::init();
    let sizes = [
        (960usize, 540usize, "SD"),
        (1280, 720, "HD"),
        (1920, 1080, "FHD"),
    ];
    let mut group = c.benchmark_group("segment");
    for (width, height, name) in sizes {
        let rgb = synthetic_rgb(width, height);
        let image = SampleImage::from_srgb(&rgb, width, height);
        let geometry = Geometry::for_superpixel_count(width, height, 400).unwrap();
        let config = Config::default();
        group.bench_with_input(BenchmarkId::new("iterate", name), &config, |b, config| {
            b.iter(|| {
                let mut segmentation =
                    Segmentation::initialize(&image, &geometry, config).unwrap();
                let _ = black_box(iterate(&image, config, &mut segmentation));
            });
        });
    }
}

criterion_group!(name = benches;
config = Criterion::default().measurement_time(Duration::from_secs(30)).warm_up_time(Duration::from_secs(10));
targets = bench_srgb_conversion);
criterion_group!(name = benches1;
config = Criterion::default().measurement_time(Duration::from_secs(30)).warm_up_time(Duration::from_secs(10));
targets = bench_initialize);
criterion_group!(name = benches2;
config = Criterion::default().measurement_time(Duration::from_secs(30)).warm_up_time(Duration::from_secs(10));
targets = bench_block_sweep, bench_pixel_sweep);
criterion_group!(name = benches3;
config = Criterion::default().measurement_time(Duration::from_secs(30)).warm_up_time(Duration::from_secs(10));
targets = bench_segment);
criterion_main!(benches, benches1, benches2, benches3);
