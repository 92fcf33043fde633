use crate::arrays::Array2D;
use crate::seeds::UNASSIGNED;
use image::{Rgb, RgbImage};
use rand::Rng;

/// Paints every pixel that touches a different label with `color`. Boundaries
/// come out two pixels wide since both sides of an edge qualify.
pub fn contour_image(image: &mut RgbImage, labels: &Array2D<u32>, color: Rgb<u8>) {
    debug_assert_eq!(image.width() as usize, labels.width);
    debug_assert_eq!(image.height() as usize, labels.height);
    for i in 0..labels.height {
        for j in 0..labels.width {
            let label = labels[(i, j)];
            let boundary = (i > 0 && labels[(i - 1, j)] != label)
                || (i + 1 < labels.height && labels[(i + 1, j)] != label)
                || (j > 0 && labels[(i, j - 1)] != label)
                || (j + 1 < labels.width && labels[(i, j + 1)] != label);
            if boundary {
                image.put_pixel(j as u32, i as u32, color);
            }
        }
    }
}

/// Renders every superpixel filled with its mean color.
pub fn mean_image(image: &RgbImage, labels: &Array2D<u32>) -> RgbImage {
    debug_assert_eq!(image.width() as usize, labels.width);
    debug_assert_eq!(image.height() as usize, labels.height);
    let slots = max_label(labels) + 1;
    let mut sums = vec![[0u64; 3]; slots];
    let mut counts = vec![0u64; slots];
    for i in 0..labels.height {
        for j in 0..labels.width {
            let label = labels[(i, j)] as usize;
            let pixel = image.get_pixel(j as u32, i as u32);
            for (sum, &channel) in sums[label].iter_mut().zip(pixel.0.iter()) {
                *sum += channel as u64;
            }
            counts[label] += 1;
        }
    }
    let mut output = RgbImage::new(image.width(), image.height());
    for i in 0..labels.height {
        for j in 0..labels.width {
            let label = labels[(i, j)] as usize;
            let count = counts[label].max(1);
            let mean = Rgb([
                (sums[label][0] / count) as u8,
                (sums[label][1] / count) as u8,
                (sums[label][2] / count) as u8,
            ]);
            output.put_pixel(j as u32, i as u32, mean);
        }
    }
    output
}

/// Renders every label in a random color, unassigned cells in black. Colors
/// change between runs, this is a debugging view and stays outside the
/// determinism guarantee.
pub fn label_image(labels: &Array2D<u32>) -> RgbImage {
    let mut rng = rand::thread_rng();
    let colors: Vec<Rgb<u8>> = (0..max_label(labels) + 1)
        .map(|_| Rgb(rng.gen::<[u8; 3]>()))
        .collect();
    let mut output = RgbImage::new(labels.width as u32, labels.height as u32);
    for i in 0..labels.height {
        for j in 0..labels.width {
            let label = labels[(i, j)];
            let color = if label == UNASSIGNED {
                Rgb([0, 0, 0])
            } else {
                colors[label as usize]
            };
            output.put_pixel(j as u32, i as u32, color);
        }
    }
    output
}

fn max_label(labels: &Array2D<u32>) -> usize {
    labels
        .data
        .iter()
        .filter(|&&label| label != UNASSIGNED)
        .map(|&label| label as usize)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{contour_image, label_image, mean_image};
    use crate::arrays::Array2D;
    use crate::seeds::UNASSIGNED;
    use image::{Rgb, RgbImage};

    fn two_half_labels() -> Array2D<u32> {
        Array2D::from_slice(
            &[
                0u32, 0, 1, 1, //
                0, 0, 1, 1, //
                0, 0, 1, 1, //
                0, 0, 1, 1,
            ],
            4,
            4,
        )
        .unwrap()
    }

    #[test]
    fn contours_trace_both_sides_of_the_edge() {
        let labels = two_half_labels();
        let mut image = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        contour_image(&mut image, &labels, Rgb([255, 0, 0]));
        for i in 0..4 {
            for j in 0..4 {
                let expected = if j == 1 || j == 2 {
                    Rgb([255, 0, 0])
                } else {
                    Rgb([10, 20, 30])
                };
                assert_eq!(*image.get_pixel(j, i), expected, "pixel ({i}, {j})");
            }
        }
    }

    #[test]
    fn mean_image_averages_per_label() {
        let labels = two_half_labels();
        let mut image = RgbImage::new(4, 4);
        for i in 0..4 {
            for j in 0..4 {
                let value = if j < 2 { 100 + i as u8 } else { 200 };
                image.put_pixel(j, i, Rgb([value, 0, 50]));
            }
        }
        let mean = mean_image(&image, &labels);
        // label 0 averages 100..=103 over two columns
        for i in 0..4 {
            for j in 0..2 {
                assert_eq!(*mean.get_pixel(j, i), Rgb([101, 0, 50]));
            }
            for j in 2..4 {
                assert_eq!(*mean.get_pixel(j, i), Rgb([200, 0, 50]));
            }
        }
    }

    #[test]
    fn label_image_is_flat_within_labels() {
        let mut labels = two_half_labels();
        labels[(3, 3)] = UNASSIGNED;
        let rendered = label_image(&labels);
        assert_eq!(*rendered.get_pixel(3, 3), Rgb([0, 0, 0]));
        for i in 0..4 {
            for j in 0..2 {
                assert_eq!(rendered.get_pixel(j, i), rendered.get_pixel(0, 0));
            }
        }
        assert_eq!(rendered.get_pixel(2, 0), rendered.get_pixel(3, 1));
    }
}
