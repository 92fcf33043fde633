use crate::cielab::srgb_to_cielab_pixel;
use crate::common::{split_length_to_ranges, Error};
use aligned_vec::{AVec, ConstAlign};
use rayon::current_num_threads;
use std::ops::{Index, IndexMut};

pub(crate) const ALIGN: usize = 64;

/// Row-major 2D array over cache-line aligned storage.
///
/// Indexing is `(row, col)`, matching how the sweeps walk the image.
#[derive(Debug)]
pub struct Array2D<T> {
    pub data: AVec<T, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
}

impl<T> Array2D<T> {
    pub fn from_slice(data: &[T], width: usize, height: usize) -> Result<Self, Error>
    where
        T: Clone,
    {
        if data.len() != width * height {
            return Err(Error::DimensionMismatch {
                got: data.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            data: AVec::from_slice(ALIGN, data),
        })
    }

    pub fn from_fill(value: T, width: usize, height: usize) -> Self
    where
        T: Clone + Copy,
    {
        let data: AVec<T, ConstAlign<ALIGN>> =
            AVec::from_iter(ALIGN, (0..width * height).map(|_| value));
        Self {
            width,
            height,
            data,
        }
    }

    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        self.data.fill(value)
    }
    pub fn get_row(&self, row: usize) -> &[T] {
        debug_assert!(row < self.height);
        &self.data[(self.width * row)..(self.width * row + self.width)]
    }
    pub fn get_row_mut(&mut self, row: usize) -> &mut [T] {
        debug_assert!(row < self.height);
        &mut self.data[(self.width * row)..(self.width * row + self.width)]
    }
    #[inline(always)]
    pub fn get_index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.height, "Out-of-bounds row {row} < {}", self.height);
        debug_assert!(col < self.width, "Out-of-bounds col {col} < {}", self.width);
        self.width * row + col
    }
}
impl<T> Index<(usize, usize)> for Array2D<T> {
    type Output = T;
    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.data[self.get_index(row, col)]
    }
}
impl<T> IndexMut<(usize, usize)> for Array2D<T> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        let idx = self.get_index(row, col);
        &mut self.data[idx]
    }
}

#[inline(always)]
pub(crate) fn avec_fill_zeros<T: Sized>(size: usize) -> AVec<T, ConstAlign<ALIGN>> {
    let size_of = std::mem::size_of::<T>();
    let size_bytes = match size.checked_mul(size_of) {
        Some(size_bytes) => size_bytes,
        None => panic!(
            "Number of elements {} overflowed u64 when size is in bytes. Can't allocate!",
            size
        ),
    };
    let will_overflow = size_bytes > usize::MAX - (ALIGN - 1);
    let is_invalid_alloc = usize::BITS < 64 && size_bytes > isize::MAX as usize;
    if will_overflow || is_invalid_alloc {
        panic!(
            "Number of elements {} of {} bytes can't be allocated!",
            size, size_bytes
        )
    }
    let layout = std::alloc::Layout::from_size_align(size_bytes, ALIGN)
        .expect("Creation of layout failed. Check alignment size (must be power of two)!");
    let ptr_b = unsafe { std::alloc::alloc_zeroed(layout) };
    if ptr_b.is_null() {
        std::alloc::handle_alloc_error(layout);
    }
    let ptr = unsafe { std::ptr::NonNull::new_unchecked(ptr_b as *mut T) };
    unsafe { AVec::from_raw_parts(ptr.as_ptr(), ALIGN, size, size) }
}

/// Image samples the segmentation consumes, tightly packed row by row.
///
/// One channel for grayscale input, three for color. Color images built with
/// [`SampleImage::from_srgb`] hold CIELAB samples, which is what the histogram
/// scores want; `from_raw` accepts any 8-bit samples as they are.
#[derive(Debug)]
pub struct SampleImage {
    pub data: AVec<u8, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl SampleImage {
    /// Converts packed RGB24 to CIELAB, split over the rayon pool.
    pub fn from_srgb(rgb_image: &[u8], width: usize, height: usize) -> Self {
        assert!(width > 0);
        assert!(height > 0);
        assert_eq!(rgb_image.len(), width * height * 3);
        let mut lab_output: AVec<u8, ConstAlign<ALIGN>> = avec_fill_zeros(width * height * 3);
        // split by pixels, not bytes, so no trailing pixel is left unconverted
        let ranges = split_length_to_ranges(width * height, current_num_threads());
        rayon::scope(|s| {
            let mut rgb_input: &[u8] = rgb_image;
            let mut data_output: &mut [u8] = &mut lab_output;
            for range in ranges {
                let (chunk_in, rest_in) = rgb_input.split_at(range.len() * 3);
                rgb_input = rest_in;
                let (chunk_out, rest_out) = data_output.split_at_mut(range.len() * 3);
                data_output = rest_out;
                s.spawn(|_| {
                    for (pixel_in, pixel_out) in
                        chunk_in.chunks_exact(3).zip(chunk_out.chunks_exact_mut(3))
                    {
                        pixel_out.copy_from_slice(srgb_to_cielab_pixel(pixel_in).as_slice());
                    }
                });
            }
        });
        Self {
            width,
            height,
            channels: 3,
            data: lab_output,
        }
    }

    /// Wraps an 8-bit grayscale buffer.
    pub fn from_luma(luma_image: &[u8], width: usize, height: usize) -> Self {
        assert!(width > 0);
        assert!(height > 0);
        assert_eq!(luma_image.len(), width * height);
        Self {
            width,
            height,
            channels: 1,
            data: AVec::from_slice(ALIGN, luma_image),
        }
    }

    /// Takes an already converted sample buffer. Unlike the panicking
    /// constructors this reports shape problems, since raw buffers usually
    /// arrive from outside the caller's control.
    pub fn from_raw(
        data: Vec<u8>,
        width: usize,
        height: usize,
        channels: usize,
    ) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }
        if channels != 1 && channels != 3 {
            return Err(Error::UnsupportedChannelCount(channels));
        }
        let want = width * height * channels;
        if data.len() != want {
            return Err(Error::SampleCountMismatch {
                got: data.len(),
                want,
                width,
                height,
                channels,
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data: AVec::from_slice(ALIGN, &data),
        })
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[u8] {
        debug_assert!(row < self.height);
        let stride = self.width * self.channels;
        &self.data[(stride * row)..(stride * row + stride)]
    }
    #[inline(always)]
    pub fn get_index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.height);
        debug_assert!(col < self.width);
        (self.width * row + col) * self.channels
    }
    #[inline(always)]
    pub fn get_pixel(&self, row: usize, col: usize) -> &[u8] {
        let idx = self.get_index(row, col);
        &self.data[idx..idx + self.channels]
    }
}
impl Index<(usize, usize)> for SampleImage {
    type Output = [u8];
    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        self.get_pixel(row, col)
    }
}
