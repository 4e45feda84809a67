use aligned_vec::{AVec, ConstAlign};
use std::fmt::{Display, Formatter};
use std::ops::{Index, IndexMut};

const ALIGN: usize = 64;

#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    DimensionMismatch,
}
impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DimensionMismatch => write!(f, "dimension mismatch"),
        }
    }
}

/// Generic aligned 2D array stored in row-major order.
///
/// Used for the peak index grid, the spatial weight LUT and the landing dedup grid.
#[derive(Debug, Clone)]
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
            return Err(Error::DimensionMismatch);
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
    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[T] {
        debug_assert!(row < self.height);
        &self.data[(self.width * row)..(self.width * row + self.width)]
    }
    pub fn get_row_mut(&mut self, row: usize) -> &mut [T] {
        debug_assert!(row < self.height);
        &mut self.data[(self.width * row)..(self.width * row + self.width)]
    }
    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(
            self.width > x,
            "Index ({x}, {y}) is out of bounds ({}, {})",
            self.width,
            self.height
        );
        debug_assert!(
            self.height > y,
            "Index ({x}, {y}) is out of bounds ({}, {})",
            self.width,
            self.height
        );
        self.width * y + x
    }
    pub fn get_x_y_index(&self, ind: usize) -> (usize, usize) {
        debug_assert!(ind < self.data.len());
        let y = ind / self.width;
        let x = ind % self.width;
        (x, y)
    }
}
impl<T> Index<(usize, usize)> for Array2D<T> {
    type Output = T;
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.data[self.get_index(x, y)]
    }
}
impl<T> IndexMut<(usize, usize)> for Array2D<T> {
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        let idx = self.get_index(x, y);
        &mut self.data[idx]
    }
}

/// Single-channel intensity image, immutable input of the segmentation.
///
/// Intensities are `f32`, so both 8-bit gray images (values 0-255) and calibrated
/// floating point data can be fed in without rescaling. Zero-sized images are valid
/// and produce empty segmentations.
#[derive(Debug)]
pub struct GrayImage {
    pub data: AVec<f32, ConstAlign<ALIGN>>,
    pub width: usize,
    pub height: usize,
}

impl GrayImage {
    pub fn from_slice(data: &[f32], width: usize, height: usize) -> Result<Self, Error> {
        if data.len() != width * height {
            return Err(Error::DimensionMismatch);
        }
        Ok(Self {
            width,
            height,
            data: AVec::from_slice(ALIGN, data),
        })
    }

    pub fn from_fill(value: f32, width: usize, height: usize) -> Self {
        let data: AVec<f32, ConstAlign<ALIGN>> =
            AVec::from_iter(ALIGN, (0..width * height).map(|_| value));
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_iter<I>(intensity_iter: I, width: usize, height: usize) -> Result<Self, Error>
    where
        I: IntoIterator<Item = f32>,
    {
        let data: AVec<f32, ConstAlign<ALIGN>> = AVec::from_iter(ALIGN, intensity_iter);
        if data.len() != width * height {
            return Err(Error::DimensionMismatch);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline(always)]
    pub fn get_row(&self, row: usize) -> &[f32] {
        debug_assert!(row < self.height);
        &self.data[(self.width * row)..(self.width * row + self.width)]
    }
    #[inline(always)]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(self.width > x);
        debug_assert!(self.height > y);
        self.width * y + x
    }
    #[inline(always)]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.get_index(x, y)]
    }
}
impl Index<(usize, usize)> for GrayImage {
    type Output = f32;
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        let idx = self.get_index(x, y);
        &self.data[idx]
    }
}
