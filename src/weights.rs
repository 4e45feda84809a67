use crate::common::ConfigError;

/// Shape of a weight kernel.
///
/// Both kernels are deterministic, stateless after construction and return zero
/// outside their support region. Degenerate windows (total weight zero) are the
/// caller's business, see `search`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KernelShape {
    /// Weight 1 everywhere inside the support.
    Uniform,
    /// Smoothly decaying weight, `exp(-0.5 * (d / scale)^2)` inside the support.
    /// The support is still hard-truncated, so far samples contribute exactly zero.
    Gaussian,
}

/// Spatial weight of a pixel offset, parameterized by the window radius.
///
/// The support is the square window `|dx| <= radius, |dy| <= radius` - the same
/// window the ascent scans, so the uniform kernel is 1 for every scanned pixel.
#[derive(Clone, Copy, Debug)]
pub struct SpatialWeight {
    kernel: KernelShape,
    radius: u32,
}
impl SpatialWeight {
    pub fn new(kernel: KernelShape, radius: u32) -> Result<Self, ConfigError> {
        if radius < 1 {
            return Err(ConfigError::InvalidRadius(radius));
        }
        Ok(Self { kernel, radius })
    }

    #[inline(always)]
    pub fn radius(&self) -> u32 {
        self.radius
    }

    #[inline(always)]
    pub fn weight(&self, dx: i32, dy: i32) -> f32 {
        let r = self.radius as i32;
        if dx.abs() > r || dy.abs() > r {
            return 0.0;
        }
        match self.kernel {
            KernelShape::Uniform => 1.0,
            KernelShape::Gaussian => {
                let r2 = (self.radius * self.radius) as f32;
                (-0.5 * (dx * dx + dy * dy) as f32 / r2).exp()
            }
        }
    }
}

/// Intensity weight of a value difference, parameterized by the bandwidth.
///
/// The support is `|delta| <= bandwidth`; beyond it the sample contributes zero
/// weight and cannot pull the trajectory.
#[derive(Clone, Copy, Debug)]
pub struct ValueWeight {
    kernel: KernelShape,
    bandwidth: f32,
}
impl ValueWeight {
    pub fn new(kernel: KernelShape, bandwidth: f32) -> Result<Self, ConfigError> {
        if !(bandwidth > 0.0) {
            return Err(ConfigError::InvalidBandwidth(bandwidth));
        }
        Ok(Self { kernel, bandwidth })
    }

    #[inline(always)]
    pub fn bandwidth(&self) -> f32 {
        self.bandwidth
    }

    #[inline(always)]
    pub fn weight(&self, delta: f32) -> f32 {
        let d = delta.abs();
        if d > self.bandwidth {
            return 0.0;
        }
        match self.kernel {
            KernelShape::Uniform => 1.0,
            KernelShape::Gaussian => {
                let n = d / self.bandwidth;
                (-0.5 * n * n).exp()
            }
        }
    }
}

/// Pair of weight functions driving one ascent step.
#[derive(Clone, Copy, Debug)]
pub struct WeightModel {
    pub spatial: SpatialWeight,
    pub value: ValueWeight,
}
impl WeightModel {
    pub fn new(spatial: SpatialWeight, value: ValueWeight) -> Self {
        Self { spatial, value }
    }

    /// Uniform kernels for both domains - the classic flat mean shift window.
    pub fn uniform(radius: u32, bandwidth: f32) -> Result<Self, ConfigError> {
        Ok(Self {
            spatial: SpatialWeight::new(KernelShape::Uniform, radius)?,
            value: ValueWeight::new(KernelShape::Uniform, bandwidth)?,
        })
    }

    /// Gaussian kernels for both domains, truncated at the same supports as the
    /// uniform variant.
    pub fn gaussian(radius: u32, bandwidth: f32) -> Result<Self, ConfigError> {
        Ok(Self {
            spatial: SpatialWeight::new(KernelShape::Gaussian, radius)?,
            value: ValueWeight::new(KernelShape::Gaussian, bandwidth)?,
        })
    }
}
