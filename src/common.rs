use std::fmt::{Display, Formatter};
use std::ops::Range;

/// Changes between parallelization schemas of the mode search.
///
/// The per-pixel ascent is a pure function of the immutable image, so splitting it
/// between threads cannot change the result. The dedup reduction always runs
/// single-threaded in row-major order, which makes the output (peak ids included)
/// identical for both strategies.
#[derive(Clone, PartialEq, Debug, Copy)]
pub enum SearchThreadingStrategy {
    /// No threading - used for correctness checks and very small images.
    SingleThread,
    /// Split the image by rows into `rayon::current_num_threads()` equally sized
    /// chunks. Default.
    RowChunked,
}

/// Invalid configuration of the search. No silent clamping is done; a bad value is
/// rejected before any pixel is touched.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Window radius must be at least 1 pixel.
    InvalidRadius(u32),
    /// At least one ascent iteration is needed to move anywhere.
    InvalidMaxIterations(u32),
    /// Convergence tolerance must be a positive real.
    InvalidConvergenceTol(f32),
    /// Intensity bandwidth must be a positive real.
    InvalidBandwidth(f32),
}
impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidRadius(r) => write!(f, "radius {r} must be >= 1"),
            ConfigError::InvalidMaxIterations(n) => {
                write!(f, "max_iterations {n} must be >= 1")
            }
            ConfigError::InvalidConvergenceTol(t) => {
                write!(f, "convergence_tol {t} must be > 0")
            }
            ConfigError::InvalidBandwidth(b) => write!(f, "bandwidth {b} must be > 0"),
        }
    }
}

/// Main config for the mode search.
///
/// The window radius and the intensity bandwidth live in the weight model
/// (see `weights`), since the kernels own their support regions.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hard cap on ascent steps per pixel. This bounds the worst-case latency of
    /// the search; a trajectory that has not converged by then is quantized as-is.
    pub max_iterations: u32,
    /// Minimum Euclidean step length below which a trajectory is considered
    /// converged.
    pub convergence_tol: f32,
    /// Threading strategy for the ascent phase.
    pub threading_strategy: SearchThreadingStrategy,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            convergence_tol: 0.1,
            threading_strategy: SearchThreadingStrategy::RowChunked,
        }
    }
}
impl Config {
    pub fn new(
        max_iterations: u32,
        convergence_tol: f32,
        threading_strategy: SearchThreadingStrategy,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_iterations,
            convergence_tol,
            threading_strategy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations < 1 {
            return Err(ConfigError::InvalidMaxIterations(self.max_iterations));
        }
        if !(self.convergence_tol > 0.0) {
            return Err(ConfigError::InvalidConvergenceTol(self.convergence_tol));
        }
        Ok(())
    }
}

pub(crate) fn split_length_to_ranges(length: usize, splits: usize) -> Vec<Range<usize>> {
    let chunk_size = length / splits;
    let rem = length % splits;
    (0..splits)
        .scan((rem, 0usize), |(r, acc), _split| {
            let mut size = chunk_size;
            if *r > 0 {
                *r -= 1;
                size += 1;
            }
            let out = (*acc, *acc + size);
            *acc += size;
            Some(out.0..out.1)
        })
        .collect()
}
