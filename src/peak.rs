/// One mode of the intensity surface.
///
/// The peak id is its index in `Segmentation::peaks`, which keeps ids contiguous
/// `[0, len)` by construction, both after the search and after merging.
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    /// Running arithmetic mean of the converged intensities of all member
    /// trajectories.
    pub value: f32,
    /// Number of pixels whose trajectory landed in this peak. At least 1.
    pub num_members: u32,
}

impl Peak {
    /// Folds one more converged trajectory into the peak.
    ///
    /// Uses the exact mean update `(value * n + sample) / (n + 1)` in f64, so the
    /// result equals the true mean of all samples regardless of arrival order.
    pub(crate) fn absorb(&mut self, sample: f32) {
        let n = self.num_members as f64;
        self.value = ((self.value as f64 * n + sample as f64) / (n + 1.0)) as f32;
        self.num_members += 1;
    }
}
