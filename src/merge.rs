use crate::common::split_length_to_ranges;
use crate::peak::Peak;
use crate::search::Segmentation;
use assume::assume;
use rayon::current_num_threads;

/// Union-find over peak ids with path compression.
///
/// The peak set is orders of magnitude smaller than the pixel count, so this runs
/// sequentially. Joins keep the lowest id of a component as its root, which gives
/// the relabeling a stable, deterministic order.
pub struct DisjointSet {
    parents: Vec<u32>,
}

impl DisjointSet {
    pub fn new(size: usize) -> Self {
        assert!(size < u32::MAX as usize, "Size must be smaller than {}", u32::MAX);
        DisjointSet {
            parents: (0..size as u32).collect(),
        }
    }

    pub fn find(&mut self, node: u32) -> u32 {
        let mut root = node;
        while self.parents[root as usize] != root {
            root = self.parents[root as usize];
        }
        let mut walk = node;
        while walk != root {
            let next = self.parents[walk as usize];
            self.parents[walk as usize] = root;
            walk = next;
        }
        root
    }

    pub fn join(&mut self, node_i: u32, node_j: u32) {
        let root_i = self.find(node_i);
        let root_j = self.find(node_j);
        if root_i == root_j {
            return;
        }
        if root_i < root_j {
            self.parents[root_j as usize] = root_i;
        } else {
            self.parents[root_i as usize] = root_j;
        }
    }
}

/// This function merges peaks whose intensities are close enough to represent one
/// region.
///
/// Peaks form a graph with an edge between `i` and `j` iff
/// `|value_i - value_j| <= merge_threshold`; connected components are merged, so
/// the relation is transitive - a chain A-B-C within threshold collapses all three
/// even when A and C alone are further apart. Per component the value is the
/// member-count-weighted mean and the member count is the sum, which keeps
/// `sum(num_members) == width * height` intact.
///
/// New ids are contiguous from 0, numbered by the smallest old id in each
/// component, and the index grid is rewritten in one pass.
///
/// `merge_threshold <= 0` is a valid no-op: groupings stay singletons and the
/// segmentation is left untouched. A threshold spanning the whole intensity range
/// is also valid and collapses everything into one peak, a degenerate but
/// well-defined result.
pub fn merge_regions(segmentation: &mut Segmentation, merge_threshold: f32) {
    if !(merge_threshold > 0.0) {
        return;
    }
    let num_peaks = segmentation.peaks.len();
    if num_peaks < 2 {
        return;
    }

    let mut set = DisjointSet::new(num_peaks);
    for i in 0..num_peaks {
        let value_i = segmentation.peaks[i].value;
        for j in (i + 1)..num_peaks {
            if (value_i - segmentation.peaks[j].value).abs() <= merge_threshold {
                set.join(i as u32, j as u32);
            }
        }
    }

    // Substitute step. Components get their new id in increasing order of their
    // root (lowest member), so an all-singleton pass relabels identically.
    let mut substitute: Vec<u32> = vec![u32::MAX; num_peaks];
    let mut value_acc: Vec<f64> = Vec::new();
    let mut count_acc: Vec<u64> = Vec::new();
    for old in 0..num_peaks as u32 {
        let root = set.find(old) as usize;
        // the root is the smallest id of its component, so it was visited first
        debug_assert!(root <= old as usize);
        let new_id = if substitute[root] == u32::MAX {
            let new_id = value_acc.len() as u32;
            substitute[root] = new_id;
            value_acc.push(0.0);
            count_acc.push(0);
            new_id
        } else {
            substitute[root]
        };
        substitute[old as usize] = new_id;
        let peak = &segmentation.peaks[old as usize];
        value_acc[new_id as usize] += peak.value as f64 * peak.num_members as f64;
        count_acc[new_id as usize] += peak.num_members as u64;
    }
    let merged: Vec<Peak> = value_acc
        .iter()
        .zip(&count_acc)
        .map(|(value_sum, count)| Peak {
            value: (value_sum / *count as f64) as f32,
            num_members: *count as u32,
        })
        .collect();
    debug_assert_eq!(
        merged.iter().map(|p| p.num_members as u64).sum::<u64>(),
        segmentation
            .peaks
            .iter()
            .map(|p| p.num_members as u64)
            .sum::<u64>()
    );

    // Relabeling
    let substitute_ref = &substitute;
    let data = segmentation.peak_index.data.as_mut_slice();
    let num_threads = current_num_threads().clamp(1, data.len().max(1));
    let ranges = split_length_to_ranges(data.len(), num_threads);
    rayon::scope(|s| {
        let mut rest = data;
        for range in ranges {
            let (chunk, tail) = rest.split_at_mut(range.len());
            rest = tail;
            s.spawn(move |_| {
                for cell in chunk.iter_mut() {
                    let old = *cell as usize;
                    assume!(unsafe: old < substitute_ref.len(), "peak id {old} > {}", substitute_ref.len());
                    *cell = substitute_ref[old];
                }
            });
        }
    });
    segmentation.peaks = merged;
}
