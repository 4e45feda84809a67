use crate::arrays::{Array2D, GrayImage};
use crate::common::{split_length_to_ranges, Config, ConfigError, SearchThreadingStrategy};
use crate::peak::Peak;
use crate::weights::{SpatialWeight, WeightModel};
use multiversion::multiversion;
use rayon::current_num_threads;
use std::ops::Range;

/// Convenient struct for passing the search output around.
///
/// `peak_index` has the same dimensions as the input image; every cell holds the id
/// of the peak the corresponding pixel's trajectory converged to. Ids are indices
/// into `peaks`, contiguous from 0.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub peaks: Vec<Peak>,
    pub peak_index: Array2D<u32>,
}

/// Where one pixel's mean shift trajectory ended up.
///
/// The landing coordinate is quantized with round-to-nearest, applied to both axes
/// of the converged position, so two trajectories stopping within half a pixel of
/// each other fold into the same peak.
#[derive(Debug, Clone, Copy, Default)]
struct Landing {
    x: u32,
    y: u32,
    value: f32,
}

/// This function precomputes the spatial weight LUT of the window.
///
/// One evaluation of the kernel per window cell instead of one per visited pixel;
/// the window is rescanned `width * height * iterations` times, so this is far off
/// the hot path.
pub fn compute_spatial_weight_lut(spatial: &SpatialWeight) -> Array2D<f32> {
    let radius = spatial.radius() as i32;
    let lut_size = (2 * radius + 1) as usize;
    let mut lut: Array2D<f32> = Array2D::from_fill(0f32, lut_size, lut_size);
    for i in 0..lut_size {
        for j in 0..lut_size {
            lut[(j, i)] = spatial.weight(j as i32 - radius, i as i32 - radius);
        }
    }
    lut
}

/// This function runs the mean shift mode search.
///
/// For every pixel the weighted-mean ascent is run to convergence (or the iteration
/// cap), the landing position is quantized and deduplicated into the peak table,
/// and the pixel's cell in the index grid is set to the peak id.
///
/// Cost is `O(width * height * max_iterations * (2 * radius + 1)^2)` in the worst
/// case; the ascent phase is split between threads (see
/// `SearchThreadingStrategy`), the dedup reduction runs single-threaded in
/// row-major order so the result is identical for every thread count.
///
/// An empty image yields an empty segmentation, not an error.
pub fn search(
    image: &GrayImage,
    config: &Config,
    weights: &WeightModel,
) -> Result<Segmentation, ConfigError> {
    config.validate()?;
    let width = image.width;
    let height = image.height;
    if width == 0 || height == 0 {
        return Ok(Segmentation {
            peaks: Vec::new(),
            peak_index: Array2D::from_fill(0u32, width, height),
        });
    }

    let spatial_weight_lut = compute_spatial_weight_lut(&weights.spatial);
    let mut landings: Vec<Landing> = vec![Landing::default(); width * height];

    match config.threading_strategy {
        SearchThreadingStrategy::SingleThread => seek_rows(
            image,
            weights,
            &spatial_weight_lut,
            config,
            0..height,
            &mut landings,
        ),
        SearchThreadingStrategy::RowChunked => {
            let num_threads = current_num_threads().clamp(1, height);
            let ranges = split_length_to_ranges(height, num_threads);
            rayon::scope(|s| {
                let lut = &spatial_weight_lut;
                let mut rest: &mut [Landing] = &mut landings;
                for range in ranges {
                    let (chunk, tail) = rest.split_at_mut(range.len() * width);
                    rest = tail;
                    s.spawn(move |_| seek_rows(image, weights, lut, config, range, chunk));
                }
            });
        }
    }

    // Dedup reduction. This is the only serialization point of the whole search:
    // landings are folded in row-major pixel order, so peak ids are deterministic.
    let mut peaks: Vec<Peak> = Vec::new();
    let mut landing_to_peak: Array2D<u32> = Array2D::from_fill(u32::MAX, width, height);
    let mut peak_index: Array2D<u32> = Array2D::from_fill(0u32, width, height);
    for (cell, landing) in landings.iter().enumerate() {
        let landing_cell = landing_to_peak.get_index(landing.x as usize, landing.y as usize);
        let seen = landing_to_peak.data[landing_cell];
        let id = if seen == u32::MAX {
            let id = peaks.len() as u32;
            peaks.push(Peak {
                value: landing.value,
                num_members: 1,
            });
            landing_to_peak.data[landing_cell] = id;
            id
        } else {
            peaks[seen as usize].absorb(landing.value);
            seen
        };
        peak_index.data[cell] = id;
    }
    debug_assert_eq!(
        peaks.iter().map(|p| p.num_members as usize).sum::<usize>(),
        width * height
    );
    Ok(Segmentation { peaks, peak_index })
}

/// This function does the ascent for a chunk of image rows.
///
/// `out` must have exactly `rows.len() * image.width` elements; landings are
/// written in row-major order. Pure function of the immutable image, no shared
/// state, which is what makes the row-chunked threading safe.
#[multiversion(targets = "simd")]
fn seek_rows(
    image: &GrayImage,
    weights: &WeightModel,
    spatial_weight_lut: &Array2D<f32>,
    config: &Config,
    rows: Range<usize>,
    out: &mut [Landing],
) {
    debug_assert_eq!(out.len(), rows.len() * image.width);
    let radius = weights.spatial.radius() as i64;
    let radius_f = weights.spatial.radius() as f32;
    let width = image.width as i64;
    let height = image.height as i64;
    for (y0, out_row) in rows.zip(out.chunks_exact_mut(image.width)) {
        let start_row = image.get_row(y0);
        for (x0, out_cell) in out_row.iter_mut().enumerate() {
            let mut cx = x0 as f32;
            let mut cy = y0 as f32;
            let mut cv = start_row[x0];
            for _ in 0..config.max_iterations {
                // integer pixels with |x - cx| <= radius, |y - cy| <= radius,
                // clipped to the image
                let left = ((cx - radius_f).ceil() as i64).max(0);
                let right = ((cx + radius_f).floor() as i64).min(width - 1);
                let top = ((cy - radius_f).ceil() as i64).max(0);
                let bottom = ((cy + radius_f).floor() as i64).min(height - 1);
                let mut sum_w = 0f32;
                let mut sum_x = 0f32;
                let mut sum_y = 0f32;
                let mut sum_v = 0f32;
                // LUT cells are whole-pixel offsets from the center, quantized
                // half-up. floor(x + 0.5) shifts by exactly one per cell, so one
                // anchor index per window edge is enough.
                let lut_left = ((left as f32 - cx + 0.5).floor() as i64 + radius) as usize;
                for y in top..=bottom {
                    let lut_row = spatial_weight_lut
                        .get_row(((y as f32 - cy + 0.5).floor() as i64 + radius) as usize);
                    let image_part = &image.get_row(y as usize)[left as usize..=right as usize];
                    let lut_part = &lut_row[lut_left..lut_left + image_part.len()];
                    let row_w = y as f32;
                    for (i, (v, sw)) in image_part.iter().zip(lut_part).enumerate() {
                        let w = sw * weights.value.weight(v - cv);
                        sum_w += w;
                        sum_x += w * (left + i as i64) as f32;
                        sum_y += w * row_w;
                        sum_v += w * v;
                    }
                }
                if sum_w == 0.0 {
                    // nothing in the window can pull the trajectory, freeze it here
                    break;
                }
                let nx = sum_x / sum_w;
                let ny = sum_y / sum_w;
                let step = (nx - cx).hypot(ny - cy);
                cx = nx;
                cy = ny;
                cv = sum_v / sum_w;
                if step < config.convergence_tol {
                    break;
                }
            }
            let qx = cx.round() as u32;
            let qy = cy.round() as u32;
            debug_assert!((qx as i64) < width && (qy as i64) < height);
            *out_cell = Landing {
                x: qx,
                y: qy,
                value: cv,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compute_spatial_weight_lut, search, Segmentation};
    use crate::arrays::GrayImage;
    use crate::common::{Config, SearchThreadingStrategy};
    use crate::weights::{KernelShape, SpatialWeight, WeightModel};

    fn check_invariants(segmentation: &Segmentation, width: usize, height: usize) {
        assert_eq!(segmentation.peak_index.width, width);
        assert_eq!(segmentation.peak_index.height, height);
        let num_peaks = segmentation.peaks.len() as u32;
        for id in segmentation.peak_index.data.iter() {
            assert!(*id < num_peaks);
        }
        let total: usize = segmentation
            .peaks
            .iter()
            .map(|p| p.num_members as usize)
            .sum();
        assert_eq!(total, width * height);
        for peak in &segmentation.peaks {
            assert!(peak.num_members >= 1);
        }
    }

    #[test]
    fn spatial_weight_lut_test() {
        let lut =
            compute_spatial_weight_lut(&SpatialWeight::new(KernelShape::Gaussian, 2).unwrap());
        assert_eq!(lut.width, 5);
        assert_eq!(lut.height, 5);
        assert_eq!(lut[(2, 2)], 1.0);
        assert_eq!(lut[(0, 0)], lut[(4, 4)]);
        assert!(lut[(0, 2)] > lut[(0, 0)]);
    }

    #[test]
    fn uniform_4x4_single_peak_test() {
        let image = GrayImage::from_fill(100.0, 4, 4);
        let weights = WeightModel::uniform(2, 4.5).unwrap();
        let segmentation = search(&image, &Config::default(), &weights).unwrap();
        check_invariants(&segmentation, 4, 4);
        assert_eq!(segmentation.peaks.len(), 1);
        assert_eq!(segmentation.peaks[0].value, 100.0);
        assert_eq!(segmentation.peaks[0].num_members, 16);
        assert!(segmentation.peak_index.data.iter().all(|id| *id == 0));
    }

    #[test]
    fn single_pixel_image_test() {
        let image = GrayImage::from_slice(&[42.0], 1, 1).unwrap();
        let weights = WeightModel::uniform(3, 1.0).unwrap();
        let segmentation = search(&image, &Config::default(), &weights).unwrap();
        assert_eq!(segmentation.peaks.len(), 1);
        assert_eq!(segmentation.peaks[0].value, 42.0);
        assert_eq!(segmentation.peaks[0].num_members, 1);
        assert_eq!(segmentation.peak_index[(0, 0)], 0);
    }

    #[test]
    fn empty_image_test() {
        let image = GrayImage::from_slice(&[], 0, 0).unwrap();
        let weights = WeightModel::uniform(2, 4.5).unwrap();
        let segmentation = search(&image, &Config::default(), &weights).unwrap();
        assert!(segmentation.peaks.is_empty());
        assert_eq!(segmentation.peak_index.data.len(), 0);
    }

    #[test]
    fn invalid_config_rejected_test() {
        let image = GrayImage::from_fill(0.0, 4, 4);
        let weights = WeightModel::uniform(2, 4.5).unwrap();
        let mut config = Config::default();
        config.max_iterations = 0;
        assert!(search(&image, &config, &weights).is_err());
        config = Config::default();
        config.convergence_tol = -0.5;
        assert!(search(&image, &config, &weights).is_err());
    }

    /// Two constant intensity blocks whose values are far outside each other's
    /// bandwidth. The value kernel isolates the blocks, so each collapses to its
    /// own single peak.
    #[test]
    fn two_isolated_blocks_test() {
        let segmentation = two_blocks_segmentation();
        check_invariants(&segmentation, 8, 4);
        assert_eq!(segmentation.peaks.len(), 2);
        assert_eq!(segmentation.peaks[0].value, 10.0);
        assert_eq!(segmentation.peaks[0].num_members, 16);
        assert_eq!(segmentation.peaks[1].value, 200.0);
        assert_eq!(segmentation.peaks[1].num_members, 16);
        for y in 0..4 {
            for x in 0..8 {
                let expected = if x < 4 { 0 } else { 1 };
                assert_eq!(segmentation.peak_index[(x, y)], expected);
            }
        }
    }

    /// A trajectory stopped between two pixels only sees the window around its
    /// exact position. With the center at x = 0.5 the radius-1 window is {0, 1};
    /// pixel 2 is 1.5 away and must not contribute.
    #[test]
    fn fractional_center_window_test() {
        let image = GrayImage::from_slice(&[0.0, 0.0, 90.0], 3, 1).unwrap();
        let weights = WeightModel::uniform(1, 100.0).unwrap();
        let segmentation = search(&image, &Config::default(), &weights).unwrap();
        check_invariants(&segmentation, 3, 1);
        assert_eq!(segmentation.peaks.len(), 2);
        // pixel 0 converges at x = 0.5 with value 0, pixel 1 at x = 1 with value
        // mean(0, 0, 90) = 30; both quantize to cell 1
        assert_eq!(segmentation.peaks[0].num_members, 2);
        assert!((segmentation.peaks[0].value - 15.0).abs() < 1e-5);
        // pixel 2 settles at x = 1.5 with value mean(0, 90) = 45
        assert_eq!(segmentation.peaks[1].num_members, 1);
        assert!((segmentation.peaks[1].value - 45.0).abs() < 1e-5);
        assert_eq!(segmentation.peak_index.data.to_vec(), vec![0, 0, 1]);
    }

    /// Two constant blocks split by a band wider than `2 * radius`. The bandwidth
    /// spans both block values, so only the spatial gap (the band itself is far
    /// outside the bandwidth of either block) keeps the blocks apart.
    #[test]
    fn spatially_separated_blocks_test() {
        let width = 14;
        let height = 4;
        let data: Vec<f32> = (0..width * height)
            .map(|i| match i % width {
                0..=3 => 10.0,
                4..=9 => 1000.0,
                _ => 200.0,
            })
            .collect();
        let image = GrayImage::from_slice(&data, width, height).unwrap();
        // |10 - 200| = 190 <= 250, the value kernel alone cannot separate the blocks
        let weights = WeightModel::uniform(2, 250.0).unwrap();
        let segmentation = search(&image, &Config::default(), &weights).unwrap();
        check_invariants(&segmentation, width, height);
        let low: Vec<usize> = segmentation
            .peaks
            .iter()
            .enumerate()
            .filter(|(_, p)| p.value == 10.0)
            .map(|(id, _)| id)
            .collect();
        let high: Vec<usize> = segmentation
            .peaks
            .iter()
            .enumerate()
            .filter(|(_, p)| p.value == 200.0)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(low.len(), 1);
        assert_eq!(high.len(), 1);
        assert_eq!(segmentation.peaks[low[0]].num_members, 16);
        assert_eq!(segmentation.peaks[high[0]].num_members, 16);
        // the band forms its own region(s)
        for (id, peak) in segmentation.peaks.iter().enumerate() {
            if id != low[0] && id != high[0] {
                assert_eq!(peak.value, 1000.0);
            }
        }
        for y in 0..height {
            for x in 0..width {
                let id = segmentation.peak_index[(x, y)] as usize;
                match x {
                    0..=3 => assert_eq!(id, low[0]),
                    4..=9 => assert!(id != low[0] && id != high[0]),
                    _ => assert_eq!(id, high[0]),
                }
            }
        }
    }

    fn two_blocks_segmentation() -> Segmentation {
        let data: Vec<f32> = (0..32)
            .map(|i| if i % 8 < 4 { 10.0 } else { 200.0 })
            .collect();
        let image = GrayImage::from_slice(&data, 8, 4).unwrap();
        let weights = WeightModel::uniform(2, 50.0).unwrap();
        search(&image, &Config::default(), &weights).unwrap()
    }

    fn gradient_image(width: usize, height: usize) -> GrayImage {
        GrayImage::from_iter(
            (0..width * height).map(|i| {
                let x = i % width;
                let y = i / width;
                ((x * 3 + y * 7) % 23) as f32
            }),
            width,
            height,
        )
        .unwrap()
    }

    #[test]
    fn member_count_invariant_test() {
        let image = gradient_image(16, 9);
        let weights = WeightModel::uniform(2, 4.5).unwrap();
        let segmentation = search(&image, &Config::default(), &weights).unwrap();
        check_invariants(&segmentation, 16, 9);
        let weights = WeightModel::gaussian(3, 6.0).unwrap();
        let segmentation = search(&image, &Config::default(), &weights).unwrap();
        check_invariants(&segmentation, 16, 9);
    }

    #[test]
    fn iteration_cap_bounds_search_test() {
        let image = GrayImage::from_fill(100.0, 4, 4);
        let weights = WeightModel::uniform(2, 4.5).unwrap();
        let mut config = Config::default();
        config.max_iterations = 1;
        let segmentation = search(&image, &config, &weights).unwrap();
        // capped trajectories still land somewhere valid
        check_invariants(&segmentation, 4, 4);
    }

    #[test]
    fn threading_equivalence_test() {
        let image = gradient_image(20, 13);
        let weights = WeightModel::gaussian(2, 5.0).unwrap();
        let mut config = Config::default();
        config.threading_strategy = SearchThreadingStrategy::SingleThread;
        let sequential = search(&image, &config, &weights).unwrap();
        config.threading_strategy = SearchThreadingStrategy::RowChunked;
        let parallel = search(&image, &config, &weights).unwrap();
        assert_eq!(sequential.peaks, parallel.peaks);
        assert_eq!(
            sequential.peak_index.data.as_slice(),
            parallel.peak_index.data.as_slice()
        );
    }

    /// Mirroring the image mirrors the index grid up to relabeling, peak values
    /// unchanged, given symmetric kernels. Uses odd block widths so no landing sits
    /// exactly on a half-pixel boundary, where the rounding rule is not mirror
    /// symmetric.
    #[test]
    fn horizontal_flip_symmetry_test() {
        let width = 9;
        let height = 3;
        let data: Vec<f32> = (0..width * height)
            .map(|i| match (i % width) / 3 {
                0 => 10.0,
                1 => 100.0,
                _ => 200.0,
            })
            .collect();
        let flipped: Vec<f32> = data
            .chunks_exact(width)
            .flat_map(|row| row.iter().rev().copied())
            .collect();
        let image = GrayImage::from_slice(&data, width, height).unwrap();
        let image_f = GrayImage::from_slice(&flipped, width, height).unwrap();
        let weights = WeightModel::uniform(2, 40.0).unwrap();
        let config = Config::default();
        let seg = search(&image, &config, &weights).unwrap();
        let seg_f = search(&image_f, &config, &weights).unwrap();
        assert_eq!(seg.peaks.len(), seg_f.peaks.len());

        let mut id_map: Vec<Option<u32>> = vec![None; seg.peaks.len()];
        for y in 0..height {
            for x in 0..width {
                let id = seg.peak_index[(x, y)] as usize;
                let id_f = seg_f.peak_index[(width - 1 - x, y)];
                match id_map[id] {
                    None => id_map[id] = Some(id_f),
                    Some(mapped) => assert_eq!(mapped, id_f),
                }
            }
        }
        for (id, mapped) in id_map.iter().enumerate() {
            let mapped = mapped.unwrap() as usize;
            assert_eq!(seg.peaks[id].value, seg_f.peaks[mapped].value);
            assert_eq!(seg.peaks[id].num_members, seg_f.peaks[mapped].num_members);
        }
    }
}
