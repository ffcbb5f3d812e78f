use crate::errors::{InvalidRange, SizeMismatch};
use crate::Error;
use ndarray::{Array3, ArrayView3};

/// Normalized color marking occluded pixels in an input image
pub(crate) const SENTINEL: [f32; 3] = [1.0, -1.0, 1.0];
/// Inclusive per-channel tolerance when matching the sentinel color
pub(crate) const SENTINEL_TOLERANCE: f32 = 0.7;

/// How the occluded region of each tile is derived.
#[derive(Clone)]
pub enum MaskSpec {
    /// Treat every pixel approximately matching the sentinel hole color as
    /// occluded. This is the convention input images are expected to follow.
    Sentinel,
    /// Occlude a centered square region whose margins cover `scale` of each
    /// side, ignoring tile content. `scale` must lie in (0, 0.5]; 0.25
    /// occludes the middle half of the tile.
    Center { scale: f32 },
    /// Use the supplied tile-shaped mask as is: 1 keeps a pixel, 0 marks it
    /// for generation. Values must be exactly 0 or 1.
    Explicit(Array3<f32>),
}

impl Default for MaskSpec {
    fn default() -> Self {
        Self::Sentinel
    }
}

impl MaskSpec {
    pub(crate) fn validate(&self, size: usize, channels: usize) -> Result<(), Error> {
        match self {
            Self::Sentinel => Ok(()),
            Self::Center { scale } => {
                if *scale > 0.0 && *scale <= 0.5 {
                    Ok(())
                } else {
                    Err(Error::InvalidRange(InvalidRange {
                        min: 0.0,
                        max: 0.5,
                        value: *scale,
                        name: "center-scale",
                    }))
                }
            }
            Self::Explicit(mask) => {
                let dim = mask.dim();
                if dim != (size, size, channels) {
                    return Err(Error::SizeMismatch(SizeMismatch {
                        actual: (dim.1 as u32, dim.0 as u32),
                        expected: (size as u32, size as u32),
                    }));
                }

                match mask.iter().find(|v| !is_binary(**v)) {
                    Some(value) => Err(Error::InvalidRange(InvalidRange {
                        min: 0.0,
                        max: 1.0,
                        value: *value,
                        name: "mask",
                    })),
                    None => Ok(()),
                }
            }
        }
    }
}

#[allow(clippy::float_cmp_const)]
pub(crate) fn is_binary(v: f32) -> bool {
    v == 0.0 || v == 1.0
}

/// Builds the binary mask for one tile and reports whether any pixel needs
/// reconstruction. The mask holds exact 0/1 values; the detection tolerance
/// never leaks into it.
pub(crate) fn build_mask(spec: &MaskSpec, patch: ArrayView3<'_, f32>) -> (Array3<f32>, bool) {
    match spec {
        MaskSpec::Sentinel => sentinel_mask(patch),
        MaskSpec::Center { scale } => center_mask(patch.dim().0, patch.dim().2, *scale),
        MaskSpec::Explicit(mask) => {
            let any_hole = mask.iter().any(|&v| v < 0.5);
            (mask.clone(), any_hole)
        }
    }
}

fn sentinel_mask(patch: ArrayView3<'_, f32>) -> (Array3<f32>, bool) {
    let (rows, cols, channels) = patch.dim();
    let mut mask = Array3::ones((rows, cols, channels));
    let mut any_hole = false;

    for i in 0..rows {
        for j in 0..cols {
            let hole = (0..SENTINEL.len())
                .all(|c| (patch[[i, j, c]] - SENTINEL[c]).abs() <= SENTINEL_TOLERANCE);

            if hole {
                for c in 0..channels {
                    mask[[i, j, c]] = 0.0;
                }
                any_hole = true;
            }
        }
    }

    (mask, any_hole)
}

fn center_mask(size: usize, channels: usize, scale: f32) -> (Array3<f32>, bool) {
    let mut mask = Array3::ones((size, size, channels));
    let lo = (size as f32 * scale) as usize;
    let hi = (size as f32 * (1.0 - scale)) as usize;

    for i in lo..hi {
        for j in lo..hi {
            for c in 0..channels {
                mask[[i, j, c]] = 0.0;
            }
        }
    }

    (mask, hi > lo)
}
