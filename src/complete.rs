use crate::adam::AdamState;
use crate::artifacts::ArtifactSink;
use crate::mask::{build_mask, MaskSpec};
use crate::model::{CompletionModel, Objective};
use crate::session::{CompletionProgress, ProgressStat, ProgressUpdate};
use crate::traversal::{TileCorner, TilePlan};
use crate::{utils, Dims, Error};
use log::{debug, warn};
use ndarray::{s, Array2, Array3, Array4, ArrayView3, ArrayView4, Axis};
use rand::Rng;
use rand_pcg::Pcg32;

/// A tile whose final loss lands above this is considered diverged; the
/// remaining tiles of its chunk are then left untouched
const DIVERGENCE_THRESHOLD: f32 = 700.0;

pub(crate) struct CompletionParams {
    pub(crate) learning_rate: f32,
    pub(crate) beta1: f32,
    pub(crate) beta2: f32,
    pub(crate) epsilon: f32,
    pub(crate) lam: f32,
    pub(crate) iterations: usize,
    pub(crate) output_interval: usize,
    pub(crate) tile_step: u32,
}

/// Completes one chunk of images in place, tile by tile. Returns whether the
/// chunk was cut short by a diverged tile.
pub(crate) fn complete_chunk(
    model: &mut dyn CompletionModel,
    images: &mut [Array3<f32>],
    mask_spec: &MaskSpec,
    lowres_mask: &Array3<f32>,
    params: &CompletionParams,
    sink: &ArtifactSink,
    rng: &mut Pcg32,
    mut progress: Option<&mut (dyn CompletionProgress + '_)>,
) -> Result<bool, Error> {
    let batch_size = model.batch_size();
    let latent_dim = model.latent_dim();
    let size = model.image_size() as usize;
    let real = images.len();
    debug_assert!(real >= 1 && real <= batch_size);

    let (height, width, channels) = images[0].dim();
    let plan = TilePlan::new(
        Dims::new(width as u32, height as u32),
        size as u32,
        params.tile_step,
    );
    let order = plan.visit_order();
    let tile_count = order.len();

    if real < batch_size {
        debug!("padding {} real patches to the batch size {}", real, batch_size);
    }

    let mut diverged = false;

    for (tile_idx, corner) in order.into_iter().enumerate() {
        debug_assert!(corner.max_x >= size && corner.max_x <= height);
        debug_assert!(corner.max_y >= size && corner.max_y <= width);

        // One patch per real image, zero rows as padding
        let mut batch = Array4::zeros((batch_size, size, size, channels));
        for (row, img) in images.iter().enumerate() {
            batch.index_axis_mut(Axis(0), row).assign(&img.slice(s![
                corner.max_x - size..corner.max_x,
                corner.max_y - size..corner.max_y,
                ..
            ]));
        }

        let (mask, any_hole) = build_mask(mask_spec, batch.index_axis(Axis(0), 0));
        if !any_hole {
            debug!("tile {}/{} needs no reconstruction", tile_idx + 1, tile_count);
            continue;
        }

        let masked = mask_rows(batch.view(), mask.view());

        sink.save_before(batch.view(), real);
        sink.save_masked(masked.view(), real);

        let objective = Objective {
            images: &batch,
            mask: &mask,
            lowres_mask,
            lam: params.lam,
        };

        if objective.lowres_enabled() {
            let factor = model.lowres_factor() as usize;
            let lowres = utils::block_mean(batch.view(), factor);
            let masked_lowres = mask_rows(lowres.view(), lowres_mask.view());
            let vis = utils::repeat_pixels(masked_lowres.view(), factor);
            sink.save_lowres(vis.view(), real);
        }

        sink.write_log_headers(real, latent_dim);

        let mut latents = init_latents(rng, batch_size, latent_dim);
        let mut adam = AdamState::new(
            params.learning_rate,
            params.beta1,
            params.beta2,
            params.epsilon,
            batch_size,
            latent_dim,
        );
        let mut last_loss = 0.0;

        for iteration in 0..params.iterations {
            let eval = model.evaluate(latents.view(), &objective)?;

            for row in 0..real {
                sink.log_step(row, iteration, eval.loss[row], latents.row(row));
            }

            if iteration % params.output_interval == 0 {
                let completed = composite(eval.images.view(), mask.view(), masked.view());
                write_back(images, completed.view(), corner, size);
                sink.save_snapshot(iteration, completed.view(), real);

                if let Some(p) = &mut progress {
                    p.update(ProgressUpdate {
                        image: &images[0],
                        total: ProgressStat {
                            current: tile_idx,
                            total: tile_count,
                        },
                        stage: ProgressStat {
                            current: iteration,
                            total: params.iterations,
                        },
                        loss: eval.loss.slice(s![..real]).mean().unwrap_or(0.0),
                    });
                }
            }

            last_loss = eval.loss[0];
            adam.step(&mut latents, &eval.gradient);
        }

        // Stitch the final optimization state, not the last snapshot
        let generated = model.generate(latents.view())?;
        let completed = composite(generated.view(), mask.view(), masked.view());
        write_back(images, completed.view(), corner, size);

        if last_loss > DIVERGENCE_THRESHOLD {
            debug!(
                "tile {}/{} diverged (loss {}), leaving the rest of the chunk untouched",
                tile_idx + 1,
                tile_count,
                last_loss
            );
            diverged = true;
            break;
        }
    }

    if sink.enabled() {
        let views: Vec<_> = images.iter().map(Array3::view).collect();
        match ndarray::stack(Axis(0), &views) {
            Ok(stacked) => sink.save_finale(stacked.view(), real),
            Err(err) => warn!("failed to assemble the final grid: {}", err),
        }
    }

    Ok(diverged)
}

/// completed = masked + generated·(1 − mask): known pixels stay verbatim,
/// holes are filled from the generator
pub(crate) fn composite(
    generated: ArrayView4<'_, f32>,
    mask: ArrayView3<'_, f32>,
    masked: ArrayView4<'_, f32>,
) -> Array4<f32> {
    debug_assert_eq!(generated.dim(), masked.dim());

    let mut out = masked.to_owned();
    for b in 0..generated.dim().0 {
        ndarray::Zip::from(out.index_axis_mut(Axis(0), b))
            .and(generated.index_axis(Axis(0), b))
            .and(mask.view())
            .for_each(|o, &g, &m| *o += g * (1.0 - m));
    }

    out
}

fn mask_rows(batch: ArrayView4<'_, f32>, mask: ArrayView3<'_, f32>) -> Array4<f32> {
    let mut out = batch.to_owned();
    for b in 0..batch.dim().0 {
        ndarray::Zip::from(out.index_axis_mut(Axis(0), b))
            .and(mask.view())
            .for_each(|o, &m| *o *= m);
    }

    out
}

fn write_back(
    images: &mut [Array3<f32>],
    completed: ArrayView4<'_, f32>,
    corner: TileCorner,
    size: usize,
) {
    for (row, img) in images.iter_mut().enumerate() {
        img.slice_mut(s![
            corner.max_x - size..corner.max_x,
            corner.max_y - size..corner.max_y,
            ..
        ])
        .assign(&completed.index_axis(Axis(0), row));
    }
}

fn init_latents(rng: &mut Pcg32, batch: usize, dim: usize) -> Array2<f32> {
    Array2::from_shape_simple_fn((batch, dim), || rng.gen_range(-1.0..1.0))
}
