use crate::Error;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, ArrayView4, Axis};
use std::path::Path;

/// The completion objective for one tile: the real patch batch, the keep
/// mask, an optional low-resolution mask, and the perceptual weight.
pub struct Objective<'a> {
    /// Real patches [B, S, S, C]; rows past the real count are zero padding
    pub images: &'a Array4<f32>,
    /// Binary keep mask [S, S, C], applied to every batch row
    pub mask: &'a Array3<f32>,
    /// Binary mask over the block-averaged patches; all-zero disables the
    /// low-resolution term
    pub lowres_mask: &'a Array3<f32>,
    /// Weight of the perceptual term
    pub lam: f32,
}

impl Objective<'_> {
    /// Whether the low-resolution contextual term participates in the loss
    pub fn lowres_enabled(&self) -> bool {
        self.lowres_mask.iter().any(|&v| v.abs() > 0.0)
    }

    /// The composite per-row loss for generated output and discriminator
    /// logits: contextual distance at full resolution, plus the same over
    /// block means when the low-resolution mask is active, plus `lam` times
    /// the adversarial term (shared by every row).
    ///
    /// Model implementations are expected to reproduce exactly this value
    /// from `evaluate`, along with its latent gradient.
    pub fn loss(&self, generated: ArrayView4<'_, f32>, logits: ArrayView1<'_, f32>) -> Array1<f32> {
        let mut loss = contextual_loss(self.mask.view(), generated, self.images.view());

        if self.lowres_enabled() {
            let factor = generated.dim().1 / self.lowres_mask.dim().0;
            let lowres_generated = crate::utils::block_mean(generated, factor);
            let lowres_real = crate::utils::block_mean(self.images.view(), factor);
            loss += &contextual_loss(
                self.lowres_mask.view(),
                lowres_generated.view(),
                lowres_real.view(),
            );
        }

        loss + self.lam * adversarial_loss(logits)
    }
}

/// One forward/backward evaluation of the completion objective.
pub struct Evaluation {
    /// Composite loss per batch row
    pub loss: Array1<f32>,
    /// d(loss)/d(latent), shaped like the latent batch [B, Z]
    pub gradient: Array2<f32>,
    /// Generator output [B, S, S, C]
    pub images: Array4<f32>,
}

/// The pretrained generator/discriminator pair the completion loop drives.
///
/// Implementations wrap whatever runtime executes the networks; the loop
/// only needs the shapes, a weight-restore step, and a fused loss and
/// gradient evaluation. All network-scope state (normalization layers,
/// shared variables) stays behind this seam.
pub trait CompletionModel {
    /// Loads the pretrained weights. Called once when the session is built;
    /// on failure the build fails, completion never runs without weights.
    fn restore(&mut self, checkpoint_dir: &Path) -> Result<(), Error>;

    /// Latent dimensionality Z
    fn latent_dim(&self) -> usize;

    /// Batch size B the networks were compiled for
    fn batch_size(&self) -> usize;

    /// Side length S of one generated patch
    fn image_size(&self) -> u32;

    /// Block size of the low-resolution downsample
    fn lowres_factor(&self) -> u32 {
        8
    }

    /// Runs the generator on a latent batch [B, Z], producing patches
    /// [B, S, S, C] with values in [-1, 1]
    fn generate(&mut self, latents: ArrayView2<'_, f32>) -> Result<Array4<f32>, Error>;

    /// Scores a patch batch with the discriminator, returning per-row
    /// (probability, logit)
    fn score(&mut self, images: ArrayView4<'_, f32>) -> Result<(Array1<f32>, Array1<f32>), Error>;

    /// Evaluates `Objective::loss` and its gradient with respect to the
    /// latent batch, for the current latents
    fn evaluate(
        &mut self,
        latents: ArrayView2<'_, f32>,
        objective: &Objective<'_>,
    ) -> Result<Evaluation, Error>;
}

/// Per-row contextual distance: the summed absolute difference between the
/// masked generated pixels and the masked real pixels
pub fn contextual_loss(
    mask: ArrayView3<'_, f32>,
    generated: ArrayView4<'_, f32>,
    real: ArrayView4<'_, f32>,
) -> Array1<f32> {
    debug_assert_eq!(generated.dim(), real.dim());

    let batch = generated.dim().0;
    let mut loss = Array1::zeros(batch);

    for b in 0..batch {
        let mut acc = 0.0;
        ndarray::Zip::from(mask.view())
            .and(generated.index_axis(Axis(0), b))
            .and(real.index_axis(Axis(0), b))
            .for_each(|&m, &g, &r| acc += (m * g - m * r).abs());
        loss[b] = acc;
    }

    loss
}

/// Adversarial realism penalty: the mean over the batch of the cross
/// entropy between the discriminator's logits and an all-real labeling,
/// i.e. mean(softplus(-logit))
pub fn adversarial_loss(logits: ArrayView1<'_, f32>) -> f32 {
    if logits.is_empty() {
        return 0.0;
    }

    let sum: f32 = logits.iter().map(|&l| softplus(-l)).sum();
    sum / logits.len() as f32
}

fn softplus(x: f32) -> f32 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{Array1, Array3, Array4};

    #[test]
    fn contextual_loss_only_sees_masked_pixels() {
        let mask = Array3::ones((2, 2, 1));
        let mut masked = mask.clone();
        masked[[0, 0, 0]] = 0.0;

        let real = Array4::zeros((1, 2, 2, 1));
        let mut generated = Array4::zeros((1, 2, 2, 1));
        generated[[0, 0, 0, 0]] = 5.0;
        generated[[0, 1, 1, 0]] = -0.5;

        let full = contextual_loss(mask.view(), generated.view(), real.view());
        assert!((full[0] - 5.5).abs() < 1e-6);

        let holed = contextual_loss(masked.view(), generated.view(), real.view());
        assert!((holed[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn adversarial_loss_matches_cross_entropy() {
        let logits = Array1::from(vec![0.0_f32]);
        assert!((adversarial_loss(logits.view()) - (2.0_f32).ln()).abs() < 1e-6);

        // a confident "real" verdict costs almost nothing
        let sure = Array1::from(vec![20.0_f32]);
        assert!(adversarial_loss(sure.view()) < 1e-6);

        // a confident "fake" verdict costs about the logit itself
        let fake = Array1::from(vec![-20.0_f32]);
        assert!((adversarial_loss(fake.view()) - 20.0).abs() < 1e-3);
    }

    #[test]
    fn objective_adds_weighted_perceptual_term() {
        let images = Array4::zeros((2, 2, 2, 1));
        let mask = Array3::ones((2, 2, 1));
        let lowres_mask = Array3::zeros((1, 1, 1));

        let objective = Objective {
            images: &images,
            mask: &mask,
            lowres_mask: &lowres_mask,
            lam: 0.1,
        };
        assert!(!objective.lowres_enabled());

        let generated = Array4::from_elem((2, 2, 2, 1), 0.5_f32);
        let logits = Array1::from(vec![0.0_f32, 0.0]);

        let loss = objective.loss(generated.view(), logits.view());
        let expected = 2.0 + 0.1 * (2.0_f32).ln();
        for &l in loss.iter() {
            assert!((l - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn lowres_term_activates_with_a_nonzero_mask() {
        let images = Array4::zeros((1, 2, 2, 1));
        let mask = Array3::zeros((2, 2, 1));
        let lowres_mask = Array3::ones((1, 1, 1));

        let objective = Objective {
            images: &images,
            mask: &mask,
            lowres_mask: &lowres_mask,
            lam: 0.0,
        };
        assert!(objective.lowres_enabled());

        // full-res term masked out; the block mean of the generated patch
        // is 0.5, the real block mean is 0
        let generated = Array4::from_elem((1, 2, 2, 1), 0.5_f32);
        let logits = Array1::from(vec![0.0_f32]);

        let loss = objective.loss(generated.view(), logits.view());
        assert!((loss[0] - 0.5).abs() < 1e-6);
    }
}
