use crate::*;
use ndarray::Array3;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use std::path::PathBuf;

/// Semantic image completion session.
///
/// Calling `run()` will reconstruct the missing regions of every input image
/// and return the results, consuming the session in the process. You can
/// provide a `CompletionProgress` implementation to periodically get updates
/// with the current reconstruction and the optimization loss.
///
/// # Example
/// ```no_run
/// # use latent_inpaint::{Error, Evaluation, Objective};
/// # use latent_inpaint::ndarray::{Array1, Array2, Array4, ArrayView2, ArrayView4};
/// # struct Dcgan;
/// # impl latent_inpaint::CompletionModel for Dcgan {
/// #     fn restore(&mut self, _: &std::path::Path) -> Result<(), Error> {
/// #         Ok(())
/// #     }
/// #     fn latent_dim(&self) -> usize {
/// #         100
/// #     }
/// #     fn batch_size(&self) -> usize {
/// #         64
/// #     }
/// #     fn image_size(&self) -> u32 {
/// #         64
/// #     }
/// #     fn generate(&mut self, latents: ArrayView2<'_, f32>) -> Result<Array4<f32>, Error> {
/// #         Ok(Array4::zeros((latents.dim().0, 64, 64, 3)))
/// #     }
/// #     fn score(
/// #         &mut self,
/// #         images: ArrayView4<'_, f32>,
/// #     ) -> Result<(Array1<f32>, Array1<f32>), Error> {
/// #         Ok((Array1::zeros(images.dim().0), Array1::zeros(images.dim().0)))
/// #     }
/// #     fn evaluate(
/// #         &mut self,
/// #         latents: ArrayView2<'_, f32>,
/// #         _objective: &Objective<'_>,
/// #     ) -> Result<Evaluation, Error> {
/// #         Ok(Evaluation {
/// #             loss: Array1::zeros(latents.dim().0),
/// #             gradient: Array2::zeros(latents.raw_dim()),
/// #             images: Array4::zeros((latents.dim().0, 64, 64, 3)),
/// #         })
/// #     }
/// # }
/// let session = latent_inpaint::Session::builder()
///     .model(Dcgan)
///     .add_image(&"imgs/portrait.png")
///     .checkpoint_dir("checkpoint")
///     .build().expect("failed to build session");
///
/// let completed = session.run(None).expect("completion failed");
/// completed[0].save("portrait-completed.png").expect("failed to save image");
/// ```
pub struct Session {
    model: Box<dyn CompletionModel>,
    images: Vec<Array3<f32>>,
    mask: MaskSpec,
    lowres_mask: Array3<f32>,
    params: Parameters,
}

impl Session {
    /// Creates a new session with default parameters.
    pub fn builder<'a>() -> SessionBuilder<'a> {
        SessionBuilder::default()
    }

    /// Runs the completion and outputs one reconstruction per input image, in
    /// input order.
    pub fn run(
        mut self,
        mut progress: Option<Box<dyn CompletionProgress>>,
    ) -> Result<Vec<CompletedImage>, Error> {
        let params = self.params.to_completion_params();
        let sink = artifacts::ArtifactSink::new(self.params.output_dir.clone());
        let mut rng = Pcg32::seed_from_u64(self.params.seed);

        let batch_size = self.model.batch_size();
        let count = self.images.len();
        let mut flags = vec![false; count];

        // Consecutive chunks of up to one batch, each padded and completed as
        // a unit
        let mut start = 0;
        while start < count {
            let end = (start + batch_size).min(count);
            let diverged = complete::complete_chunk(
                &mut *self.model,
                &mut self.images[start..end],
                &self.mask,
                &self.lowres_mask,
                &params,
                &sink,
                &mut rng,
                progress.as_deref_mut(),
            )?;

            if diverged {
                for flag in &mut flags[start..end] {
                    *flag = true;
                }
            }

            start = end;
        }

        Ok(self
            .images
            .into_iter()
            .zip(flags)
            .map(|(tensor, diverged)| CompletedImage { tensor, diverged })
            .collect())
    }
}

/// Builds a session by setting parameters and adding input images, calling
/// `build` will check all of the provided inputs to verify that image
/// completion will provide valid output
#[derive(Default)]
pub struct SessionBuilder<'a> {
    model: Option<Box<dyn CompletionModel>>,
    images: Vec<ImageSource<'a>>,
    mask: MaskSpec,
    lowres_mask: Option<Array3<f32>>,
    params: Parameters,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pretrained model whose latent space the completion searches.
    ///
    /// The model dictates the tile size, the batch size and the latent
    /// dimensionality; its weights are restored from `checkpoint_dir` during
    /// `build`.
    pub fn model<M: CompletionModel + 'static>(mut self, model: M) -> Self {
        self.model = Some(Box::new(model));
        self
    }

    /// Adds an image whose missing regions the session will reconstruct.
    pub fn add_image<I: Into<ImageSource<'a>>>(mut self, image: I) -> Self {
        self.images.push(image.into());
        self
    }

    /// Adds images whose missing regions the session will reconstruct.
    pub fn add_images<E: Into<ImageSource<'a>>, I: IntoIterator<Item = E>>(
        mut self,
        images: I,
    ) -> Self {
        self.images.extend(images.into_iter().map(|i| i.into()));
        self
    }

    /// Selects how the missing regions are found.
    ///
    /// Default: `MaskSpec::Sentinel`, which treats pixels painted in the
    /// reserved hole color as missing.
    pub fn mask(mut self, mask: MaskSpec) -> Self {
        self.mask = mask;
        self
    }

    /// Enables the low resolution loss term with the given binary weights,
    /// shaped like one tile downsampled by the model's `lowres_factor`.
    ///
    /// Default: disabled.
    pub fn lowres_mask(mut self, mask: Array3<f32>) -> Self {
        self.lowres_mask = Some(mask);
        self
    }

    /// Overwrite incoming images sizes
    pub fn resize_input(mut self, dims: Dims) -> Self {
        self.params.resize_input = Some(dims);
        self
    }

    /// Changes the seed of the latent initialization stream. The same seed
    /// with the same inputs reproduces the same reconstruction.
    ///
    /// Default: 0
    pub fn seed(mut self, value: u64) -> Self {
        self.params.seed = value;
        self
    }

    /// The step size of the latent space descent.
    ///
    /// Default: 0.01
    pub fn learning_rate(mut self, value: f32) -> Self {
        self.params.learning_rate = value;
        self
    }

    /// The decay rate of the gradient running average.
    ///
    /// Default: 0.9
    pub fn beta1(mut self, value: f32) -> Self {
        self.params.beta1 = value;
        self
    }

    /// The decay rate of the squared gradient running average.
    ///
    /// Default: 0.999
    pub fn beta2(mut self, value: f32) -> Self {
        self.params.beta2 = value;
        self
    }

    /// The divide-by-zero guard of the adaptive step size.
    ///
    /// Default: 1e-8
    pub fn epsilon(mut self, value: f32) -> Self {
        self.params.epsilon = value;
        self
    }

    /// The weight of the perceptual term against the contextual term.
    ///
    /// Larger values push reconstructions towards images the model considers
    /// realistic, at the cost of fidelity to the known pixels.
    ///
    /// Default: 0.1
    pub fn lam(mut self, value: f32) -> Self {
        self.params.lam = value;
        self
    }

    /// How many descent steps each tile is optimized for.
    ///
    /// Default: 1200
    pub fn iterations(mut self, count: usize) -> Self {
        self.params.iterations = count;
        self
    }

    /// How often intermediate reconstructions are stitched back, snapshotted
    /// and reported, in iterations.
    ///
    /// Default: 50
    pub fn output_interval(mut self, count: usize) -> Self {
        self.params.output_interval = count;
        self
    }

    /// The distance between neighboring tiles of the boundary walk, in
    /// pixels. Must not exceed the model's tile size or coverage gaps appear.
    ///
    /// Default: 50
    pub fn tile_step(mut self, step: u32) -> Self {
        self.params.tile_step = step;
        self
    }

    /// Cross-checks the expected batch size against the model's. Completion
    /// always runs at the model's batch size; this only guards against
    /// loading a checkpoint built for a different one.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.params.batch_size = Some(size);
        self
    }

    /// The directory the model's pretrained weights are restored from.
    ///
    /// Default: "checkpoint"
    pub fn checkpoint_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.params.checkpoint_dir = dir.into();
        self
    }

    /// Enables the on-disk record of the run: inputs, masked inputs,
    /// intermediate snapshots, per-image optimization traces and the final
    /// stitched grid, all under the given directory.
    ///
    /// Default: disabled.
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.params.output_dir = Some(dir.into());
        self
    }

    /// Creates a `Session`, or returns an error if invalid parameters or input
    /// images were specified.
    pub fn build(mut self) -> Result<Session, Error> {
        self.check_parameters_validity()?;

        let mut model = self.model.take().ok_or(Error::NoModel)?;

        if model.batch_size() == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: std::f32::INFINITY,
                value: model.batch_size() as f32,
                name: "batch-size",
            }));
        }

        if model.latent_dim() == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: std::f32::INFINITY,
                value: model.latent_dim() as f32,
                name: "latent-dim",
            }));
        }

        if model.image_size() == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: std::f32::INFINITY,
                value: model.image_size() as f32,
                name: "image-size",
            }));
        }

        let size = model.image_size() as usize;

        if let Some(configured) = self.params.batch_size {
            if configured != model.batch_size() {
                return Err(Error::BatchMismatch(model.batch_size(), configured));
            }
        }

        self.mask.validate(size, 3)?;

        let lowres_mask = match self.lowres_mask.take() {
            Some(mask) => {
                let factor = model.lowres_factor() as usize;
                if factor == 0 || size % factor != 0 {
                    return Err(Error::InvalidRange(errors::InvalidRange {
                        min: 1.0,
                        max: size as f32,
                        value: factor as f32,
                        name: "lowres-factor",
                    }));
                }

                let small = size / factor;
                let dim = mask.dim();
                if dim != (small, small, 3) {
                    return Err(Error::SizeMismatch(errors::SizeMismatch {
                        actual: (dim.1 as u32, dim.0 as u32),
                        expected: (small as u32, small as u32),
                    }));
                }

                if let Some(value) = mask.iter().find(|v| !mask::is_binary(**v)) {
                    return Err(Error::InvalidRange(errors::InvalidRange {
                        min: 0.0,
                        max: 1.0,
                        value: *value,
                        name: "lowres-mask",
                    }));
                }

                mask
            }
            // An all-zero mask keeps the term inert
            None => {
                let factor = model.lowres_factor().max(1) as usize;
                Array3::zeros((size / factor, size / factor, 3))
            }
        };

        if self.images.is_empty() {
            return Err(Error::NoImages);
        }

        let mut images = Vec::with_capacity(self.images.len());
        for src in self.images {
            images.push(utils::load_image_tensor(src, self.params.resize_input)?);
        }

        for img in &images {
            let (height, width, _) = img.dim();
            if width < size || height < size {
                return Err(Error::ImageTooSmall(
                    width as u32,
                    height as u32,
                    size as u32,
                ));
            }
        }

        // Images sharing a batch are padded into one tensor, so each chunk
        // must agree on dimensions
        for chunk in images.chunks(model.batch_size()) {
            let expected = chunk[0].dim();
            for img in chunk {
                let actual = img.dim();
                if actual != expected {
                    return Err(Error::SizeMismatch(errors::SizeMismatch {
                        actual: (actual.1 as u32, actual.0 as u32),
                        expected: (expected.1 as u32, expected.0 as u32),
                    }));
                }
            }
        }

        model.restore(&self.params.checkpoint_dir)?;

        Ok(Session {
            model,
            images,
            mask: self.mask,
            lowres_mask,
            params: self.params,
        })
    }

    fn check_parameters_validity(&self) -> Result<(), Error> {
        if self.params.learning_rate <= 0.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: std::f32::INFINITY,
                value: self.params.learning_rate,
                name: "learning-rate",
            }));
        }

        if self.params.beta1 < 0.0 || self.params.beta1 >= 1.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: 1.0,
                value: self.params.beta1,
                name: "beta1",
            }));
        }

        if self.params.beta2 < 0.0 || self.params.beta2 >= 1.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: 1.0,
                value: self.params.beta2,
                name: "beta2",
            }));
        }

        if self.params.epsilon <= 0.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: std::f32::INFINITY,
                value: self.params.epsilon,
                name: "epsilon",
            }));
        }

        if self.params.lam < 0.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: std::f32::INFINITY,
                value: self.params.lam,
                name: "lam",
            }));
        }

        if self.params.iterations == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: std::f32::INFINITY,
                value: self.params.iterations as f32,
                name: "iterations",
            }));
        }

        if self.params.output_interval == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: std::f32::INFINITY,
                value: self.params.output_interval as f32,
                name: "output-interval",
            }));
        }

        if self.params.tile_step == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: std::f32::INFINITY,
                value: self.params.tile_step as f32,
                name: "tile-step",
            }));
        }

        Ok(())
    }
}

/// Helper struct for passing progress information to external callers
pub struct ProgressStat {
    /// The current amount of work that has been done
    pub current: usize,
    /// The total amount of work to do
    pub total: usize,
}

/// The current state of the image completion
pub struct ProgressUpdate<'a> {
    /// The first image of the chunk being completed, with every finished tile
    /// stitched in
    pub image: &'a Array3<f32>,
    /// The tile progress within the current chunk
    pub total: ProgressStat,
    /// The optimization progress within the current tile
    pub stage: ProgressStat,
    /// The mean loss over the chunk's images at this report
    pub loss: f32,
}

/// Allows the completion loop to update external callers with the current
/// progress of the reconstruction
pub trait CompletionProgress {
    fn update(&mut self, info: ProgressUpdate<'_>);
}

impl<G> CompletionProgress for G
where
    G: FnMut(ProgressUpdate<'_>) + Send,
{
    fn update(&mut self, info: ProgressUpdate<'_>) {
        self(info)
    }
}
