// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `latent-inpaint` is a light API for semantic image completion, which
//! reconstructs the missing regions of an image by searching the latent space of
//! a pretrained generative model for the code whose output best explains the
//! pixels that are still there.
//!
//! First, you build a `Session` via a `SessionBuilder`, which follows the builder pattern. Calling
//! `build` on the `SessionBuilder` loads all of the input images, restores the model weights and
//! checks for various errors.
//!
//! `Session` has a `run()` method that takes all of the parameters and inputs added in the session
//! builder and reconstructs every image, returning one `CompletedImage` per input.
//!
//! You can save or inspect the reconstruction from `CompletedImage`.
//!
//! The model itself stays behind the `CompletionModel` trait: anything that can
//! decode a latent batch into images and differentiate a loss with respect to
//! that batch can drive the completion.
//!
//! ## Features
//!
//! 1. Hole detection from a reserved sentinel color
//! 2. Centered and user supplied masks
//! 3. Batched completion of many images at once
//! 4. Images larger than the model's tile, covered by a boundary walk
//! 5. Optional low resolution consistency term
//! 6. On-disk snapshots and per-image optimization traces
//!
//! ## Usage
//! Session follows a "builder pattern" for defining parameters, meaning you chain functions together.
//!
//! ```no_run
//! # use latent_inpaint::{Error, Evaluation, Objective};
//! # use latent_inpaint::ndarray::{Array1, Array2, Array4, ArrayView2, ArrayView4};
//! # struct Dcgan;
//! # impl latent_inpaint::CompletionModel for Dcgan {
//! #     fn restore(&mut self, _: &std::path::Path) -> Result<(), Error> {
//! #         Ok(())
//! #     }
//! #     fn latent_dim(&self) -> usize {
//! #         100
//! #     }
//! #     fn batch_size(&self) -> usize {
//! #         64
//! #     }
//! #     fn image_size(&self) -> u32 {
//! #         64
//! #     }
//! #     fn generate(&mut self, latents: ArrayView2<'_, f32>) -> Result<Array4<f32>, Error> {
//! #         Ok(Array4::zeros((latents.dim().0, 64, 64, 3)))
//! #     }
//! #     fn score(
//! #         &mut self,
//! #         images: ArrayView4<'_, f32>,
//! #     ) -> Result<(Array1<f32>, Array1<f32>), Error> {
//! #         Ok((Array1::zeros(images.dim().0), Array1::zeros(images.dim().0)))
//! #     }
//! #     fn evaluate(
//! #         &mut self,
//! #         latents: ArrayView2<'_, f32>,
//! #         _objective: &Objective<'_>,
//! #     ) -> Result<Evaluation, Error> {
//! #         Ok(Evaluation {
//! #             loss: Array1::zeros(latents.dim().0),
//! #             gradient: Array2::zeros(latents.raw_dim()),
//! #             images: Array4::zeros((latents.dim().0, 64, 64, 3)),
//! #         })
//! #     }
//! # }
//! // Create a new session with default parameters
//! let session = latent_inpaint::Session::builder()
//!     // The pretrained model driving the reconstruction
//!     .model(Dcgan)
//!     .checkpoint_dir("checkpoint")
//!     // Specify input images
//!     .add_image(&"imgs/1.jpg")
//!     // Build the session
//!     .build().expect("failed to build session");
//!
//! // Reconstruct the missing regions
//! let completed = session.run(None).expect("completion failed");
//!
//! // Save the reconstruction to disk
//! completed[0].save("imgs/1.completed.jpg").expect("failed to save image");
//! ```
mod adam;
mod artifacts;
mod complete;
mod errors;
mod mask;
mod model;
pub mod session;
mod traversal;
mod utils;

pub use image;
pub use ndarray;
use std::path::{Path, PathBuf};

pub use errors::Error;
pub use mask::MaskSpec;
pub use model::{adversarial_loss, contextual_loss, CompletionModel, Evaluation, Objective};
pub use session::{CompletionProgress, ProgressStat, ProgressUpdate, Session, SessionBuilder};
pub use utils::{block_mean, load_dynamic_image, ImageSource};

use ndarray::Array3;

/// Simple dimensions struct
#[derive(Copy, Clone)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

struct Parameters {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    lam: f32,
    iterations: usize,
    output_interval: usize,
    tile_step: u32,
    batch_size: Option<usize>,
    seed: u64,
    resize_input: Option<Dims>,
    checkpoint_dir: PathBuf,
    output_dir: Option<PathBuf>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            lam: 0.1,
            iterations: 1200,
            output_interval: 50,
            tile_step: 50,
            batch_size: None,
            seed: 0,
            resize_input: None,
            checkpoint_dir: PathBuf::from("checkpoint"),
            output_dir: None,
        }
    }
}

impl Parameters {
    fn to_completion_params(&self) -> complete::CompletionParams {
        complete::CompletionParams {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            lam: self.lam,
            iterations: self.iterations,
            output_interval: self.output_interval,
            tile_step: self.tile_step,
        }
    }
}

/// One reconstruction produced by `Session::run()`
pub struct CompletedImage {
    tensor: Array3<f32>,
    diverged: bool,
}

impl CompletedImage {
    /// Saves the reconstruction to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("");
        if !matches!(ext, "png" | "jpg" | "jpeg" | "bmp") {
            return Err(Error::UnsupportedOutputFormat(ext.to_owned()));
        }

        utils::save_tensor(self.tensor.view(), path)
    }

    /// Whether the optimization diverged before every tile was reconstructed.
    /// The tiles that were never reached keep their input pixels.
    pub fn diverged(&self) -> bool {
        self.diverged
    }

    /// The reconstruction in the model's value range, shaped height by width
    /// by channel
    pub fn tensor(&self) -> &Array3<f32> {
        &self.tensor
    }

    /// Consumes the reconstruction and returns the underlying tensor
    pub fn into_tensor(self) -> Array3<f32> {
        self.tensor
    }

    /// Returns the reconstruction converted back to 8 bit color
    pub fn to_image(&self) -> image::RgbImage {
        utils::tensor_to_image(self.tensor.view())
    }
}
