use latent_inpaint as li;
use li::ndarray::{Array1, Array2, Array4, ArrayView2, ArrayView4, Axis};
use std::path::Path;

/// Same stand-in generator as in the first demo: one RGB color per latent
struct MeanColor;

impl li::CompletionModel for MeanColor {
    fn restore(&mut self, _checkpoint_dir: &Path) -> Result<(), li::Error> {
        Ok(())
    }

    fn latent_dim(&self) -> usize {
        3
    }

    fn batch_size(&self) -> usize {
        1
    }

    fn image_size(&self) -> u32 {
        64
    }

    fn generate(&mut self, latents: ArrayView2<'_, f32>) -> Result<Array4<f32>, li::Error> {
        let mut images = Array4::zeros((latents.dim().0, 64, 64, 3));
        for (row, latent) in latents.outer_iter().enumerate() {
            let mut image = images.index_axis_mut(Axis(0), row);
            for i in 0..64 {
                for j in 0..64 {
                    for c in 0..3 {
                        image[[i, j, c]] = latent[c];
                    }
                }
            }
        }
        Ok(images)
    }

    fn score(
        &mut self,
        images: ArrayView4<'_, f32>,
    ) -> Result<(Array1<f32>, Array1<f32>), li::Error> {
        let batch = images.dim().0;
        Ok((Array1::from_elem(batch, 0.5), Array1::zeros(batch)))
    }

    fn evaluate(
        &mut self,
        latents: ArrayView2<'_, f32>,
        objective: &li::Objective<'_>,
    ) -> Result<li::Evaluation, li::Error> {
        let images = self.generate(latents)?;
        let logits = Array1::zeros(latents.dim().0);

        let mut gradient = Array2::zeros(latents.dim());
        for (row, generated) in images.outer_iter().enumerate() {
            let real = objective.images.index_axis(Axis(0), row);
            for i in 0..64 {
                for j in 0..64 {
                    for c in 0..3 {
                        let m = objective.mask[[i, j, c]];
                        gradient[[row, c]] +=
                            m * (generated[[i, j, c]] - real[[i, j, c]]).signum();
                    }
                }
            }
        }

        Ok(li::Evaluation {
            loss: objective.loss(images.view(), logits.view()),
            gradient,
            images,
        })
    }
}

struct PrintProgress;

impl li::CompletionProgress for PrintProgress {
    fn update(&mut self, info: li::ProgressUpdate<'_>) {
        println!(
            "tile {}/{} iteration {}/{} loss {:.3}",
            info.total.current + 1,
            info.total.total,
            info.stage.current,
            info.stage.total,
            info.loss
        );
    }
}

fn main() -> Result<(), li::Error> {
    // Run with RUST_LOG=debug to also see the per-tile decisions
    env_logger::init();

    let img = li::image::RgbImage::from_fn(64, 64, |_, y| {
        let v = 120 + (y / 4) as u8;
        li::image::Rgb([v, v, v])
    });

    let completed = li::Session::builder()
        .model(MeanColor)
        .add_image(li::image::DynamicImage::ImageRgb8(img))
        // regenerate the centered square, ignoring the image content there
        .mask(li::MaskSpec::Center { scale: 0.25 })
        .iterations(200)
        .output_interval(25)
        .seed(31)
        // snapshots, the masked inputs and per-image optimization traces
        // all land under this directory
        .output_dir("out/02")
        .build()?
        .run(Some(Box::new(PrintProgress)))?;

    completed[0].save("out/02/result.png")
}
