use latent_inpaint as li;
use li::ndarray::{Array1, Array2, Array4, ArrayView2, ArrayView4, Axis};
use std::path::Path;

/// A tiny stand-in for a pretrained generator: each latent vector is an RGB
/// color, and the analytic gradient drives it toward the known pixels around
/// the holes. Real deployments implement `CompletionModel` on top of their
/// network runtime instead.
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

        // d/dz of the masked L1 term; the adversarial term is constant here
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

fn main() -> Result<(), li::Error> {
    // A soft ramp backdrop with a block of the sentinel hole color; any
    // pixel close to (255, 0, 255) is treated as missing
    let mut img = li::image::RgbImage::from_fn(64, 64, |_, y| {
        let v = 120 + (y / 4) as u8;
        li::image::Rgb([v, v, v])
    });
    for y in 20..44 {
        for x in 14..50 {
            img.put_pixel(x, y, li::image::Rgb([255, 0, 255]));
        }
    }

    let completed = li::Session::builder()
        .model(MeanColor)
        .add_image(li::image::DynamicImage::ImageRgb8(img))
        // the color converges well before this
        .iterations(300)
        .seed(7)
        .build()?
        .run(None)?;

    // save the result to the disk
    completed[0].save("out/01.png")
}
