use crate::{Dims, Error};
use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis};
use std::path::Path;

/// Helper type used to define the source of `ImageSource`'s data
#[derive(Clone)]
pub enum ImageSource<'a> {
    /// A raw buffer of image data, see `image::load_from_memory` for details
    /// on what is supported
    Memory(&'a [u8]),
    /// The path to an image to load from disk. The image format is inferred
    /// from the file extension, see `image::open` for details
    Path(&'a Path),
    /// An already loaded image that is passed directly to the completer
    Image(image::DynamicImage),
}

impl<'a> ImageSource<'a> {
    pub fn from_path(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<image::DynamicImage> for ImageSource<'a> {
    fn from(img: image::DynamicImage) -> Self {
        Self::Image(img)
    }
}

impl<'a, S> From<&'a S> for ImageSource<'a>
where
    S: AsRef<Path> + 'a,
{
    fn from(path: &'a S) -> Self {
        Self::Path(path.as_ref())
    }
}

pub fn load_dynamic_image(src: ImageSource<'_>) -> Result<image::DynamicImage, image::ImageError> {
    match src {
        ImageSource::Memory(data) => image::load_from_memory(data),
        ImageSource::Path(path) => image::open(path),
        ImageSource::Image(img) => Ok(img),
    }
}

/// Decodes the source into an [H, W, 3] tensor with every channel mapped
/// from 0..=255 to [-1, 1]
pub(crate) fn load_image_tensor(
    src: ImageSource<'_>,
    resize: Option<Dims>,
) -> Result<Array3<f32>, Error> {
    let img = load_dynamic_image(src)?;

    let img = match resize {
        None => img.to_rgb(),
        Some(ref size) => {
            use image::GenericImageView;

            if img.width() != size.width || img.height() != size.height {
                image::imageops::resize(
                    &img.to_rgb(),
                    size.width,
                    size.height,
                    image::imageops::CatmullRom,
                )
            } else {
                img.to_rgb()
            }
        }
    };

    Ok(image_to_tensor(&img))
}

pub(crate) fn image_to_tensor(img: &image::RgbImage) -> Array3<f32> {
    let (width, height) = img.dimensions();
    let mut tensor = Array3::zeros((height as usize, width as usize, 3));

    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            tensor[[y as usize, x as usize, c]] = f32::from(pixel[c]) / 127.5 - 1.0;
        }
    }

    tensor
}

/// Inverse of the load normalization: (v + 1) / 2, clamped and scaled back
/// to 8-bit channels
pub(crate) fn tensor_to_image(tensor: ArrayView3<'_, f32>) -> image::RgbImage {
    let (height, width, _) = tensor.dim();

    image::RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let mut rgb = [0_u8; 3];
        for (c, ch) in rgb.iter_mut().enumerate() {
            let v = (tensor[[y as usize, x as usize, c]] + 1.0) / 2.0;
            *ch = (v.max(0.0).min(1.0) * 255.0) as u8;
        }
        image::Rgb(rgb)
    })
}

pub(crate) fn save_tensor(tensor: ArrayView3<'_, f32>, path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tensor_to_image(tensor).save(path).map_err(Error::from)
}

/// Grid shape used by every batch visualization: at most 8 columns,
/// as many rows as needed
pub(crate) fn grid_shape(count: usize) -> (usize, usize) {
    ((count + 7) / 8, count.min(8))
}

/// Renders the first `count` rows of a patch batch into one row-major grid
/// image with `cols` patches per row
pub(crate) fn render_grid(
    batch: ArrayView4<'_, f32>,
    count: usize,
    rows: usize,
    cols: usize,
) -> image::RgbImage {
    let (_, height, width, _) = batch.dim();
    let mut canvas = image::RgbImage::new((cols * width) as u32, (rows * height) as u32);

    for idx in 0..count.min(rows * cols) {
        let tile = tensor_to_image(batch.index_axis(Axis(0), idx));
        let ox = (idx % cols) * width;
        let oy = (idx / cols) * height;
        image::imageops::replace(&mut canvas, &tile, ox as u32, oy as u32);
    }

    canvas
}

/// Downsamples a patch batch by averaging `factor`x`factor` pixel blocks.
/// Height and width must be divisible by `factor`.
pub fn block_mean(images: ArrayView4<'_, f32>, factor: usize) -> Array4<f32> {
    let (batch, height, width, channels) = images.dim();
    debug_assert!(factor > 0 && height % factor == 0 && width % factor == 0);

    let (bh, bw) = (height / factor, width / factor);
    let norm = (factor * factor) as f32;
    let mut out = Array4::zeros((batch, bh, bw, channels));

    for b in 0..batch {
        for i in 0..bh {
            for j in 0..bw {
                for c in 0..channels {
                    let mut acc = 0.0;
                    for di in 0..factor {
                        for dj in 0..factor {
                            acc += images[[b, i * factor + di, j * factor + dj, c]];
                        }
                    }
                    out[[b, i, j, c]] = acc / norm;
                }
            }
        }
    }

    out
}

/// Upsamples by plain pixel repetition, the visualization counterpart of
/// `block_mean`
pub(crate) fn repeat_pixels(images: ArrayView4<'_, f32>, factor: usize) -> Array4<f32> {
    let (batch, height, width, channels) = images.dim();
    let mut out = Array4::zeros((batch, height * factor, width * factor, channels));

    for b in 0..batch {
        for i in 0..height * factor {
            for j in 0..width * factor {
                for c in 0..channels {
                    out[[b, i, j, c]] = images[[b, i / factor, j / factor, c]];
                }
            }
        }
    }

    out
}
