use std::fmt;

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f32,
    pub(crate) max: f32,
    pub(crate) value: f32,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

#[derive(Debug)]
pub struct SizeMismatch {
    pub(crate) actual: (u32, u32),
    pub(crate) expected: (u32, u32),
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the size ({}x{}) does not match the required size ({}x{})",
            self.actual.0, self.actual.1, self.expected.0, self.expected.1
        )
    }
}

#[derive(Debug)]
pub enum Error {
    /// An error in the image library occurred, eg failed to load/save
    Image(image::ImageError),
    /// An input parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// Images completed in the same batch must share dimensions, and an
    /// explicit mask must match the model's patch shape
    SizeMismatch(SizeMismatch),
    /// The configured batch size must match the one the model was built for
    BatchMismatch(usize, usize),
    /// An input image is smaller than one tile, so no patch can be cut from it
    ImageTooSmall(u32, u32, u32),
    /// Io is notoriously error free with no problems, but we cover it just in case!
    Io(std::io::Error),
    /// The user specified an image format we don't support as the output
    UnsupportedOutputFormat(String),
    /// The model's pretrained weights could not be restored; completion
    /// cannot run without them
    Checkpoint(std::path::PathBuf),
    /// There are no input images to complete
    NoImages,
    /// A session cannot be built without a completion model
    NoModel,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(ie) => write!(f, "{}", ie),
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::SizeMismatch(sm) => write!(f, "{}", sm),
            Self::BatchMismatch(model, config) => write!(
                f,
                "the model evaluates batches of {}, but {} was configured",
                model, config
            ),
            Self::ImageTooSmall(width, height, tile) => write!(
                f,
                "the input image ({}x{}) is smaller than a single {2}x{2} tile",
                width, height, tile
            ),
            Self::Io(io) => write!(f, "{}", io),
            Self::UnsupportedOutputFormat(fmt) => {
                write!(f, "the output format '{}' is not supported", fmt)
            }
            Self::Checkpoint(dir) => write!(
                f,
                "no restorable model checkpoint was found under '{}'",
                dir.display()
            ),
            Self::NoImages => write!(f, "at least 1 input image must be provided"),
            Self::NoModel => write!(f, "a completion model must be provided"),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}
