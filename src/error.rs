use thiserror::Error;

/// Failure kinds surfaced by the hotword toolkit.
#[derive(Error, Debug)]
pub enum Error {
    /// WAV header bad, model magic bad, or an unknown layer id in a model file.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("unsupported model version: {0}")]
    VersionUnsupported(u16),

    /// Kernel input dimensions disagree with declared parameter shapes.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("unsupported layer type: {0}")]
    UnsupportedLayer(String),

    #[error("dataset contains no samples")]
    EmptyDataset,

    #[error("audio device error: {0}")]
    DeviceError(String),

    /// Cooperative shutdown. Not reported to the user as a failure.
    #[error("canceled")]
    Canceled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => Error::Io(io),
            other => Error::InvalidFormat(other.to_string()),
        }
    }
}
