use std::io;
use std::path::PathBuf;

/// Errors surfaced by [`Renderer`](crate::render::Renderer) and the dataset
/// loaders. Each variant names the stage that failed.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to load HRIR dataset from {path}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
    #[error("Failed to decode input audio {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("HRIR dataset holds no measurements")]
    EmptyDataset,
    #[error("Convolution failed")]
    Convolve(#[from] realfft::FftError),
    #[error("Failed to write output audio {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("Render cancelled after {completed} of {total} blocks")]
    Cancelled { completed: usize, total: usize },
    #[error("Invalid render options: {0}")]
    InvalidOptions(&'static str),
}

impl Error {
    pub(crate) fn load<P: Into<PathBuf>>(path: P, source: LoadError) -> Self {
        Error::Load {
            path: path.into(),
            source,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    Io(#[from] io::Error),
    #[error("Invalid impulse response file")]
    Wav(#[from] hound::Error),
    #[error("No usable measurements found")]
    Empty,
    #[error("Left ({left}) and right ({right}) impulse responses differ in length at azimuth {azimuth}")]
    ChannelLengthMismatch {
        azimuth: f32,
        left: usize,
        right: usize,
    },
    #[error("Container holds {0} receiver(s), two are required")]
    MissingReceivers(usize),
    #[cfg(feature = "sofa")]
    #[error("SOFA container error")]
    Sofa(#[from] SofaError),
}

#[cfg(feature = "sofa")]
#[derive(thiserror::Error, Debug)]
pub enum SofaError {
    #[error("The owls are not what they seem")]
    InternalError,
    #[error("Invalid data format")]
    InvalidFormat,
    #[error("Format is not supported")]
    UnsupportedFormat,
    #[error("Ran out of memory")]
    NoMemory,
    #[error("Unable to read from file")]
    ReadError,
    #[error("Invalid attributes")]
    InvalidAttributes,
    #[error("Invalid dimensions")]
    InvalidDimensions,
    #[error("Invalid dimension list")]
    InvalidDimensionList,
    #[error("Invalid coordinate type")]
    InvalidCoordinateType,
    #[error("Invalid receiver position")]
    InvalidReceiverPositions,
    #[error("Emitters without ECI are not supported")]
    OnlyEmitterWithEciSupported,
    #[error("Delays without IR or MR are not supported")]
    OnlyDelaysWithIrOrMrSupported,
    #[error("Sources without MC are not supported")]
    OnlySourcesWithMcSupported,
    #[error("Sampling rates differ")]
    OnlyTheSameSamplingRateSupported,
    #[error("Receivers without RCI are not supported")]
    ReceiversWithRciSupported,
    #[error("Receivers without cartesian coordinates are not supported")]
    ReceiversWithCartesianSupported,
}

#[cfg(feature = "sofa")]
impl SofaError {
    pub(crate) fn from_raw(err: i32) -> SofaError {
        use SofaError::*;

        match err {
            ffi::MYSOFA_INVALID_FORMAT => InvalidFormat,
            ffi::MYSOFA_UNSUPPORTED_FORMAT => UnsupportedFormat,
            ffi::MYSOFA_NO_MEMORY => NoMemory,
            ffi::MYSOFA_READ_ERROR => ReadError,
            ffi::MYSOFA_INVALID_ATTRIBUTES => InvalidAttributes,
            ffi::MYSOFA_INVALID_DIMENSIONS => InvalidDimensions,
            ffi::MYSOFA_INVALID_DIMENSION_LIST => InvalidDimensionList,
            ffi::MYSOFA_INVALID_COORDINATE_TYPE => InvalidCoordinateType,
            ffi::MYSOFA_INVALID_RECEIVER_POSITIONS => InvalidReceiverPositions,
            ffi::MYSOFA_ONLY_EMITTER_WITH_ECI_SUPPORTED => OnlyEmitterWithEciSupported,
            ffi::MYSOFA_ONLY_DELAYS_WITH_IR_OR_MR_SUPPORTED => OnlyDelaysWithIrOrMrSupported,
            ffi::MYSOFA_ONLY_SOURCES_WITH_MC_SUPPORTED => OnlySourcesWithMcSupported,
            ffi::MYSOFA_ONLY_THE_SAME_SAMPLING_RATE_SUPPORTED => OnlyTheSameSamplingRateSupported,
            ffi::MYSOFA_RECEIVERS_WITH_RCI_SUPPORTED => ReceiversWithRciSupported,
            ffi::MYSOFA_RECEIVERS_WITH_CARTESIAN_SUPPORTED => ReceiversWithCartesianSupported,
            _ => InternalError,
        }
    }
}
