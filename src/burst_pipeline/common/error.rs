use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Failed to decode raw image: {0}")]
    DecodeError(String),

    #[error("Failed to encode output image: {0}")]
    EncodeError(String),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error(
        "Frame {frame_index} dimensions {got_width}x{got_height} do not match reference {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        frame_index: usize,
        expected_width: usize,
        expected_height: usize,
        got_width: usize,
        got_height: usize,
    },

    #[error("Burst contains no frames")]
    EmptyBurst,

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Finishing stage '{stage}' failed: {reason}")]
    Finishing { stage: &'static str, reason: String },

    #[error("Processing cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
