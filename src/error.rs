use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unable to read area of interest: {0}")]
    Geometry(String),

    #[error("Remote evaluation failed ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("Band {0} is missing from the sample table")]
    MissingBand(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
