use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CalibError {
    #[error("mesh data has not been assigned")]
    DataNotSet,
    #[error(
        "mesh shape mismatch: got {actual_rows}x{actual_cols}, expected {expected_rows}x{expected_cols}"
    )]
    ShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },
    #[error("grid index ({row}, {col}) out of bounds")]
    OutOfBounds { row: usize, col: usize },
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    #[error("configuration error: {0}")]
    Config(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
