use thiserror::Error;

#[derive(Error, Debug)]
pub enum NebError {
    #[error("Degenerate reference window: half-spread of '{variable}' is {half_spread}")]
    DegenerateReferenceWindow { variable: String, half_spread: f64 },

    #[error("Missing reference value: '{variable}' has no values for {year}")]
    MissingReferenceValue { variable: String, year: i32 },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for NebError {
    fn from(err: polars::error::PolarsError) -> Self {
        NebError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NebError>;
