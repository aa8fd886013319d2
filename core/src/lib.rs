pub mod point_set;
pub mod preprocess;

pub use point_set::*;
pub use preprocess::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Numeric instability: {0}")]
    NumericInstability(String),

    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),
}

pub type Result<T> = std::result::Result<T, Error>;
