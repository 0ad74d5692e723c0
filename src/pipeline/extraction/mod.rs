pub mod types;
pub mod normalize;
pub mod dates;
pub mod classify;

pub use types::*;
pub use normalize::*;
pub use dates::*;
pub use classify::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Input is not text: {0}")]
    NotText(String),
}
