pub mod extraction;
pub mod structuring;
