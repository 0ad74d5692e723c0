//! API endpoint handlers.

pub mod health;
pub mod parse;
