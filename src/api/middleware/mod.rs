//! Middleware applied to every API route.

pub mod audit;
