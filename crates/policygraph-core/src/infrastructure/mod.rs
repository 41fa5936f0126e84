//! Infrastructure layer
//!
//! Contains implementations of domain traits against external systems.

pub mod knowledge;
