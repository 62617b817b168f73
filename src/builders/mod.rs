//! # Builders
//!
//! This module provides builder patterns for runtime configuration.
//!
//! ## Modules
//!
//! - [`batch_builder`] - Worker count and deadline for batch decryption
//!
//! ## Usage
//!
//! Builders provide a fluent API with the crate's defaults filled in.

pub mod batch_builder;

pub use batch_builder::{BatchConfig, BatchConfigBuilder};
