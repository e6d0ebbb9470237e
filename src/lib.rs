//! # MediaCloud Stream
//!
//! Harvests story metadata from the MediaCloud search API one day at a time,
//! drops duplicate URLs, and republishes each unique story to Kafka and/or a
//! newline-delimited JSON log.
//!
//! ## Modules
//!
//! - [`harvest`]: the date-windowed, cursor-paginated harvest loop
//! - [`api`]: the search backend seam and its MediaCloud implementation
//! - [`outputs`]: the publisher and its sinks
//! - [`config`] / [`cli`]: run configuration
//! - [`models`], [`error`], [`utils`]: shared types and helpers

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod harvest;
pub mod models;
pub mod outputs;
pub mod utils;
