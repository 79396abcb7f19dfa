//! docn-core - Core types and traits for the retrieval core
//!
//! This crate provides the foundational types, traits, error handling and
//! configuration shared by the chunking, scoring, retrieval and evaluation
//! crates.

pub mod cancel;
pub mod config;
pub mod error;
pub mod text;
pub mod traits;
pub mod types;

pub use cancel::CancellationToken;
pub use config::*;
pub use error::{DocnError, Result};
pub use traits::*;
pub use types::*;
