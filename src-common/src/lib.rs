//! subforge Common Library
//!
//! Shared types, model catalog and platform paths used by the transcription
//! engine and its front-ends.

pub mod logging;
pub mod paths;
pub mod types;
pub mod validation;

pub use types::*;
