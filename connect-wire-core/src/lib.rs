//! Core protocol types for the Connect wire format.
//!
//! This crate provides the pieces of the Connect protocol that are
//! independent of any particular HTTP client or server:
//!
//! - [`error`]: status codes, error values, and their JSON wire forms
//! - [`codec`]: compression codecs and the codec registry
//! - [`envelope`]: streaming envelope framing functions
//! - [`metadata`]: the case-insensitive, multi-valued header model

mod codec;
mod envelope;
mod error;
mod metadata;

pub use codec::*;
pub use envelope::*;
pub use error::*;
pub use metadata::*;
