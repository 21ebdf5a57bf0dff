//! Core message handling for soapwire.
//!
//! This crate holds the I/O-free parts of the transport adapter, shared by
//! the client crate (`soapwire-client`) and its tests:
//!
//! ## Modules
//!
//! - [`error`]: Error type for buffering and reconstruction failures
//! - [`buffer`]: Growable byte buffer with page-sized growth
//! - [`assembler`]: Collapses partial writes into one complete message
//! - [`headers`]: Raw response header blocks and their reconstruction
//! - [`content`]: Content kind detection used by the diagnostic log
//! - [`format`]: Hex, text and XML pretty printers for diagnostics

mod assembler;
mod buffer;
mod content;
mod error;
pub mod format;
mod headers;

pub use assembler::*;
pub use buffer::*;
pub use content::*;
pub use error::*;
pub use headers::*;
