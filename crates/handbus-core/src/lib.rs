//! Register map, domain types and fault decoding shared by every handbus crate.

pub mod constants;
pub mod error;
pub mod faults;
pub mod types;

pub use error::{Error, Result};
pub use faults::{ErrorFlags, Fault};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
