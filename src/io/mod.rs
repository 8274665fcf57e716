//! Input/output helpers.
//!
//! - plate-reader text parsing (`reader`)
//! - layout JSON read/write (`layout`)
//! - TSV exports (`export`)
//! - curve JSON read/write (`curve`)

pub mod curve;
pub mod export;
pub mod layout;
pub mod reader;

pub use curve::*;
pub use export::*;
pub use layout::*;
pub use reader::*;
