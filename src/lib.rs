//! **p4gsave** - convert Persona 4 Golden save directories between the PC
//! and portable releases.
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::archive`] | `system.bin` / `dataNNNN.bin` save archive, both layouts |
//! | [`formats::binslot`] | `.binslot` standalone slot metadata (PC) |
//! | [`formats::sdslot`]  | `sce_sys/sdslot.dat` slot metadata container (portable) |
//! | [`manifest`]         | `remotecache.vdf` cloud-sync manifest (PC) |
//!
//! [`convert`] ties these together into whole-directory conversions.

pub mod convert;
pub mod error;
pub mod formats;
pub mod hash;
pub mod manifest;
pub mod utils;

pub use error::{Error, Result};
pub use utils::Stream;
