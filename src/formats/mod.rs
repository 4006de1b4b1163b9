//! Transcoders for the save formats.
//!
//! All transcoders follow the same conventions:
//!
//! * **Generic over** [`std::io::Read`] + [`std::io::Seek`] inputs and
//!   [`crate::Stream`] outputs - pass a [`std::fs::File`] or a
//!   [`std::io::Cursor`].
//! * **Opaque payload** - only the fields a conversion has to move or
//!   rewrite are interpreted; every other byte is copied verbatim.
//! * **Fixed offsets are checked** - each field is written against the
//!   offset its layout assigns, and a mismatch fails with
//!   [`crate::Error::Misplaced`].
//!
//! ## Format overview
//!
//! | Module      | File | Description |
//! |-------------|------|-------------|
//! | [`archive`] | `*.bin` | Save archive; fixed segments with a byte-sum footer |
//! | [`binslot`] | `*.binslot` | Per-slot menu metadata with MD5 cross-checks |
//! | [`sdslot`]  | `sdslot.dat` | All slots' metadata in fixed windows plus an active bitmap |

pub mod archive;
pub mod binslot;
pub mod sdslot;
