//! SDSLOT - consolidated slot metadata container (portable only).
//!
//! `sce_sys/sdslot.dat` holds the metadata for every slot of one save
//! directory: one fixed window per slot plus a bitmap of which windows are
//! live. Each window carries the embedded form of a
//! [`crate::formats::binslot`] record.
//!
//! ## Layout (0x40400 bytes)
//! ```text
//! [0x000] Magic "SDSL"                   (4 bytes)
//! [0x009] Version (1)                    (u8)
//! [0x200] ActiveSlots                    (17 × u8, 1 = present)
//! [0x400] Slot windows                   (17 × 0x400 bytes)
//! [0x4800] Zero                          (to 0x40400)
//! ```
//!
//! Slot 0 is the system slot (`system.bin`); slots 1-16 are the numbered
//! data slots (`data0001.bin` .. `data0016.bin`). A window holds the
//! 0x34C-byte payload followed by zeroes.

use std::io::{Read, Seek, SeekFrom, Take, Write};

use log::debug;

use super::binslot;
use crate::utils::{SegmentWriter, bytesa, magic, u8};
use crate::{Error, Result};

/// Magic at offset 0.
pub const MAGIC: &[u8; 4] = b"SDSL";
/// Offset of the version byte.
pub const VERSION_OFFSET: u64 = 9;
/// The only version understood.
pub const VERSION: u8 = 1;
/// Offset of the active-slot bitmap.
pub const BITMAP_OFFSET: u64 = 0x200;
/// System slot plus sixteen data slots.
pub const SLOT_COUNT: usize = 17;
/// Offset of window 0.
pub const WINDOW_OFFSET: u64 = 0x400;
/// Length of each slot window.
pub const WINDOW_LEN: u64 = 0x400;
/// End of the last slot window.
pub const WINDOWS_END: u64 = WINDOW_OFFSET + SLOT_COUNT as u64 * WINDOW_LEN;
/// Total container length; the space past [`WINDOWS_END`] is zero.
pub const CONTAINER_LEN: u64 = 0x40400;

const _: () = assert!(WINDOWS_END <= CONTAINER_LEN);

/// Absolute offset of slot `index`'s window.
pub fn window_offset(index: usize) -> Result<u64> {
    if index >= SLOT_COUNT {
        return Err(Error::InvalidSlot(index));
    }
    Ok(WINDOW_OFFSET + index as u64 * WINDOW_LEN)
}

/// Parsed container header.
#[derive(Debug, Clone)]
pub struct Sdslot {
    /// Format version byte.
    pub version: u8,
    /// Active flag per slot.
    pub active: [bool; SLOT_COUNT],
}

impl Sdslot {
    /// Parse and validate the container header.
    ///
    /// Returns [`Error::BadMagic`] or [`Error::UnsupportedVersion`] for a
    /// foreign file, and [`Error::InvalidRange`] if the stream is shorter than
    /// a full container.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let len = r.seek(SeekFrom::End(0))?;
        r.seek(SeekFrom::Start(0))?;
        magic(r, MAGIC)?;

        r.seek(SeekFrom::Start(VERSION_OFFSET))?;
        let version = u8(r)?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        if len < CONTAINER_LEN {
            return Err(Error::InvalidRange);
        }

        r.seek(SeekFrom::Start(BITMAP_OFFSET))?;
        let bitmap = bytesa::<SLOT_COUNT>(r)?;
        let active = bitmap.map(|b| b != 0);

        Ok(Self { version, active })
    }

    /// Whether slot `index` holds a record.
    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    /// Indices of all active slots, ascending.
    pub fn active_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| a.then_some(i))
    }
}

/// Streaming reader over a parsed [`Sdslot`] container.
pub struct SdslotReader<R> {
    inner: R,
    /// Parsed header.
    pub sdslot: Sdslot,
}

impl<R: Read + Seek> SdslotReader<R> {
    /// Parse a container and wrap the provided reader.
    pub fn new(mut reader: R) -> Result<Self> {
        let sdslot = Sdslot::parse(&mut reader)?;
        Ok(Self {
            inner: reader,
            sdslot,
        })
    }

    /// Open slot `index`'s window for streaming access.
    ///
    /// Inactive slots can still be read; their window is normally zero.
    pub fn read_slot(&mut self, index: usize) -> Result<Take<&mut R>> {
        let offset = window_offset(index)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(self.inner.by_ref().take(WINDOW_LEN))
    }

    /// Indices of all active slots, ascending.
    pub fn active_slots(&self) -> Vec<usize> {
        self.sdslot.active_slots().collect()
    }

    /// Consume the reader, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Builder for a fresh container.
///
/// The full extent is zero-filled up front; windows are filled by
/// [`SdslotWriter::add_slot`] and the bitmap is written by
/// [`SdslotWriter::finish`]. Dropping the writer without `finish` leaves
/// every slot marked inactive.
pub struct SdslotWriter<W> {
    inner: W,
    active: [bool; SLOT_COUNT],
}

impl<W: Write + Seek> SdslotWriter<W> {
    /// Write the header and zero-fill the container.
    pub fn new(mut inner: W) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        let mut w = SegmentWriter::new(&mut inner);
        w.field("magic", 0, MAGIC)?;
        w.zero_fill_to("header", VERSION_OFFSET)?;
        w.field("version", VERSION_OFFSET, &[VERSION])?;
        w.zero_fill_to("body", CONTAINER_LEN)?;
        Ok(Self {
            inner,
            active: [false; SLOT_COUNT],
        })
    }

    /// Embed the standalone record `standalone` into slot `index`.
    ///
    /// The slot is only marked active once the whole payload is written.
    pub fn add_slot<R: Read + Seek>(&mut self, index: usize, standalone: &mut R) -> Result<()> {
        let offset = window_offset(index)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        binslot::to_embedded(standalone, &mut self.inner)?;
        self.active[index] = true;
        debug!("embedded slot {index} at {offset:#x}");
        Ok(())
    }

    /// Write the active-slot bitmap and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        let bitmap = self.active.map(|a| a as u8);
        self.inner.seek(SeekFrom::Start(BITMAP_OFFSET))?;
        SegmentWriter::new(&mut self.inner).field("bitmap", BITMAP_OFFSET, &bitmap)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}
