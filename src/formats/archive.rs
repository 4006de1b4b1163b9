//! Save archive (`system.bin` / `dataNNNN.bin`) - PC and portable layouts.
//!
//! Both platforms share everything up to the rescue-request segment and a
//! block of trailing segments; they differ in segment sizes, in where the
//! shared block lands, and in an extra name segment that exists only on PC.
//!
//! ## Layout
//! ```text
//!                                    PC          portable
//! [0x00000] Common prefix            verbatim    verbatim
//!   [0x00010] NamePrimary  (0x24, game encoding)
//!   [0x00064] NameSecondary (0x24, Shift-JIS)
//!   [0x01304] Difficulty toggle byte (bits 0x03)
//! [0x15120] Rescue-request segment
//!   [+0x00]  Kind 0x0F, Length    (2 × u32 LE)     0x3FA4      0x2900
//!   [+0x08]  Default message      (2 × u32 LE)
//!   [+0x10]  NamePrimary          (0x24)
//!   [+0x34]  Gap                                   0x24 zero   -
//!   [....]   Activity byte (1)
//!   [....]   Request data (zeroed)
//! [tail]    Shared segments        (0xC14)         0x190CC     0x17A28
//! [....]    PC name segment        (0x30)          present     -
//!   [+0x00]  0x13, 0x28, 1        (3 × u32 LE)
//!   [+0x0C]  NameSecondary        (0x24)
//! [....]    Retry-save headers
//!   0x10000001, 4, 0              (3 × u32 LE)
//!   0x10000002, 4, 0              (3 × u32 LE)
//!   0x10000003, SaveSize          (2 × u32 LE)     0x1B000     0x19000
//! [footer]  0x2000, 1 (2 × u32 LE), Checksum (u8), 0xFFFFFFFF (u32 LE)
//!                                                  0x34D30     0x3165C
//! [....]    Zero pad to total size                 -           0x38000
//! ```
//!
//! ## Checksum
//! The footer checksum is the sum, modulo 256, of every byte from 0x38 up to
//! the footer. It is always recomputed from the written output.
//!
//! ## Notes
//! * The input must carry the footer of its own layout; anything else is
//!   refused before `out` is touched.
//! * The request data carried by the rescue-request segment is not
//!   transferred; the converted segment is zero past the activity byte.
//! * Retry-save payloads are dropped; only their headers are rewritten.
//! * PC output ends right after the footer. Portable output is zero-padded to
//!   exactly 0x38000 bytes. A failed conversion leaves whatever was written
//!   so far in `out`.

use std::io::{Read, Seek, SeekFrom, Write};
use std::str::FromStr;

use log::debug;

use crate::hash::byte_sum_checksum;
use crate::utils::{SegmentWriter, Stream, bytes_at, bytesa, le_u32, u8};
use crate::{Error, Result};

/// Length of each name field.
pub const NAME_LEN: usize = 0x24;
/// Offset of the game-encoded player name.
pub const NAME_PRIMARY_OFFSET: u64 = 0x10;
/// Offset of the Shift-JIS player name.
pub const NAME_SECONDARY_OFFSET: u64 = 0x64;
/// Offset of the difficulty toggle byte.
pub const DIFFICULTY_OFFSET: u64 = 0x1304;
/// Bits of the difficulty byte that unlock the custom difficulty menu.
pub const DIFFICULTY_MASK: u8 = 0x03;
/// End of the platform-invariant prefix.
pub const COMMON_PREFIX_END: u64 = 0x15120;
/// First byte covered by the footer checksum.
pub const CHECKSUM_START: u64 = 0x38;
/// Length of the segment block shared verbatim by both layouts.
pub const SHARED_TAIL_LEN: u64 = 0xC14;
/// Length of the footer.
pub const FOOTER_LEN: u64 = 13;

const RESCUE_KIND: u32 = 0x0F;
const RESCUE_HEADER_LEN: u64 = 8;
const DEFAULT_MESSAGE: [u32; 2] = [0x4D16_009B, 0x4D0F_004D];
const RESCUE_ACTIVE: u8 = 1;
const PC_NAME_SEGMENT: [u32; 3] = [0x13, 0x28, 1];
const FOOTER_MARKER: [u32; 2] = [0x2000, 1];
const FOOTER_SENTINEL: u32 = 0xFFFF_FFFF;

/// Save platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Desktop release; metadata lives in standalone `.binslot` files.
    Pc,
    /// Handheld release; metadata lives in `sce_sys/sdslot.dat`.
    Portable,
}

impl Platform {
    /// The archive layout for this platform.
    pub fn layout(self) -> &'static Layout {
        match self {
            Platform::Pc => &Layout::PC,
            Platform::Portable => &Layout::PORTABLE,
        }
    }
}

/// Per-platform segment sizes and offsets.
#[derive(Debug, PartialEq, Eq)]
pub struct Layout {
    pub platform: Platform,
    /// Length field of the rescue-request segment header.
    pub rescue_len: u32,
    /// Zero gap between the rescue name and the activity byte.
    pub rescue_name_gap: u64,
    /// Whether the PC name segment follows the shared tail.
    pub name_segment: bool,
    /// Save size recorded in the third retry-save header.
    pub retry_save_size: u32,
    /// Absolute offset of the footer.
    pub footer_offset: u64,
    /// Fixed total size the output is padded to, if any.
    pub total_size: Option<u64>,
}

impl Layout {
    pub const PC: Layout = Layout {
        platform: Platform::Pc,
        rescue_len: 0x3FA4,
        rescue_name_gap: NAME_LEN as u64,
        name_segment: true,
        retry_save_size: 0x1B000,
        footer_offset: 0x34D30,
        total_size: None,
    };

    pub const PORTABLE: Layout = Layout {
        platform: Platform::Portable,
        rescue_len: 0x2900,
        rescue_name_gap: 0,
        name_segment: false,
        retry_save_size: 0x19000,
        footer_offset: 0x3165C,
        total_size: Some(0x38000),
    };

    /// Offset of the shared tail block, directly after the rescue segment.
    pub fn shared_tail_offset(&self) -> u64 {
        COMMON_PREFIX_END + RESCUE_HEADER_LEN + self.rescue_len as u64
    }

    /// Length of a complete archive in this layout.
    pub fn archive_len(&self) -> u64 {
        self.total_size.unwrap_or(self.footer_offset + FOOTER_LEN)
    }

    /// Guess the layout of an archive from its length.
    pub fn detect(len: u64) -> Option<&'static Layout> {
        [&Layout::PC, &Layout::PORTABLE]
            .into_iter()
            .find(|l| l.archive_len() == len)
    }
}

/// Requested change to the custom-difficulty unlock bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    /// Set both bits.
    Enable,
    /// Clear both bits.
    Disable,
}

impl Difficulty {
    /// Apply the override to a difficulty byte.
    pub fn apply(self, byte: u8) -> u8 {
        match self {
            Difficulty::Enable => byte | DIFFICULTY_MASK,
            Difficulty::Disable => byte & !DIFFICULTY_MASK,
        }
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "enable" => Ok(Difficulty::Enable),
            "disable" => Ok(Difficulty::Disable),
            _ => Err(Error::Parse("difficulty override must be 'enable' or 'disable'")),
        }
    }
}

/// Convert a PC archive to the portable layout.
pub fn to_portable<R, W>(pc: &mut R, out: &mut W, difficulty: Option<Difficulty>) -> Result<()>
where
    R: Read + Seek,
    W: Stream,
{
    transcode(pc, &Layout::PC, out, &Layout::PORTABLE, difficulty)
}

/// Convert a portable archive to the PC layout.
pub fn to_pc<R, W>(portable: &mut R, out: &mut W, difficulty: Option<Difficulty>) -> Result<()>
where
    R: Read + Seek,
    W: Stream,
{
    transcode(portable, &Layout::PORTABLE, out, &Layout::PC, difficulty)
}

/// Rewrite `input` (in layout `src`) into `out` (in layout `dst`).
///
/// `out` should be empty; it is written from offset 0. Nothing is written if
/// `input` has no `src` footer, see [`read_footer`].
pub fn transcode<R, W>(
    input: &mut R,
    src: &Layout,
    out: &mut W,
    dst: &Layout,
    difficulty: Option<Difficulty>,
) -> Result<()>
where
    R: Read + Seek,
    W: Stream,
{
    read_footer(input, src)?;
    let name_primary = bytes_at(input, NAME_PRIMARY_OFFSET, NAME_LEN)?;
    let name_secondary = if dst.name_segment {
        Some(bytes_at(input, NAME_SECONDARY_OFFSET, NAME_LEN)?)
    } else {
        None
    };

    input.seek(SeekFrom::Start(0))?;
    out.seek(SeekFrom::Start(0))?;
    let mut w = SegmentWriter::new(out);

    // Common prefix, optionally patching the difficulty byte on the way.
    if let Some(d) = difficulty {
        w.copy("prefix", 0, input, DIFFICULTY_OFFSET)?;
        let byte = u8(input)?;
        w.field("difficulty", DIFFICULTY_OFFSET, &[d.apply(byte)])?;
    }
    let copied = w.position()?;
    w.copy("prefix", copied, input, COMMON_PREFIX_END - copied)?;

    // Rescue-request segment.
    let rescue = COMMON_PREFIX_END;
    w.words("rescue header", rescue, &[RESCUE_KIND, dst.rescue_len])?;
    w.words("rescue message", rescue + 0x08, &DEFAULT_MESSAGE)?;
    w.field("rescue name", rescue + 0x10, &name_primary)?;
    let activity = rescue + 0x10 + NAME_LEN as u64 + dst.rescue_name_gap;
    w.zero_fill_to("rescue gap", activity)?;
    w.field("rescue activity", activity, &[RESCUE_ACTIVE])?;
    w.zero_fill_to("request data", dst.shared_tail_offset())?;

    // Shared tail.
    input.seek(SeekFrom::Start(src.shared_tail_offset()))?;
    w.copy(
        "shared tail",
        dst.shared_tail_offset(),
        input,
        SHARED_TAIL_LEN,
    )?;

    let mut cursor = dst.shared_tail_offset() + SHARED_TAIL_LEN;
    if let Some(name) = &name_secondary {
        w.words("name segment header", cursor, &PC_NAME_SEGMENT)?;
        w.field("name segment", cursor + 0x0C, name)?;
        cursor += 0x0C + NAME_LEN as u64;
    }

    // Retry-save headers; payload size placeholder is zero.
    w.words("retry save 1", cursor, &[0x1000_0001, 0x04, 0])?;
    w.words("retry save 2", cursor + 0x0C, &[0x1000_0002, 0x04, 0])?;
    w.words(
        "retry save 3",
        cursor + 0x18,
        &[0x1000_0003, dst.retry_save_size],
    )?;
    let end = w.position()?;

    // Second pass: sum what was just written.
    w.seek_to(CHECKSUM_START)?;
    drop(w);
    let checksum = byte_sum_checksum(out, end - CHECKSUM_START)?;
    debug!("{:?} archive checksum {checksum:#04x}", dst.platform);

    let mut w = SegmentWriter::new(out);
    w.zero_fill_to("footer gap", dst.footer_offset)?;
    write_footer(&mut w, dst.footer_offset, checksum)?;
    if let Some(total) = dst.total_size {
        w.zero_fill_to("padding", total)?;
    }
    Ok(())
}

/// Read the footer `layout` places in `r` and return its stored checksum.
///
/// Returns [`Error::Parse`] if the footer marker or sentinel is missing,
/// which means `r` is not an archive in `layout`.
pub fn read_footer<R: Read + Seek>(r: &mut R, layout: &Layout) -> Result<u8> {
    r.seek(SeekFrom::Start(layout.footer_offset))?;
    let marker = [le_u32(r)?, le_u32(r)?];
    let checksum = u8(r)?;
    let sentinel = le_u32(r)?;
    if marker != FOOTER_MARKER || sentinel != FOOTER_SENTINEL {
        return Err(Error::Parse(match layout.platform {
            Platform::Pc => "no PC archive footer",
            Platform::Portable => "no portable archive footer",
        }));
    }
    Ok(checksum)
}

fn write_footer<W: Write + Seek>(
    w: &mut SegmentWriter<'_, W>,
    offset: u64,
    checksum: u8,
) -> Result<()> {
    w.words("footer marker", offset, &FOOTER_MARKER)?;
    w.field("checksum", offset + 8, &[checksum])?;
    w.field("footer sentinel", offset + 9, &FOOTER_SENTINEL.to_le_bytes())
}

/// Summary of an existing archive, for inspection.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    /// Game-encoded player name.
    pub name_primary: [u8; NAME_LEN],
    /// Shift-JIS player name from the common prefix.
    pub name_secondary: [u8; NAME_LEN],
    /// Raw difficulty toggle byte.
    pub difficulty: u8,
    /// Checksum stored in the footer.
    pub stored_checksum: u8,
    /// Checksum recomputed over `[0x38, footer)`.
    pub computed_checksum: u8,
}

impl ArchiveInfo {
    /// Read the named fields and footer of an archive in `layout`.
    ///
    /// Fails like [`read_footer`] if the footer is not where `layout` puts it.
    pub fn parse<R: Read + Seek>(r: &mut R, layout: &Layout) -> Result<Self> {
        let stored_checksum = read_footer(r, layout)?;
        r.seek(SeekFrom::Start(NAME_PRIMARY_OFFSET))?;
        let name_primary = bytesa::<NAME_LEN>(r)?;
        r.seek(SeekFrom::Start(NAME_SECONDARY_OFFSET))?;
        let name_secondary = bytesa::<NAME_LEN>(r)?;
        r.seek(SeekFrom::Start(DIFFICULTY_OFFSET))?;
        let difficulty = u8(r)?;

        r.seek(SeekFrom::Start(CHECKSUM_START))?;
        let computed_checksum = byte_sum_checksum(r, layout.footer_offset - CHECKSUM_START)?;

        Ok(Self {
            name_primary,
            name_secondary,
            difficulty,
            stored_checksum,
            computed_checksum,
        })
    }

    /// Whether the stored footer checksum matches the archive contents.
    pub fn checksum_valid(&self) -> bool {
        self.stored_checksum == self.computed_checksum
    }
}
