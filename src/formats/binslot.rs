//! BINSLOT - standalone per-slot metadata record (PC only).
//!
//! Every PC archive `X.bin` is accompanied by `X.binslot`, which the save
//! menu reads to render the slot without loading the archive. On the portable
//! release the same payload is embedded in one window of the consolidated
//! container, see [`crate::formats::sdslot`].
//!
//! ## Layout (0x374 bytes)
//! ```text
//! [0x000] Magic "SAVE0001"                        (8 bytes)
//! [0x008] SlotHash    - MD5 of [0x28..EOF] ++ "P4GOLDEN"  (16 bytes)
//! [0x018] ArchiveHash - MD5 of the whole X.bin   (16 bytes)
//! [0x028] DisplayName                             (0xC4 bytes)
//! [0x0EC] Description                             (0xC4 bytes)
//! [0x1B0] Trailer                                 (0x1C4 bytes)
//! ```
//!
//! The embedded form is the 0x34C-byte payload from 0x28 onward, without
//! magic or hashes.
//!
//! ## Language marker
//! The PC description carries a `\nLANG1` token right before the
//! `\nTimes ` line; the portable one does not. The token is stripped when
//! embedding and re-inserted before every `\nTimes ` when rebuilding a
//! standalone record.

use std::io::{Read, Seek, SeekFrom, Write};

use log::debug;

use crate::Result;
use crate::hash::md5_hash;
use crate::utils::{SegmentWriter, Stream, bytesa, bytesv, magic};

/// Magic at offset 0.
pub const MAGIC: &[u8; 8] = b"SAVE0001";
/// Offset of the slot hash.
pub const SLOT_HASH_OFFSET: u64 = 0x08;
/// Offset of the archive hash.
pub const ARCHIVE_HASH_OFFSET: u64 = 0x18;
/// Offset of the payload shared with the embedded form.
pub const PAYLOAD_OFFSET: u64 = 0x28;
/// Length of the display-name and description blocks.
pub const BLOCK_LEN: usize = 0xC4;
/// Length of the payload shared with the embedded form.
pub const PAYLOAD_LEN: usize = 0x34C;
/// Length of the trailer after the two text blocks.
pub const TRAILER_LEN: usize = PAYLOAD_LEN - 2 * BLOCK_LEN;
/// Total length of a standalone record.
pub const RECORD_LEN: u64 = PAYLOAD_OFFSET + PAYLOAD_LEN as u64;
/// Appended to the payload before computing the slot hash.
pub const SLOT_HASH_SUFFIX: &[u8] = b"P4GOLDEN";
/// Language token present only in the standalone description.
pub const LANGUAGE_MARKER: &[u8] = b"\nLANG1";

const DESCRIPTION_ANCHOR: &[u8] = b"\nTimes ";
const DESCRIPTION_OFFSET: u64 = PAYLOAD_OFFSET + BLOCK_LEN as u64;
const TRAILER_OFFSET: u64 = DESCRIPTION_OFFSET + BLOCK_LEN as u64;

/// Parsed standalone record.
#[derive(Debug, Clone)]
pub struct Binslot {
    /// MD5 over the payload and [`SLOT_HASH_SUFFIX`].
    pub slot_hash: [u8; 16],
    /// MD5 of the paired archive.
    pub archive_hash: [u8; 16],
    pub display_name: [u8; BLOCK_LEN],
    /// Description block, including the language marker.
    pub description: [u8; BLOCK_LEN],
    pub trailer: Vec<u8>,
}

impl Binslot {
    /// Parse a standalone record from `r`.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        r.seek(SeekFrom::Start(0))?;
        magic(r, MAGIC)?;
        let slot_hash = bytesa::<16>(r)?;
        let archive_hash = bytesa::<16>(r)?;
        let display_name = bytesa::<BLOCK_LEN>(r)?;
        let description = bytesa::<BLOCK_LEN>(r)?;
        let trailer = bytesv(r, TRAILER_LEN)?;
        Ok(Self {
            slot_hash,
            archive_hash,
            display_name,
            description,
            trailer,
        })
    }

    /// Whether [`Binslot::slot_hash`] matches the payload.
    pub fn verify_slot_hash(&self) -> Result<bool> {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.extend_from_slice(&self.display_name);
        payload.extend_from_slice(&self.description);
        payload.extend_from_slice(&self.trailer);
        let hash = md5_hash(&mut std::io::Cursor::new(payload), 0, SLOT_HASH_SUFFIX)?;
        Ok(hash == self.slot_hash)
    }
}

/// Remove the language marker from a description block.
///
/// Every `\nLANG1\nTimes ` becomes `\nTimes `; the result is zero-padded
/// back to [`BLOCK_LEN`].
pub fn strip_language_marker(block: &[u8]) -> [u8; BLOCK_LEN] {
    let mut out = Vec::with_capacity(block.len());
    let mut i = 0;
    while i < block.len() {
        let rest = &block[i..];
        if rest.starts_with(LANGUAGE_MARKER)
            && rest[LANGUAGE_MARKER.len()..].starts_with(DESCRIPTION_ANCHOR)
        {
            i += LANGUAGE_MARKER.len();
            continue;
        }
        out.push(block[i]);
        i += 1;
    }
    fit_block(&out)
}

/// Insert the language marker before every `\nTimes ` in a description block.
///
/// The block grows by the marker length per anchor and is then truncated back
/// to [`BLOCK_LEN`]. An anchor that already carries the marker gets a second
/// one, so [`strip_language_marker`] undoes exactly this insertion.
pub fn insert_language_marker(block: &[u8]) -> [u8; BLOCK_LEN] {
    let mut out = Vec::with_capacity(block.len() + LANGUAGE_MARKER.len());
    for (i, &b) in block.iter().enumerate() {
        if block[i..].starts_with(DESCRIPTION_ANCHOR) {
            out.extend_from_slice(LANGUAGE_MARKER);
        }
        out.push(b);
    }
    fit_block(&out)
}

fn fit_block(bytes: &[u8]) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    let n = bytes.len().min(BLOCK_LEN);
    block[..n].copy_from_slice(&bytes[..n]);
    block
}

/// Write the embedded payload of a standalone record to `out`.
///
/// Reads the display name, description and trailer from `standalone` and
/// writes exactly [`PAYLOAD_LEN`] bytes at the current position of `out`.
/// Magic and hashes are standalone-only and are not carried over.
pub fn to_embedded<R, W>(standalone: &mut R, out: &mut W) -> Result<()>
where
    R: Read + Seek,
    W: Write + Seek,
{
    standalone.seek(SeekFrom::Start(0))?;
    magic(standalone, MAGIC)?;
    standalone.seek(SeekFrom::Start(PAYLOAD_OFFSET))?;
    let display_name = bytesa::<BLOCK_LEN>(standalone)?;
    let description = strip_language_marker(&bytesa::<BLOCK_LEN>(standalone)?);
    let trailer = bytesv(standalone, TRAILER_LEN)?;

    let base = out.stream_position()?;
    let mut w = SegmentWriter::new(out);
    w.field("display name", base, &display_name)?;
    w.field("description", base + BLOCK_LEN as u64, &description)?;
    w.field("trailer", base + 2 * BLOCK_LEN as u64, &trailer)
}

/// Rebuild a standalone record from an embedded payload.
///
/// `embedded` is read from its current position (the start of a container
/// window). `archive` is the converted archive this record describes; its MD5
/// lands in the header. `out` should be empty and ends up exactly
/// [`RECORD_LEN`] bytes long.
pub fn to_standalone<E, A, W>(embedded: &mut E, archive: &mut A, out: &mut W) -> Result<()>
where
    E: Read,
    A: Read + Seek,
    W: Stream,
{
    let display_name = bytesa::<BLOCK_LEN>(embedded)?;
    let description = insert_language_marker(&bytesa::<BLOCK_LEN>(embedded)?);
    let trailer = bytesv(embedded, TRAILER_LEN)?;

    let archive_hash = md5_hash(archive, 0, &[])?;

    out.seek(SeekFrom::Start(0))?;
    let mut w = SegmentWriter::new(out);
    w.field("magic", 0, MAGIC)?;
    w.field("slot hash", SLOT_HASH_OFFSET, &[0u8; 16])?;
    w.field("archive hash", ARCHIVE_HASH_OFFSET, &archive_hash)?;
    w.field("display name", PAYLOAD_OFFSET, &display_name)?;
    w.field("description", DESCRIPTION_OFFSET, &description)?;
    w.field("trailer", TRAILER_OFFSET, &trailer)?;

    let slot_hash = md5_hash(out, PAYLOAD_OFFSET, SLOT_HASH_SUFFIX)?;
    debug!("slot hash {}", hex::encode(slot_hash));

    let mut w = SegmentWriter::new(out);
    w.seek_to(SLOT_HASH_OFFSET)?;
    w.field("slot hash", SLOT_HASH_OFFSET, &slot_hash)?;
    out.seek(SeekFrom::Start(RECORD_LEN))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::Error;

    fn description(text: &[u8]) -> [u8; BLOCK_LEN] {
        fit_block(text)
    }

    fn standalone_record() -> Vec<u8> {
        let mut buf = vec![0u8; RECORD_LEN as usize];
        buf[..8].copy_from_slice(MAGIC);
        buf[0x08..0x18].fill(0xAA);
        buf[0x18..0x28].fill(0xBB);
        buf[0x28..0x28 + 10].copy_from_slice(b"Slot title");
        let desc = description(b"Lv 42 Yasogami\nLANG1\nTimes 12:34");
        buf[0xEC..0xEC + BLOCK_LEN].copy_from_slice(&desc);
        for (i, b) in buf[0x1B0..].iter_mut().enumerate() {
            *b = i as u8;
        }
        buf
    }

    #[test]
    fn layout_constants() {
        assert_eq!(TRAILER_LEN, 0x1C4);
        assert_eq!(DESCRIPTION_OFFSET, 0xEC);
        assert_eq!(TRAILER_OFFSET, 0x1B0);
        assert_eq!(RECORD_LEN, 0x374);
    }

    #[test]
    fn marker_is_stripped_and_reinserted() {
        let tagged = description(b"Lv 42\nLANG1\nTimes 12:34");
        let plain = description(b"Lv 42\nTimes 12:34");
        assert_eq!(strip_language_marker(&tagged), plain);
        assert_eq!(insert_language_marker(&plain), tagged);
    }

    #[test]
    fn strip_after_insert_is_identity() {
        let mut near_limit = vec![b'y'; BLOCK_LEN - 2 * LANGUAGE_MARKER.len() - 16];
        near_limit.extend_from_slice(b"\nTimes 1\nTimes 2");
        let mut tagged_near_limit = vec![b'z'; BLOCK_LEN - 2 * LANGUAGE_MARKER.len() - 14];
        tagged_near_limit.extend_from_slice(b"\nLANG1\nTimes 9");

        for text in [
            &b"Lv 1\nTimes 00:01"[..],
            b"no timestamp at all",
            b"\nTimes first\nTimes second",
            b"",
            b"Lv 42\nLANG1\nTimes 12:34",
            b"\nLANG1\nTimes a\nTimes b\nLANG1\nTimes c",
            b"LANG1\nTimes without newline before token",
            b"\nTimes ",
            &near_limit,
            &tagged_near_limit,
        ] {
            let block = description(text);
            assert_eq!(
                strip_language_marker(&insert_language_marker(&block)),
                block,
                "{:?}",
                String::from_utf8_lossy(text)
            );
        }
    }

    #[test]
    fn insert_marks_every_anchor() {
        let tagged = description(b"Lv 42\nLANG1\nTimes 12:34");
        assert_eq!(
            insert_language_marker(&tagged),
            description(b"Lv 42\nLANG1\nLANG1\nTimes 12:34")
        );
        assert_eq!(
            insert_language_marker(&description(b"\nTimes a\nTimes b")),
            description(b"\nLANG1\nTimes a\nLANG1\nTimes b")
        );
    }

    #[test]
    fn insert_truncates_to_block() {
        let mut text = vec![b'x'; BLOCK_LEN - 10];
        text.extend_from_slice(b"\nTimes 1");
        let grown = insert_language_marker(&description(&text));
        assert_eq!(&grown[BLOCK_LEN - 10..BLOCK_LEN - 4], LANGUAGE_MARKER);
        assert_eq!(&grown[BLOCK_LEN - 4..], b"\nTim");
    }

    #[test]
    fn embedded_payload_drops_header_and_marker() {
        let record = standalone_record();
        let mut out = Cursor::new(Vec::new());
        to_embedded(&mut Cursor::new(&record), &mut out).unwrap();
        let payload = out.into_inner();

        assert_eq!(payload.len(), PAYLOAD_LEN);
        assert_eq!(&payload[..BLOCK_LEN], &record[0x28..0xEC]);
        assert_eq!(
            &payload[BLOCK_LEN..2 * BLOCK_LEN],
            &description(b"Lv 42 Yasogami\nTimes 12:34")
        );
        assert_eq!(&payload[2 * BLOCK_LEN..], &record[0x1B0..]);
    }

    #[test]
    fn embedding_requires_magic() {
        let mut record = standalone_record();
        record[0] = b'X';
        let mut out = Cursor::new(Vec::new());
        assert!(matches!(
            to_embedded(&mut Cursor::new(&record), &mut out),
            Err(Error::BadMagic)
        ));
    }

    #[test]
    fn standalone_rebuild_hashes() {
        let record = standalone_record();
        let mut payload = Cursor::new(Vec::new());
        to_embedded(&mut Cursor::new(&record), &mut payload).unwrap();

        let archive = vec![0x5Au8; 0x1000];
        let mut rebuilt = Cursor::new(Vec::new());
        payload.set_position(0);
        to_standalone(&mut payload, &mut Cursor::new(&archive), &mut rebuilt).unwrap();
        let rebuilt = rebuilt.into_inner();

        assert_eq!(rebuilt.len() as u64, RECORD_LEN);
        assert_eq!(&rebuilt[0x28..], &record[0x28..], "payload restored with marker");

        let parsed = Binslot::parse(&mut Cursor::new(&rebuilt)).unwrap();
        let expected = md5_hash(&mut Cursor::new(&archive), 0, &[]).unwrap();
        assert_eq!(parsed.archive_hash, expected);
        assert!(parsed.verify_slot_hash().unwrap());

        let mut suffixed = rebuilt[0x28..].to_vec();
        suffixed.extend_from_slice(b"P4GOLDEN");
        let direct = md5_hash(&mut Cursor::new(suffixed), 0, &[]).unwrap();
        assert_eq!(parsed.slot_hash, direct);
    }

    #[test]
    fn stale_hashes_fail_verification() {
        let parsed = Binslot::parse(&mut Cursor::new(standalone_record())).unwrap();
        assert!(!parsed.verify_slot_hash().unwrap());
    }
}
