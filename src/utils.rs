//! Low-level I/O primitives shared by all transcoders.
//!
//! Reads consume exactly the bytes they promise or return an error - there is
//! no partial-read ambiguity. Writes go through [`SegmentWriter`], which
//! checks every named field against the offset the layout assigns to it.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::{Error, Result};

/// A seekable byte stream that can be both read and written.
///
/// Implemented for anything that is `Read + Write + Seek`, so a
/// [`std::fs::File`] opened read/write and a [`std::io::Cursor<Vec<u8>>`]
/// are interchangeable wherever an output has to be re-read (checksum and
/// slot-hash passes).
pub trait Stream: Read + Write + Seek {}

impl<T: Read + Write + Seek> Stream for T {}

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

/// Read a little-endian `u32`.
#[inline]
pub(crate) fn le_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; len];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Verify that the next `N` bytes in the stream match `expected`.
///
/// Returns [`Error::BadMagic`] on mismatch.
#[inline]
pub(crate) fn magic<R: Read, const N: usize>(r: &mut R, expected: &[u8; N]) -> Result<()> {
    let got = bytesa::<N>(r)?;
    if &got != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Read `len` bytes at absolute `offset`.
pub(crate) fn bytes_at<R: Read + Seek>(r: &mut R, offset: u64, len: usize) -> Result<Vec<u8>> {
    r.seek(SeekFrom::Start(offset))?;
    bytesv(r, len)
}

/// Encode a run of `u32` words as little-endian bytes.
pub(crate) fn le_words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

const ZEROES: [u8; 0x1000] = [0u8; 0x1000];

/// Cursor over an output stream that writes named fields at fixed offsets.
///
/// Every write names the field and the offset the layout expects it at. If
/// the stream is anywhere else the write is refused with
/// [`Error::Misplaced`] instead of silently shifting the rest of the file.
pub(crate) struct SegmentWriter<'a, W> {
    inner: &'a mut W,
}

impl<'a, W: Write + Seek> SegmentWriter<'a, W> {
    pub(crate) fn new(inner: &'a mut W) -> Self {
        Self { inner }
    }

    /// Current absolute offset.
    pub(crate) fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Move the cursor to `offset`.
    pub(crate) fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn expect(&mut self, name: &'static str, offset: u64) -> Result<()> {
        if self.position()? != offset {
            return Err(Error::Misplaced(name));
        }
        Ok(())
    }

    /// Write `bytes` as field `name`, which must start at `offset`.
    pub(crate) fn field(&mut self, name: &'static str, offset: u64, bytes: &[u8]) -> Result<()> {
        self.expect(name, offset)?;
        self.inner.write_all(bytes)?;
        Ok(())
    }

    /// Write little-endian `u32` words as field `name`.
    pub(crate) fn words(&mut self, name: &'static str, offset: u64, words: &[u32]) -> Result<()> {
        self.field(name, offset, &le_words(words))
    }

    /// Copy exactly `len` bytes from `r` as field `name`.
    ///
    /// A source that runs dry first yields [`Error::UnexpectedEof`].
    pub(crate) fn copy<R: Read>(
        &mut self,
        name: &'static str,
        offset: u64,
        r: &mut R,
        len: u64,
    ) -> Result<()> {
        self.expect(name, offset)?;
        let copied = io::copy(&mut r.by_ref().take(len), &mut *self.inner)?;
        if copied != len {
            return Err(Error::UnexpectedEof);
        }
        Ok(())
    }

    /// Write zeroes from the current offset up to `end` (exclusive).
    ///
    /// Refuses to move backwards: a cursor already past `end` means a
    /// preceding segment overran its slot.
    pub(crate) fn zero_fill_to(&mut self, name: &'static str, end: u64) -> Result<()> {
        let mut pos = self.position()?;
        if pos > end {
            return Err(Error::Misplaced(name));
        }
        while pos < end {
            let n = (end - pos).min(ZEROES.len() as u64);
            self.inner.write_all(&ZEROES[..n as usize])?;
            pos += n;
        }
        Ok(())
    }
}
