//! Streaming content hashes and the archive byte-sum checksum.
//!
//! Two hashes appear in the save formats:
//!
//! * **MD5** - the `.binslot` header records the MD5 of its archive, and a
//!   second MD5 over its own payload with [`crate::formats::binslot::SLOT_HASH_SUFFIX`]
//!   appended.
//! * **SHA-1** - the cloud-sync manifest lists the SHA-1 of every tracked
//!   file.
//!
//! Both are computed by [`digest_with_suffix`], which is generic over any
//! RustCrypto [`Digest`]. The archive checksum is a plain additive byte sum,
//! see [`byte_sum_checksum`].

use std::io::{self, Read, Seek, SeekFrom};

use digest::{Digest, Output};
use md5::Md5;
use sha1::Sha1;

use crate::Result;

/// Read granularity for the streaming hash and checksum passes.
pub const CHUNK_LEN: usize = 0x400;

/// Hash algorithms selectable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// 128-bit MD5.
    Md5,
    /// 160-bit SHA-1.
    Sha1,
}

/// Hash `stream` from `start` to end of stream.
///
/// The stream is left positioned at offset 0.
pub fn digest<D: Digest, S: Read + Seek>(stream: &mut S, start: u64) -> Result<Output<D>> {
    digest_with_suffix::<D, S>(stream, start, &[])
}

/// Hash `stream` from `start` to end of stream, then `suffix`.
///
/// The stream is left positioned at offset 0.
pub fn digest_with_suffix<D: Digest, S: Read + Seek>(
    stream: &mut S,
    start: u64,
    suffix: &[u8],
) -> Result<Output<D>> {
    let mut hasher = D::new();
    stream.seek(SeekFrom::Start(start))?;

    let mut buf = [0u8; CHUNK_LEN];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }
    hasher.update(suffix);

    stream.seek(SeekFrom::Start(0))?;
    Ok(hasher.finalize())
}

/// MD5 of `stream` from `start`, with `suffix` appended.
pub fn md5_hash<S: Read + Seek>(stream: &mut S, start: u64, suffix: &[u8]) -> Result<[u8; 16]> {
    let d = digest_with_suffix::<Md5, S>(stream, start, suffix)?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&d);
    Ok(out)
}

/// SHA-1 of the whole of `stream`.
pub fn sha1_hash<S: Read + Seek>(stream: &mut S) -> Result<[u8; 20]> {
    let d = digest::<Sha1, S>(stream, 0)?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&d);
    Ok(out)
}

/// Lowercase hex digest of `stream` from `start` using `algorithm`.
pub fn digest_hex<S: Read + Seek>(
    stream: &mut S,
    algorithm: HashAlgorithm,
    start: u64,
) -> Result<String> {
    Ok(match algorithm {
        HashAlgorithm::Md5 => hex::encode(digest::<Md5, S>(stream, start)?),
        HashAlgorithm::Sha1 => hex::encode(digest::<Sha1, S>(stream, start)?),
    })
}

/// Sum of the next `length` bytes of `stream`, modulo 256.
///
/// Returns [`crate::Error::UnexpectedEof`] if the stream holds fewer bytes.
pub fn byte_sum_checksum<R: Read>(stream: &mut R, length: u64) -> Result<u8> {
    let mut buf = [0u8; CHUNK_LEN];
    let mut remaining = length;
    let mut sum = 0u8;
    while remaining > 0 {
        let n = remaining.min(CHUNK_LEN as u64) as usize;
        stream.read_exact(&mut buf[..n])?;
        sum = buf[..n].iter().fold(sum, |acc, &b| acc.wrapping_add(b));
        remaining -= n as u64;
    }
    Ok(sum)
}
