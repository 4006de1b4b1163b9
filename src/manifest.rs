//! Cloud-sync manifest (`remotecache.vdf`).
//!
//! The PC client tracks every synced save file in a brace-delimited
//! key/value text file. A freshly converted directory needs a matching
//! manifest or the client treats the files as conflicting with the cloud
//! copy.
//!
//! ## Format
//! ```text
//! "1113000"
//! {
//! 	"data0001.bin"
//! 	{
//! 		"root"		"0"
//! 		"size"		"216381"
//! 		"localtime"		"1700000000"
//! 		"time"		"1700000000"
//! 		"remotetime"		"1700000000"
//! 		"sha"		"<40 hex digits>"
//! 		"syncstate"		"4"
//! 		"persiststate"		"0"
//! 		"platformstosync2"		"-1"
//! 	}
//! }
//! ```
//! Indentation is one tab per level; every line ends in `\n`.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use crate::Result;
use crate::convert::{discover, metadata_path};
use crate::hash::sha1_hash;

/// Top-level key: the game's application id.
pub const APP_ID: &str = "1113000";

const ROOT: u32 = 0;
const SYNC_STATE: u32 = 4;
const PERSIST_STATE: u32 = 0;
const PLATFORMS_TO_SYNC: i32 = -1;

/// One tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File name, without directory.
    pub name: String,
    pub size: u64,
    /// Last modification, whole seconds since the Unix epoch, rounded down.
    /// Negative before 1970.
    pub modified: i64,
    /// Lowercase hex SHA-1 of the contents.
    pub sha1: String,
}

impl ManifestEntry {
    /// Stat and hash the file at `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        let modified = unix_seconds(meta.modified()?);
        let sha1 = hex::encode(sha1_hash(&mut BufReader::new(File::open(path)?))?);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            size: meta.len(),
            modified,
            sha1,
        })
    }
}

/// Seconds since the Unix epoch, floored, for times on either side of it.
fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(e) => {
            let before = e.duration();
            let secs = before.as_secs() as i64;
            if before.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

struct VdfWriter<W> {
    inner: W,
    level: usize,
}

impl<W: Write> VdfWriter<W> {
    fn indent(&mut self) -> Result<()> {
        for _ in 0..self.level {
            self.inner.write_all(b"\t")?;
        }
        Ok(())
    }

    fn open(&mut self, key: &str) -> Result<()> {
        self.indent()?;
        writeln!(self.inner, "\"{key}\"")?;
        self.indent()?;
        writeln!(self.inner, "{{")?;
        self.level += 1;
        Ok(())
    }

    fn pair(&mut self, key: &str, value: impl Display) -> Result<()> {
        self.indent()?;
        writeln!(self.inner, "\"{key}\"\t\t\"{value}\"")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.level -= 1;
        self.indent()?;
        writeln!(self.inner, "}}")?;
        Ok(())
    }
}

/// Write a manifest listing `entries`, in order.
pub fn write_manifest<W: Write>(w: W, entries: &[ManifestEntry]) -> Result<()> {
    let mut vdf = VdfWriter { inner: w, level: 0 };
    vdf.open(APP_ID)?;
    for e in entries {
        vdf.open(&e.name)?;
        vdf.pair("root", ROOT)?;
        vdf.pair("size", e.size)?;
        vdf.pair("localtime", e.modified)?;
        vdf.pair("time", e.modified)?;
        vdf.pair("remotetime", e.modified)?;
        vdf.pair("sha", &e.sha1)?;
        vdf.pair("syncstate", SYNC_STATE)?;
        vdf.pair("persiststate", PERSIST_STATE)?;
        vdf.pair("platformstosync2", PLATFORMS_TO_SYNC)?;
        vdf.close()?;
    }
    vdf.close()?;
    vdf.inner.flush()?;
    Ok(())
}

/// Write a manifest at `path` covering every slot of the PC directory `dir`.
///
/// Each archive is listed followed by its `.binslot`; the system slot comes
/// first, then the data slots in order. A missing `.binslot` is an error.
pub fn write_manifest_for_dir(path: &Path, dir: &Path) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for slot in discover(dir) {
        entries.push(ManifestEntry::from_path(&slot.archive)?);
        entries.push(ManifestEntry::from_path(&metadata_path(&slot.archive))?);
    }

    write_manifest(BufWriter::new(File::create(path)?), &entries)?;
    info!("wrote {} with {} entries", path.display(), entries.len());
    Ok(entries)
}
