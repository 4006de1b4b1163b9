//! Whole save-directory conversion.
//!
//! A save directory holds up to seventeen slots under fixed names:
//!
//! | Slot | Archive | PC metadata |
//! |------|---------|-------------|
//! | 0    | `system.bin`   | `system.binslot`   |
//! | 1-16 | `dataNNNN.bin` | `dataNNNN.binslot` |
//!
//! On the portable release the per-slot metadata lives in
//! `sce_sys/sdslot.dat` instead. [`pc_to_portable`] and [`portable_to_pc`]
//! convert a whole directory into a separate output directory.
//!
//! A slot whose companion file is missing is logged and skipped; every
//! other failure aborts the run. Outputs are written in place, so an aborted
//! run can leave a partially written file behind.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::formats::archive::{self, Difficulty, Platform};
use crate::formats::binslot;
use crate::formats::sdslot::{SLOT_COUNT, SdslotReader, SdslotWriter};
use crate::{Error, Result};

/// Index of the system slot.
pub const SYSTEM_SLOT: usize = 0;
/// Location of the portable metadata container, relative to a save directory.
pub const SDSLOT_PATH: &str = "sce_sys/sdslot.dat";

/// File name of slot `index`'s archive.
///
/// `index` must be below [`SLOT_COUNT`].
pub fn slot_archive_name(index: usize) -> String {
    if index == SYSTEM_SLOT {
        "system.bin".to_owned()
    } else {
        format!("data{index:04}.bin")
    }
}

/// Path of the standalone metadata record that accompanies `archive`.
pub fn metadata_path(archive: &Path) -> PathBuf {
    let mut s = OsString::from(archive.as_os_str());
    s.push("slot");
    PathBuf::from(s)
}

/// Files found for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFiles {
    pub index: usize,
    pub archive: PathBuf,
    /// The `.binslot`, if present.
    pub metadata: Option<PathBuf>,
}

/// List the slots of `dir` that have an archive, in slot order.
pub fn discover(dir: &Path) -> Vec<SlotFiles> {
    (0..SLOT_COUNT)
        .filter_map(|index| {
            let archive = dir.join(slot_archive_name(index));
            if !archive.is_file() {
                return None;
            }
            let metadata = metadata_path(&archive);
            Some(SlotFiles {
                index,
                archive,
                metadata: metadata.is_file().then_some(metadata),
            })
        })
        .collect()
}

/// Conversion options supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Override for the custom-difficulty bits in every data archive.
    pub difficulty: Option<Difficulty>,
}

/// Outcome of a directory conversion.
#[derive(Debug, Default)]
pub struct Report {
    /// Every file written, in write order.
    pub written: Vec<PathBuf>,
    /// Slots skipped for lack of a companion file.
    pub skipped: Vec<usize>,
}

impl Report {
    /// Record the outcome of one slot.
    ///
    /// A written path is appended to [`Report::written`]. An error for which
    /// [`Error::is_skip`] holds is logged and the slot is listed in
    /// [`Report::skipped`]; any other error is returned.
    fn record(&mut self, index: usize, outcome: Result<PathBuf>) -> Result<()> {
        match outcome {
            Ok(path) => self.written.push(path),
            Err(err) if err.is_skip() => {
                warn!("slot {index}: {err}, skipping");
                self.skipped.push(index);
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

fn create_output(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

fn convert_archive(
    input: &Path,
    output: &Path,
    target: Platform,
    difficulty: Option<Difficulty>,
) -> Result<()> {
    let mut src = BufReader::new(File::open(input)?);
    let mut dst = create_output(output)?;
    match target {
        Platform::Portable => archive::to_portable(&mut src, &mut dst, difficulty),
        Platform::Pc => archive::to_pc(&mut src, &mut dst, difficulty),
    }
}

/// Convert one slot's archive to `target`, writing it into `output`.
///
/// `system.bin` has the same layout on both platforms and is copied as is.
/// With `require_metadata`, a slot without a `.binslot` fails with
/// [`Error::MissingInput`].
fn convert_slot(
    slot: &SlotFiles,
    output: &Path,
    target: Platform,
    options: &Options,
    require_metadata: bool,
) -> Result<PathBuf> {
    if require_metadata && slot.metadata.is_none() {
        return Err(Error::MissingInput(metadata_path(&slot.archive)));
    }

    let out = output.join(slot_archive_name(slot.index));
    if slot.index == SYSTEM_SLOT {
        fs::copy(&slot.archive, &out)?;
        info!("copied {}", slot.archive.display());
    } else {
        convert_archive(&slot.archive, &out, target, options.difficulty)?;
        info!("converted {}", slot.archive.display());
    }
    Ok(out)
}

/// Rebuild the `.binslot` of container slot `index` next to its converted
/// archive in `output`.
fn rebuild_metadata<R: Read + Seek>(
    sdslot: &mut SdslotReader<R>,
    index: usize,
    output: &Path,
) -> Result<PathBuf> {
    let archive_path = output.join(slot_archive_name(index));
    if !archive_path.is_file() {
        return Err(Error::MissingInput(archive_path));
    }

    let target = metadata_path(&archive_path);
    let mut archive = BufReader::new(File::open(&archive_path)?);
    let mut out = create_output(&target)?;
    binslot::to_standalone(&mut sdslot.read_slot(index)?, &mut archive, &mut out)?;
    info!("generated {}", target.display());
    Ok(target)
}

/// Convert a PC save directory into the portable layout.
///
/// Only slots with both an archive and a `.binslot` are converted; the
/// metadata of those slots is merged into `output/sce_sys/sdslot.dat`.
///
/// Returns [`Error::AlreadyConverted`] before writing anything if `input`
/// already holds a portable container.
pub fn pc_to_portable(input: &Path, output: &Path, options: &Options) -> Result<Report> {
    let existing = input.join(SDSLOT_PATH);
    if existing.is_file() {
        return Err(Error::AlreadyConverted(existing));
    }

    let slots = discover(input);
    let mut report = Report::default();
    for slot in &slots {
        let outcome = convert_slot(slot, output, Platform::Portable, options, true);
        report.record(slot.index, outcome)?;
    }

    let sdslot_path = output.join(SDSLOT_PATH);
    if let Some(parent) = sdslot_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut sdslot = SdslotWriter::new(BufWriter::new(create_output(&sdslot_path)?))?;
    for slot in &slots {
        if let Some(metadata) = &slot.metadata {
            let mut record = BufReader::new(File::open(metadata)?);
            sdslot.add_slot(slot.index, &mut record)?;
            info!("merged {}", metadata.display());
        }
    }
    sdslot.finish()?;
    report.written.push(sdslot_path);

    Ok(report)
}

/// Convert a portable save directory into the PC layout.
///
/// Every archive is converted; a `.binslot` is rebuilt for each active
/// container slot whose converted archive exists.
///
/// Returns [`Error::MissingInput`] if `input` has no container and
/// [`Error::AlreadyConverted`] if it already holds PC metadata records.
pub fn portable_to_pc(input: &Path, output: &Path, options: &Options) -> Result<Report> {
    let sdslot_path = input.join(SDSLOT_PATH);
    if !sdslot_path.is_file() {
        return Err(Error::MissingInput(sdslot_path));
    }
    for index in 1..SLOT_COUNT {
        let existing = metadata_path(&input.join(slot_archive_name(index)));
        if existing.is_file() {
            return Err(Error::AlreadyConverted(existing));
        }
    }

    let slots = discover(input);
    let mut report = Report::default();
    for slot in &slots {
        let outcome = convert_slot(slot, output, Platform::Pc, options, false);
        report.record(slot.index, outcome)?;
    }

    let mut sdslot = SdslotReader::new(BufReader::new(File::open(&sdslot_path)?))?;
    for index in sdslot.active_slots() {
        let outcome = rebuild_metadata(&mut sdslot, index, output);
        report.record(index, outcome)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names() {
        assert_eq!(slot_archive_name(0), "system.bin");
        assert_eq!(slot_archive_name(1), "data0001.bin");
        assert_eq!(slot_archive_name(16), "data0016.bin");
    }

    #[test]
    fn report_skips_only_missing_input() {
        let mut report = Report::default();
        report.record(1, Ok(PathBuf::from("data0001.bin"))).unwrap();
        report
            .record(2, Err(Error::MissingInput(PathBuf::from("data0002.binslot"))))
            .unwrap();
        assert!(matches!(
            report.record(3, Err(Error::BadMagic)),
            Err(Error::BadMagic)
        ));

        assert_eq!(report.written, vec![PathBuf::from("data0001.bin")]);
        assert_eq!(report.skipped, vec![2]);
    }

    #[test]
    fn metadata_sits_next_to_archive() {
        assert_eq!(
            metadata_path(Path::new("saves/data0003.bin")),
            PathBuf::from("saves/data0003.binslot")
        );
    }
}
