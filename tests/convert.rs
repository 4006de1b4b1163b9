use std::fs;
use std::io::Cursor;
use std::path::Path;

use p4gsave::Error;
use p4gsave::convert::{Options, SDSLOT_PATH, pc_to_portable, portable_to_pc};
use p4gsave::formats::archive::{ArchiveInfo, Difficulty, Layout, DIFFICULTY_OFFSET};
use p4gsave::formats::binslot::{Binslot, RECORD_LEN};
use p4gsave::formats::sdslot::Sdslot;
use p4gsave::hash::md5_hash;
use p4gsave::manifest::write_manifest_for_dir;
use tempfile::TempDir;

fn pc_archive(seed: u8) -> Vec<u8> {
    let mut buf = vec![0u8; Layout::PC.archive_len() as usize];
    for (i, b) in buf[..0x15120].iter_mut().enumerate() {
        *b = seed.wrapping_add((i % 251) as u8);
    }
    buf[0x10..0x15].copy_from_slice(b"YU\0\0\0");
    let tail = Layout::PC.shared_tail_offset() as usize;
    buf[tail..tail + 0xC14].fill(seed ^ 0x5A);
    let footer = Layout::PC.footer_offset as usize;
    buf[footer..footer + 8].copy_from_slice(&[0x00, 0x20, 0, 0, 1, 0, 0, 0]);
    buf[footer + 9..].fill(0xFF);
    buf
}

fn binslot(title: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; RECORD_LEN as usize];
    buf[..8].copy_from_slice(b"SAVE0001");
    buf[0x28..0x28 + title.len()].copy_from_slice(title);
    let desc = b"Lv 50 Inaba\nLANG1\nTimes 99:59";
    buf[0xEC..0xEC + desc.len()].copy_from_slice(desc);
    buf[0x1B0..].fill(0x77);
    buf
}

fn pc_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let p = dir.path();
    fs::write(p.join("system.bin"), vec![0x42u8; 0x800]).unwrap();
    fs::write(p.join("system.binslot"), binslot(b"System")).unwrap();
    fs::write(p.join("data0001.bin"), pc_archive(1)).unwrap();
    fs::write(p.join("data0001.binslot"), binslot(b"Slot one")).unwrap();
    // No metadata: must be skipped.
    fs::write(p.join("data0002.bin"), pc_archive(2)).unwrap();
    fs::write(p.join("data0016.bin"), pc_archive(16)).unwrap();
    fs::write(p.join("data0016.binslot"), binslot(b"Slot sixteen")).unwrap();
    dir
}

fn sdslot(dir: &Path) -> Sdslot {
    let buf = fs::read(dir.join(SDSLOT_PATH)).unwrap();
    Sdslot::parse(&mut Cursor::new(buf)).unwrap()
}

#[test]
fn pc_directory_to_portable() {
    let input = pc_dir();
    let output = TempDir::new().unwrap();
    let report = pc_to_portable(input.path(), output.path(), &Options::default()).unwrap();

    assert_eq!(report.skipped, vec![2]);
    assert!(!output.path().join("data0002.bin").exists());
    assert_eq!(
        fs::read(output.path().join("system.bin")).unwrap(),
        vec![0x42u8; 0x800]
    );

    let data = fs::read(output.path().join("data0001.bin")).unwrap();
    assert_eq!(data.len(), 0x38000);
    let info = ArchiveInfo::parse(&mut Cursor::new(&data), &Layout::PORTABLE).unwrap();
    assert!(info.checksum_valid());

    let container = sdslot(output.path());
    assert_eq!(container.active_slots().collect::<Vec<_>>(), vec![0, 1, 16]);
    assert_eq!(
        fs::metadata(output.path().join(SDSLOT_PATH)).unwrap().len(),
        0x40400
    );
}

#[test]
fn round_trip_rebuilds_metadata() {
    let input = pc_dir();
    let portable = TempDir::new().unwrap();
    let pc = TempDir::new().unwrap();
    pc_to_portable(input.path(), portable.path(), &Options::default()).unwrap();
    let report = portable_to_pc(portable.path(), pc.path(), &Options::default()).unwrap();
    assert!(report.skipped.is_empty());

    for name in ["system", "data0001", "data0016"] {
        let archive = fs::read(pc.path().join(format!("{name}.bin"))).unwrap();
        let rebuilt = fs::read(pc.path().join(format!("{name}.binslot"))).unwrap();
        let original = fs::read(input.path().join(format!("{name}.binslot"))).unwrap();

        assert_eq!(rebuilt.len() as u64, RECORD_LEN);
        assert_eq!(&rebuilt[0x28..], &original[0x28..], "{name} payload");

        let parsed = Binslot::parse(&mut Cursor::new(&rebuilt)).unwrap();
        let archive_md5 = md5_hash(&mut Cursor::new(&archive), 0, &[]).unwrap();
        assert_eq!(parsed.archive_hash, archive_md5, "{name} archive hash");
        assert!(parsed.verify_slot_hash().unwrap());
    }

    let original = pc_archive(1);
    let back = fs::read(pc.path().join("data0001.bin")).unwrap();
    assert_eq!(back.len(), original.len());
    assert_eq!(&back[..0x15120], &original[..0x15120]);
    let info = ArchiveInfo::parse(&mut Cursor::new(&back), &Layout::PC).unwrap();
    assert_eq!(&info.name_primary[..5], b"YU\0\0\0");
    assert!(info.checksum_valid());
}

#[test]
fn difficulty_override_applies_to_data_slots() {
    let input = pc_dir();
    let output = TempDir::new().unwrap();
    let options = Options {
        difficulty: Some(Difficulty::Enable),
    };
    pc_to_portable(input.path(), output.path(), &options).unwrap();

    let data = fs::read(output.path().join("data0001.bin")).unwrap();
    assert_eq!(data[DIFFICULTY_OFFSET as usize] & 0x03, 0x03);
    // system.bin is copied, never patched.
    assert_eq!(
        fs::read(output.path().join("system.bin")).unwrap(),
        vec![0x42u8; 0x800]
    );
}

#[test]
fn portable_input_is_refused_for_pc_to_portable() {
    let input = pc_dir();
    fs::create_dir_all(input.path().join("sce_sys")).unwrap();
    fs::write(input.path().join(SDSLOT_PATH), b"SDSL").unwrap();
    let output = TempDir::new().unwrap();

    let err = pc_to_portable(input.path(), output.path(), &Options::default()).unwrap_err();
    assert!(matches!(err, Error::AlreadyConverted(_)));
    assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
}

#[test]
fn pc_input_is_refused_for_portable_to_pc() {
    let input = pc_dir();
    let portable = TempDir::new().unwrap();
    pc_to_portable(input.path(), portable.path(), &Options::default()).unwrap();
    fs::write(portable.path().join("data0001.binslot"), binslot(b"x")).unwrap();
    let output = TempDir::new().unwrap();

    let err = portable_to_pc(portable.path(), output.path(), &Options::default()).unwrap_err();
    assert!(matches!(err, Error::AlreadyConverted(_)));
}

#[test]
fn missing_container_is_fatal() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let err = portable_to_pc(input.path(), output.path(), &Options::default()).unwrap_err();
    assert!(matches!(err, Error::MissingInput(_)));
}

#[test]
fn active_slot_without_archive_is_skipped() {
    let input = pc_dir();
    let portable = TempDir::new().unwrap();
    pc_to_portable(input.path(), portable.path(), &Options::default()).unwrap();
    fs::remove_file(portable.path().join("data0016.bin")).unwrap();
    let output = TempDir::new().unwrap();

    let report = portable_to_pc(portable.path(), output.path(), &Options::default()).unwrap();
    assert_eq!(report.skipped, vec![16]);
    assert!(!output.path().join("data0016.binslot").exists());
    assert!(output.path().join("data0001.binslot").exists());
}

#[test]
fn manifest_covers_converted_directory() {
    let input = pc_dir();
    let portable = TempDir::new().unwrap();
    let pc = TempDir::new().unwrap();
    pc_to_portable(input.path(), portable.path(), &Options::default()).unwrap();
    portable_to_pc(portable.path(), pc.path(), &Options::default()).unwrap();

    let vdf = pc.path().join("remotecache.vdf");
    let entries = write_manifest_for_dir(&vdf, pc.path()).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "system.bin",
            "system.binslot",
            "data0001.bin",
            "data0001.binslot",
            "data0016.bin",
            "data0016.binslot"
        ]
    );
    assert_eq!(entries[2].size, Layout::PC.archive_len());

    let text = fs::read_to_string(&vdf).unwrap();
    assert!(text.starts_with("\"1113000\"\n{\n\t\"system.bin\"\n"));
    assert!(text.ends_with("\t}\n}\n"));
    assert_eq!(text.matches("\"syncstate\"\t\t\"4\"").count(), 6);
}

#[test]
fn manifest_requires_metadata() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("data0001.bin"), [0u8; 16]).unwrap();
    let vdf = dir.path().join("remotecache.vdf");
    assert!(write_manifest_for_dir(&vdf, dir.path()).is_err());
}

#[test]
fn pc_archive_in_portable_directory_is_fatal() {
    let input = pc_dir();
    let portable = TempDir::new().unwrap();
    pc_to_portable(input.path(), portable.path(), &Options::default()).unwrap();
    fs::write(portable.path().join("data0001.bin"), pc_archive(1)).unwrap();
    let output = TempDir::new().unwrap();

    let err = portable_to_pc(portable.path(), output.path(), &Options::default()).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}
