// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::{Cursor, Write};
use std::sync::Mutex;

use byteorder::{LittleEndian, WriteBytesExt};
use log::{Level, LevelFilter, Log, Metadata, Record};
use zipsig_common::ZipSigError;
use zipsig_zip::{CentralEntry, ZipInput, ZipOutput};

fn build_archive(path: &std::path::Path) {
    let mut output = ZipOutput::create(path).unwrap();

    let mut readme = CentralEntry::new("README.txt");
    readme
        .writer()
        .write_all(b"The quick brown fox jumps over the lazy dog.\n".repeat(40).as_slice())
        .unwrap();
    output.write(readme).unwrap();

    let mut dir = CentralEntry::new("assets/");
    dir.set_compression(0);
    output.write(dir).unwrap();

    let mut icon = CentralEntry::new("assets/icon.png");
    icon.set_compression(0);
    icon.writer().write_all(&[0x89, 0x50, 0x4e, 0x47, 1, 2, 3, 4, 5]).unwrap();
    output.write(icon).unwrap();

    output.write(CentralEntry::new("assets/empty.bin")).unwrap();

    output.close().unwrap();
}

#[test]
fn written_archives_read_back_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.zip");
    build_archive(&path);

    let input = ZipInput::open(&path).unwrap();
    assert_eq!(input.len(), 4);

    let readme = input.entry("README.txt").unwrap();
    assert_eq!(readme.local.compression, 8);
    assert_eq!(readme.local.size, 45 * 40);
    assert!(readme.local.compressed_size < readme.local.size);
    assert_eq!(
        readme.data().unwrap(),
        b"The quick brown fox jumps over the lazy dog.\n".repeat(40)
    );

    assert!(input.entry("assets/").unwrap().is_directory());

    let icon = input.entry("assets/icon.png").unwrap();
    assert_eq!(icon.local.compression, 0);
    assert_eq!(icon.data().unwrap(), [0x89, 0x50, 0x4e, 0x47, 1, 2, 3, 4, 5]);

    let end = input.central_end();
    assert_eq!(end.num_central_entries, 4);
    assert_eq!(end.total_central_entries, 4);
    assert_eq!(end.disk_number, 0);
}

#[test]
fn end_record_points_at_the_central_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offsets.zip");
    build_archive(&path);

    let bytes = std::fs::read(&path).unwrap();
    let input = ZipInput::open(&path).unwrap();
    let offset = input.central_end().central_start_offset as usize;
    let size = input.central_end().central_directory_size as usize;

    assert_eq!(&bytes[offset..offset + 4], &[0x50, 0x4b, 0x01, 0x02]);
    // The end record follows the directory immediately.
    assert_eq!(&bytes[offset + size..offset + size + 4], &[0x50, 0x4b, 0x05, 0x06]);
}

#[test]
fn stored_payloads_land_on_four_byte_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aligned.zip");

    // Odd name lengths push the natural payload offsets off alignment.
    let mut output = ZipOutput::create(&path).unwrap();
    for name in ["a", "bb.dat", "lib/arm64/libfoo.so", "x/y/z.bin"] {
        let mut entry = CentralEntry::new(name);
        entry.set_compression(0);
        entry.writer().write_all(name.as_bytes()).unwrap();
        output.write(entry).unwrap();
    }
    let mut deflated = CentralEntry::new("notes.txt");
    deflated.writer().write_all(&[7u8; 200]).unwrap();
    output.write(deflated).unwrap();
    output.close().unwrap();

    let input = ZipInput::open(&path).unwrap();
    for name in ["a", "bb.dat", "lib/arm64/libfoo.so", "x/y/z.bin"] {
        let entry = input.entry(name).unwrap();
        assert_eq!(entry.local.data_position % 4, 0, "{name} payload misaligned");
        assert_eq!(entry.data().unwrap(), name.as_bytes());
    }
    // Deflated payloads are never padded.
    assert!(input.entry("notes.txt").unwrap().local.extra_data.is_empty());
}

/// Collects warning lines so tests can assert on emitted diagnostics.
struct WarningRecorder {
    lines: Mutex<Vec<String>>
}

impl Log for WarningRecorder {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.lines.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static WARNINGS: WarningRecorder = WarningRecorder { lines: Mutex::new(Vec::new()) };

#[test]
fn duplicate_names_keep_the_first_entry_and_warn() {
    let _ = log::set_logger(&WARNINGS);
    log::set_max_level(LevelFilter::Warn);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dupes.zip");

    let mut output = ZipOutput::create(&path).unwrap();
    let mut first = CentralEntry::new("classes.dex");
    first.writer().write_all(b"first contents").unwrap();
    output.write(first).unwrap();
    let mut second = CentralEntry::new("classes.dex");
    second.writer().write_all(b"second contents").unwrap();
    output.write(second).unwrap();
    output.close().unwrap();

    let warnings = WARNINGS.lines.lock().unwrap();
    assert!(
        warnings.iter().any(|line| line.contains("duplicate") && line.contains("classes.dex")),
        "no duplicate warning recorded, got {:?}",
        *warnings
    );
    drop(warnings);

    let input = ZipInput::open(&path).unwrap();
    assert_eq!(input.len(), 1);
    assert_eq!(input.entry("classes.dex").unwrap().data().unwrap(), b"first contents");
}

#[test]
fn zero_length_entries_are_normalised_to_stored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.zip");

    let mut output = ZipOutput::create(&path).unwrap();
    // Deflated by default, but nothing ever written to it.
    output.write(CentralEntry::new("empty.marker")).unwrap();
    output.close().unwrap();

    let input = ZipInput::open(&path).unwrap();
    let entry = input.entry("empty.marker").unwrap();
    assert_eq!(entry.local.compression, 0);
    assert_eq!(entry.local.size, 0);
    assert_eq!(entry.local.compressed_size, 0);
    assert_eq!(entry.local.crc32, 0);
    assert_eq!(entry.data().unwrap(), b"");
}

#[test]
fn copying_every_entry_preserves_names_content_and_checksums() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.zip");
    let copy_path = dir.path().join("copy.zip");
    build_archive(&path);

    let source = ZipInput::open(&path).unwrap();
    let originals: Vec<(String, Vec<u8>, u32, u32)> = source
        .entries()
        .iter()
        .map(|entry| {
            (
                entry.name().to_string(),
                entry.data().unwrap(),
                entry.local.crc32,
                entry.local.compressed_size
            )
        })
        .collect();

    let mut output = ZipOutput::to_writer(std::fs::File::create(&copy_path).unwrap());
    for entry in source.into_entries() {
        output.write(entry).unwrap();
    }
    output.close().unwrap();

    let copied = ZipInput::open(&copy_path).unwrap();
    assert_eq!(copied.len(), originals.len());
    for (name, data, crc, compressed_size) in &originals {
        let entry = copied.entry(name).unwrap();
        assert_eq!(entry.data().unwrap(), *data, "{name} content changed");
        assert_eq!(entry.local.crc32, *crc, "{name} checksum changed");
        // Payloads are copied verbatim, never recompressed.
        assert_eq!(entry.local.compressed_size, *compressed_size);
    }
    assert_eq!(copied.entry("README.txt").unwrap().local.compression, 8);
    assert_eq!(copied.entry("assets/icon.png").unwrap().local.compression, 0);
}

struct RawZip {
    buf: Cursor<Vec<u8>>
}

impl RawZip {
    fn new() -> RawZip {
        RawZip { buf: Cursor::new(Vec::new()) }
    }

    fn position(&self) -> u32 {
        self.buf.position() as u32
    }

    fn local_header(&mut self, name: &str, bits: u16, crc: u32, csize: u32, size: u32) {
        self.buf.write_u32::<LittleEndian>(0x04034b50).unwrap();
        self.buf.write_u16::<LittleEndian>(20).unwrap();
        self.buf.write_u16::<LittleEndian>(bits).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0x21).unwrap();
        self.buf.write_u32::<LittleEndian>(crc).unwrap();
        self.buf.write_u32::<LittleEndian>(csize).unwrap();
        self.buf.write_u32::<LittleEndian>(size).unwrap();
        self.buf.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_all(name.as_bytes()).unwrap();
    }

    fn central_record(&mut self, name: &str, crc: u32, size: u32, offset: u32) {
        self.buf.write_u32::<LittleEndian>(0x02014b50).unwrap();
        self.buf.write_u16::<LittleEndian>(20).unwrap();
        self.buf.write_u16::<LittleEndian>(20).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0x21).unwrap();
        self.buf.write_u32::<LittleEndian>(crc).unwrap();
        self.buf.write_u32::<LittleEndian>(size).unwrap();
        self.buf.write_u32::<LittleEndian>(size).unwrap();
        self.buf.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u32::<LittleEndian>(0).unwrap();
        self.buf.write_u32::<LittleEndian>(offset).unwrap();
        self.buf.write_all(name.as_bytes()).unwrap();
    }

    fn end_record(&mut self, count: u16, dir_offset: u32) {
        let dir_size = self.position() - dir_offset;
        self.buf.write_u32::<LittleEndian>(0x06054b50).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
        self.buf.write_u16::<LittleEndian>(count).unwrap();
        self.buf.write_u16::<LittleEndian>(count).unwrap();
        self.buf.write_u32::<LittleEndian>(dir_size).unwrap();
        self.buf.write_u32::<LittleEndian>(dir_offset).unwrap();
        self.buf.write_u16::<LittleEndian>(0).unwrap();
    }

    fn into_input(self) -> zipsig_common::Result<ZipInput> {
        ZipInput::from_reader(Cursor::new(self.buf.into_inner()))
    }
}

#[test]
fn recovers_sizes_from_a_tagged_data_descriptor() {
    let body = b"streamed without sizes in the header";
    let crc = crc32fast::hash(body);

    let mut raw = RawZip::new();
    raw.local_header("stream.txt", 0x0008, 0, 0, 0);
    raw.buf.write_all(body).unwrap();
    raw.buf.write_u32::<LittleEndian>(0x08074b50).unwrap();
    raw.buf.write_u32::<LittleEndian>(crc).unwrap();
    raw.buf.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    raw.buf.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    let dir_offset = raw.position();
    raw.central_record("stream.txt", crc, body.len() as u32, 0);
    raw.end_record(1, dir_offset);

    let mut input = raw.into_input().unwrap();
    let entry = input.entry("stream.txt").unwrap();
    assert_eq!(entry.local.general_purpose_bits, 0);
    assert_eq!(entry.local.crc32, crc);
    assert_eq!(entry.local.size, body.len() as u32);
    assert_eq!(entry.local.compressed_size, body.len() as u32);
    assert_eq!(entry.data().unwrap(), body);

    // Re-emitting the entry writes literal sizes and drops the streaming bit.
    let dir = tempfile::tempdir().unwrap();
    let rewritten_path = dir.path().join("rewritten.zip");
    let mut output = ZipOutput::create(&rewritten_path).unwrap();
    output.write(input.take_entry("stream.txt").unwrap()).unwrap();
    output.close().unwrap();

    let bytes = std::fs::read(&rewritten_path).unwrap();
    assert_eq!(&bytes[6..8], &[0, 0]);
    assert_eq!(&bytes[14..18], &crc.to_le_bytes());
    assert_eq!(&bytes[18..22], &(body.len() as u32).to_le_bytes());
    assert_eq!(&bytes[22..26], &(body.len() as u32).to_le_bytes());
    let rewritten = ZipInput::open(&rewritten_path).unwrap();
    assert_eq!(rewritten.entry("stream.txt").unwrap().data().unwrap(), body);
}

#[test]
fn skips_descriptor_magics_that_appear_inside_the_payload() {
    // A descriptor magic inside the payload whose following bytes do not
    // describe the scanned span must not end the scan.
    let mut body = Vec::new();
    body.extend_from_slice(b"prefix ");
    body.extend_from_slice(&[0x50, 0x4b, 0x07, 0x08]);
    body.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    body.extend_from_slice(b" suffix");
    let crc = crc32fast::hash(&body);

    let mut raw = RawZip::new();
    raw.local_header("tricky.bin", 0x0008, 0, 0, 0);
    raw.buf.write_all(&body).unwrap();
    raw.buf.write_u32::<LittleEndian>(0x08074b50).unwrap();
    raw.buf.write_u32::<LittleEndian>(crc).unwrap();
    raw.buf.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    raw.buf.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    let dir_offset = raw.position();
    raw.central_record("tricky.bin", crc, body.len() as u32, 0);
    raw.end_record(1, dir_offset);

    let input = raw.into_input().unwrap();
    let entry = input.entry("tricky.bin").unwrap();
    assert_eq!(entry.local.size, body.len() as u32);
    assert_eq!(entry.local.crc32, crc);
    assert_eq!(entry.data().unwrap(), body);
}

#[test]
fn recovers_sizes_from_a_bare_descriptor_before_the_next_header() {
    let body = b"no descriptor magic here";
    let crc = crc32fast::hash(body);

    let mut raw = RawZip::new();
    raw.local_header("first.bin", 0x0008, 0, 0, 0);
    raw.buf.write_all(body).unwrap();
    // Bare descriptor, then the next local header's magic ends the scan.
    raw.buf.write_u32::<LittleEndian>(crc).unwrap();
    raw.buf.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    raw.buf.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    let second_offset = raw.position();
    raw.local_header("second.bin", 0, crc32fast::hash(b"tail"), 4, 4);
    raw.buf.write_all(b"tail").unwrap();
    let dir_offset = raw.position();
    raw.central_record("first.bin", crc, body.len() as u32, 0);
    raw.central_record("second.bin", crc32fast::hash(b"tail"), 4, second_offset);
    raw.end_record(2, dir_offset);

    let input = raw.into_input().unwrap();
    let first = input.entry("first.bin").unwrap();
    assert_eq!(first.local.size, body.len() as u32);
    assert_eq!(first.data().unwrap(), body);
    assert_eq!(input.entry("second.bin").unwrap().data().unwrap(), b"tail");
}

#[test]
fn rejects_unsupported_general_purpose_bits() {
    let mut raw = RawZip::new();
    // Bit 11 (UTF-8 names) is outside what this reader handles.
    raw.local_header("utf8.txt", 0x0800, 0, 0, 0);

    match raw.into_input() {
        Err(ZipSigError::UnsupportedGeneralPurposeBits(bits)) => assert_eq!(bits, 0x0800),
        other => panic!("expected unsupported-bits error, got {:?}", other.map(|_| ()))
    }
}

#[test]
fn missing_end_record_is_an_error() {
    let body = b"payload";
    let mut raw = RawZip::new();
    raw.local_header("a.txt", 0, crc32fast::hash(body), 7, 7);
    raw.buf.write_all(body).unwrap();
    raw.central_record("a.txt", crc32fast::hash(body), 7, 0);
    // Trailing junk where the end record should be.
    raw.buf.write_all(b"not an end record").unwrap();

    assert!(matches!(
        raw.into_input(),
        Err(ZipSigError::MissingEndOfCentralDirectory)
    ));
}

#[test]
fn central_record_without_local_entry_is_an_error() {
    let body = b"present";
    let mut raw = RawZip::new();
    raw.local_header("present.txt", 0, crc32fast::hash(body), 7, 7);
    raw.buf.write_all(body).unwrap();
    let dir_offset = raw.position();
    raw.central_record("present.txt", crc32fast::hash(body), 7, 0);
    raw.central_record("ghost.txt", 0, 0, 0);
    raw.end_record(2, dir_offset);

    match raw.into_input() {
        Err(ZipSigError::MissingLocalEntry(name)) => assert_eq!(name, "ghost.txt"),
        other => panic!("expected missing-local error, got {:?}", other.map(|_| ()))
    }
}

#[test]
fn later_local_entries_replace_earlier_ones_with_the_same_name() {
    let old = b"old contents";
    let new = b"new contents!";
    let mut raw = RawZip::new();
    raw.local_header("config.ini", 0, crc32fast::hash(old), old.len() as u32, old.len() as u32);
    raw.buf.write_all(old).unwrap();
    let second_offset = raw.position();
    raw.local_header("config.ini", 0, crc32fast::hash(new), new.len() as u32, new.len() as u32);
    raw.buf.write_all(new).unwrap();
    let dir_offset = raw.position();
    raw.central_record("config.ini", crc32fast::hash(new), new.len() as u32, second_offset);
    raw.end_record(1, dir_offset);

    let input = raw.into_input().unwrap();
    assert_eq!(input.len(), 1);
    assert_eq!(input.entry("config.ini").unwrap().data().unwrap(), new);
}
