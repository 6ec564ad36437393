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

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::debug;
use zipsig_common::{Result, ZipSigError};

use crate::cursor::{SinkCursor, SourceCursor};
use crate::entry_stream::{EntryDataReader, EntryStream};

pub const LOCAL_HEADER_MAGIC: u32 = 0x04034b50;

/// One local file header plus its payload access.
///
/// The payload is one of: lazy (read compressed bytes from the source at
/// `data_position` when needed), or materialized (an owned buffer produced
/// through [LocalEntry::writer]).
pub struct LocalEntry {
    pub version_required: u16,
    pub general_purpose_bits: u16,
    pub compression: u16,
    pub modification_time: u16,
    pub modification_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub size: u32,
    pub filename: String,
    pub extra_data: Vec<u8>,
    pub data_position: u64,
    source: Option<SourceCursor>,
    data: Option<Vec<u8>>,
    writer: Option<EntryDataWriter>
}

impl LocalEntry {
    /// Fresh in-memory entry, deflated by default, with no payload yet.
    pub fn new(name: &str) -> LocalEntry {
        LocalEntry {
            version_required: 0,
            general_purpose_bits: 0,
            compression: 8,
            modification_time: 0,
            modification_date: 0,
            crc32: 0,
            compressed_size: 0,
            size: 0,
            filename: name.to_string(),
            extra_data: Vec::new(),
            data_position: 0,
            source: None,
            data: Some(Vec::new()),
            writer: None
        }
    }

    /// Parses one local entry from the cursor. Returns `Ok(None)` when the
    /// next four bytes are not the local header magic, leaving the cursor
    /// back on them; that is how the end of the local-entries run is found.
    pub(crate) fn read(source: &SourceCursor) -> Result<Option<LocalEntry>> {
        debug!("local header probe at 0x{:08x}", source.position()?);
        let signature = source.read_u32()?;
        if signature != LOCAL_HEADER_MAGIC {
            let position = source.position()?;
            source.seek(position - 4)?;
            return Ok(None);
        }

        let version_required = source.read_u16()?;
        let general_purpose_bits = source.read_u16()?;
        let compression = source.read_u16()?;
        let modification_time = source.read_u16()?;
        let modification_date = source.read_u16()?;
        let crc32 = source.read_u32()?;
        let compressed_size = source.read_u32()?;
        let size = source.read_u32()?;
        let file_name_len = source.read_u16()?;
        let extra_len = source.read_u16()?;
        let filename = source.read_string(file_name_len as usize)?;
        let extra_data = source.read_bytes(extra_len as usize)?;
        let data_position = source.position()?;
        debug!("local entry {} data at 0x{:08x}", filename, data_position);

        let mut entry = LocalEntry {
            version_required,
            general_purpose_bits,
            compression,
            modification_time,
            modification_date,
            crc32,
            compressed_size,
            size,
            filename,
            extra_data,
            data_position,
            source: Some(source.clone()),
            data: None,
            writer: None
        };
        entry.locate_payload_end(source)?;
        Ok(Some(entry))
    }

    /// Leaves the cursor just past this entry's payload, recovering CRC and
    /// sizes from a trailing data descriptor when the streaming bit is set.
    fn locate_payload_end(&mut self, source: &SourceCursor) -> Result<()> {
        if self.general_purpose_bits != 0 {
            if self.general_purpose_bits != 0x0008 {
                return Err(ZipSigError::UnsupportedGeneralPurposeBits(
                    self.general_purpose_bits
                ));
            }
            // The header held no sizes; scan forward for a descriptor magic
            // or the next header's magic. Payload bytes can contain either
            // by coincidence, so a match only counts when the descriptor's
            // compressed size agrees with the span actually scanned.
            let mut scan = [0u8; 4];
            scan.copy_from_slice(&source.read_bytes(4)?);
            loop {
                if scan[0] == 0x50 && scan[1] == 0x4b {
                    if scan[2] == 0x07 && scan[3] == 0x08 {
                        // Tagged descriptor; its fields follow the magic.
                        let magic_end = source.position()?;
                        let crc32 = source.read_u32()?;
                        let compressed_size = source.read_u32()?;
                        let size = source.read_u32()?;
                        if compressed_size as u64 == magic_end - 4 - self.data_position {
                            self.crc32 = crc32;
                            self.compressed_size = compressed_size;
                            self.size = size;
                            break;
                        }
                        source.seek(magic_end)?;
                    } else if (scan[2] == 0x03 && scan[3] == 0x04)
                        || (scan[2] == 0x01 && scan[3] == 0x02)
                    {
                        // Next header. A bare descriptor would be the twelve
                        // bytes just before its magic.
                        let magic_end = source.position()?;
                        if magic_end >= self.data_position + 16 {
                            source.seek(magic_end - 16)?;
                            let crc32 = source.read_u32()?;
                            let compressed_size = source.read_u32()?;
                            let size = source.read_u32()?;
                            if compressed_size as u64 == magic_end - 16 - self.data_position {
                                self.crc32 = crc32;
                                self.compressed_size = compressed_size;
                                self.size = size;
                                // Cursor now sits back on the next header.
                                break;
                            }
                            source.seek(magic_end)?;
                        }
                    }
                }
                scan.copy_within(1.., 0);
                scan[3] = source.read_u8()?;
            }
            // The rewritten entry carries literal sizes; no descriptor is
            // ever emitted again.
            self.general_purpose_bits = 0;
        } else {
            source.seek(self.data_position + self.compressed_size as u64)?;
        }

        // Zero-length entries are never kept compressed.
        if self.size == 0 {
            self.compressed_size = 0;
            self.compression = 0;
            self.crc32 = 0;
        }
        Ok(())
    }

    /// Serialises the header and payload at the sink's current position.
    pub(crate) fn write(&mut self, output: &mut SinkCursor) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let payload = writer.finish()?;
            self.size = payload.size;
            self.crc32 = payload.crc32;
            self.compressed_size = payload.data.len() as u32;
            self.data = Some(payload.data);
        }

        if self.size == 0 {
            self.compression = 0;
            self.compressed_size = 0;
            self.crc32 = 0;
            if let Some(data) = &mut self.data {
                data.clear();
            }
        }

        output.write_u32(LOCAL_HEADER_MAGIC)?;
        output.write_u16(self.version_required)?;
        output.write_u16(self.general_purpose_bits)?;
        output.write_u16(self.compression)?;
        output.write_u16(self.modification_time)?;
        output.write_u16(self.modification_date)?;
        output.write_u32(self.crc32)?;
        output.write_u32(self.compressed_size)?;
        output.write_u32(self.size)?;
        output.write_u16(self.filename.len() as u16)?;

        // Stored payloads start on a 4-byte boundary so runtimes can map
        // them in place. The padding counts toward the declared extra length
        // and is indistinguishable from extra-field content to readers.
        let mut align_bytes = 0u16;
        if self.compression == 0 && self.size > 0 {
            let data_pos = output.position()?
                + 2
                + self.filename.len() as u64
                + self.extra_data.len() as u64;
            let remainder = (data_pos % 4) as u16;
            if remainder > 0 {
                align_bytes = 4 - remainder;
            }
        }

        output.write_u16(self.extra_data.len() as u16 + align_bytes)?;
        output.write_string(&self.filename)?;
        output.write_bytes(&self.extra_data)?;
        if align_bytes > 0 {
            output.write_bytes(&vec![0u8; align_bytes as usize])?;
        }

        match &self.data {
            Some(data) => output.write_bytes(data)?,
            None => {
                let source = self.source.as_ref().ok_or_else(|| {
                    ZipSigError::EntrySourceMissing(self.filename.clone())
                })?;
                // Copy the compressed bytes verbatim; never re-compress.
                source.seek(self.data_position)?;
                let payload = source.read_bytes(self.compressed_size as usize)?;
                output.write_bytes(&payload)?;
            }
        }
        Ok(())
    }

    /// Decompressing reader over this entry's payload.
    pub fn data_stream(&self) -> Result<EntryDataReader> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ZipSigError::EntrySourceMissing(self.filename.clone()))?;
        let stream = EntryStream::new(source.clone(), self.data_position, self.compressed_size);
        Ok(if self.compression == 0 {
            EntryDataReader::Stored(stream)
        } else {
            EntryDataReader::Deflated(Box::new(flate2::read::DeflateDecoder::new(stream)))
        })
    }

    /// The entry's full decompressed payload.
    pub fn data(&self) -> Result<Vec<u8>> {
        use std::io::Read;
        let mut data = Vec::with_capacity(self.size as usize);
        self.data_stream()?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Starts a payload write stream for this entry, replacing any previous
    /// one. The CRC and sizes it accumulates become the header fields when
    /// the entry is written out.
    pub fn writer(&mut self) -> &mut EntryDataWriter {
        self.writer.insert(EntryDataWriter::new(self.compression))
    }
}

/// Payload write stream: bytes pass through a CRC-32 accumulator and size
/// counter on their way into a plain buffer (store) or a raw deflate
/// compressor at best quality.
pub struct EntryDataWriter {
    size: u32,
    crc: crc32fast::Hasher,
    sink: PayloadSink
}

enum PayloadSink {
    Stored(Vec<u8>),
    Deflated(DeflateEncoder<Vec<u8>>)
}

struct FinishedPayload {
    data: Vec<u8>,
    crc32: u32,
    size: u32
}

impl EntryDataWriter {
    fn new(compression: u16) -> EntryDataWriter {
        let sink = if compression == 0 {
            PayloadSink::Stored(Vec::new())
        } else {
            PayloadSink::Deflated(DeflateEncoder::new(Vec::new(), Compression::best()))
        };
        EntryDataWriter {
            size: 0,
            crc: crc32fast::Hasher::new(),
            sink
        }
    }

    fn finish(self) -> Result<FinishedPayload> {
        let data = match self.sink {
            PayloadSink::Stored(buffer) => buffer,
            PayloadSink::Deflated(encoder) => encoder.finish()?
        };
        Ok(FinishedPayload {
            data,
            crc32: self.crc.finalize(),
            size: self.size
        })
    }
}

impl Write for EntryDataWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let count = match &mut self.sink {
            PayloadSink::Stored(buffer) => buffer.write(buf)?,
            PayloadSink::Deflated(encoder) => encoder.write(buf)?
        };
        self.crc.update(&buf[..count]);
        self.size += count as u32;
        Ok(count)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.sink {
            PayloadSink::Stored(_) => Ok(()),
            PayloadSink::Deflated(encoder) => encoder.flush()
        }
    }
}
