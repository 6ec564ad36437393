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

use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use zipsig_common::{Result, ZipSigError};

use crate::cursor::{SinkCursor, SourceCursor};
use crate::dos_time;
use crate::entry_stream::EntryDataReader;
use crate::local_entry::{EntryDataWriter, LocalEntry};

pub const CENTRAL_HEADER_MAGIC: u32 = 0x02014b50;

/// One archive entry as the central directory sees it, owning its local
/// counterpart.
///
/// Fields the two records must agree on (general purpose bits, compression,
/// CRC, sizes, name) live only on the local entry and are copied into the
/// central record when it is serialised, so the pair cannot drift apart.
pub struct CentralEntry {
    pub version_made_by: u16,
    pub version_required: u16,
    pub modification_time: u16,
    pub modification_date: u16,
    pub extra_data: Vec<u8>,
    pub file_comment: String,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u64,
    pub local: LocalEntry
}

impl CentralEntry {
    /// Fresh deflated entry stamped with the current time.
    pub fn new(name: &str) -> CentralEntry {
        let mut entry = CentralEntry {
            version_made_by: 0,
            version_required: 0,
            modification_time: 0,
            modification_date: 0,
            extra_data: Vec::new(),
            file_comment: String::new(),
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 0,
            local: LocalEntry::new(name)
        };
        entry.set_time(&Utc::now());
        entry
    }

    /// Parses one central directory record. Returns `Ok(None)` when the next
    /// four bytes are not the central header magic, leaving the cursor back
    /// on them. The local entry is a placeholder until [CentralEntry::attach_local]
    /// pairs in the real one.
    pub(crate) fn read(source: &SourceCursor) -> Result<Option<CentralEntry>> {
        let signature = source.read_u32()?;
        if signature != CENTRAL_HEADER_MAGIC {
            let position = source.position()?;
            source.seek(position - 4)?;
            return Ok(None);
        }

        let version_made_by = source.read_u16()?;
        let version_required = source.read_u16()?;
        let general_purpose_bits = source.read_u16()?;
        if general_purpose_bits != 0 && general_purpose_bits != 0x0008 {
            return Err(ZipSigError::UnsupportedGeneralPurposeBits(general_purpose_bits));
        }
        // The record's own copies of the shared fields; the paired local
        // entry is authoritative for these, so they are only skipped over.
        let _compression = source.read_u16()?;
        let modification_time = source.read_u16()?;
        let modification_date = source.read_u16()?;
        let _crc32 = source.read_u32()?;
        let _compressed_size = source.read_u32()?;
        let _size = source.read_u32()?;
        let file_name_len = source.read_u16()?;
        let extra_len = source.read_u16()?;
        let file_comment_len = source.read_u16()?;
        let disk_number_start = source.read_u16()?;
        let internal_attributes = source.read_u16()?;
        let external_attributes = source.read_u32()?;
        let local_header_offset = source.read_u32()? as u64;
        let filename = source.read_string(file_name_len as usize)?;
        let extra_data = source.read_bytes(extra_len as usize)?;
        let file_comment = source.read_string(file_comment_len as usize)?;
        debug!("central record {} offset 0x{:08x}", filename, local_header_offset);

        Ok(Some(CentralEntry {
            version_made_by,
            version_required,
            modification_time,
            modification_date,
            extra_data,
            file_comment,
            disk_number_start,
            internal_attributes,
            external_attributes,
            local_header_offset,
            local: LocalEntry::new(&filename)
        }))
    }

    pub(crate) fn attach_local(&mut self, local: LocalEntry) {
        self.local = local;
    }

    /// Writes the local header and payload, recording where they landed for
    /// the central record emitted later.
    pub(crate) fn write_local_entry(&mut self, output: &mut SinkCursor) -> Result<()> {
        self.local_header_offset = output.position()?;
        self.local.write(output)
    }

    pub(crate) fn write_central_record(&self, output: &mut SinkCursor) -> Result<()> {
        output.write_u32(CENTRAL_HEADER_MAGIC)?;
        output.write_u16(self.version_made_by)?;
        output.write_u16(self.version_required)?;
        output.write_u16(self.local.general_purpose_bits)?;
        output.write_u16(self.local.compression)?;
        output.write_u16(self.modification_time)?;
        output.write_u16(self.modification_date)?;
        output.write_u32(self.local.crc32)?;
        output.write_u32(self.local.compressed_size)?;
        output.write_u32(self.local.size)?;
        output.write_u16(self.local.filename.len() as u16)?;
        output.write_u16(self.extra_data.len() as u16)?;
        output.write_u16(self.file_comment.len() as u16)?;
        output.write_u16(self.disk_number_start)?;
        output.write_u16(self.internal_attributes)?;
        output.write_u32(self.external_attributes)?;
        output.write_u32(self.local_header_offset as u32)?;
        output.write_string(&self.local.filename)?;
        output.write_bytes(&self.extra_data)?;
        output.write_string(&self.file_comment)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.local.filename
    }

    pub fn is_directory(&self) -> bool {
        self.local.filename.ends_with('/')
    }

    /// Stamps the modification time on both records, truncated to DOS
    /// two-second resolution.
    pub fn set_time(&mut self, timestamp: &DateTime<Utc>) {
        let (date, time) = dos_time::to_dos(timestamp);
        self.modification_date = date;
        self.modification_time = time;
        self.local.modification_date = date;
        self.local.modification_time = time;
    }

    /// The central record's modification time, when its DOS fields name a
    /// real calendar date.
    pub fn get_time(&self) -> Option<NaiveDateTime> {
        dos_time::from_dos(self.modification_date, self.modification_time)
    }

    /// 0 (stored) or 8 (deflated); applies to payloads written afterwards.
    pub fn set_compression(&mut self, compression: u16) {
        self.local.compression = compression;
    }

    pub fn data(&self) -> Result<Vec<u8>> {
        self.local.data()
    }

    pub fn data_stream(&self) -> Result<EntryDataReader> {
        self.local.data_stream()
    }

    pub fn writer(&mut self) -> &mut EntryDataWriter {
        self.local.writer()
    }
}
