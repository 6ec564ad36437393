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

use zipsig_common::Result;

use crate::cursor::{SinkCursor, SourceCursor};

pub const END_OF_CENTRAL_MAGIC: u32 = 0x06054b50;

/// End-of-central-directory record. Single-disk archives only, so the disk
/// fields stay zero in everything written here.
#[derive(Default)]
pub struct CentralEnd {
    pub disk_number: u16,
    pub central_start_disk: u16,
    pub num_central_entries: u16,
    pub total_central_entries: u16,
    pub central_directory_size: u32,
    pub central_start_offset: u64,
    pub file_comment: String
}

impl CentralEnd {
    /// Parses the record, or returns `Ok(None)` with the cursor rewound when
    /// the magic does not match.
    pub(crate) fn read(source: &SourceCursor) -> Result<Option<CentralEnd>> {
        let signature = source.read_u32()?;
        if signature != END_OF_CENTRAL_MAGIC {
            let position = source.position()?;
            source.seek(position - 4)?;
            return Ok(None);
        }
        let disk_number = source.read_u16()?;
        let central_start_disk = source.read_u16()?;
        let num_central_entries = source.read_u16()?;
        let total_central_entries = source.read_u16()?;
        let central_directory_size = source.read_u32()?;
        let central_start_offset = source.read_u32()? as u64;
        let comment_len = source.read_u16()?;
        let file_comment = source.read_string(comment_len as usize)?;
        Ok(Some(CentralEnd {
            disk_number,
            central_start_disk,
            num_central_entries,
            total_central_entries,
            central_directory_size,
            central_start_offset,
            file_comment
        }))
    }

    pub(crate) fn write(&self, output: &mut SinkCursor) -> Result<()> {
        output.write_u32(END_OF_CENTRAL_MAGIC)?;
        output.write_u16(self.disk_number)?;
        output.write_u16(self.central_start_disk)?;
        output.write_u16(self.num_central_entries)?;
        output.write_u16(self.total_central_entries)?;
        output.write_u32(self.central_directory_size)?;
        output.write_u32(self.central_start_offset as u32)?;
        output.write_u16(self.file_comment.len() as u16)?;
        output.write_string(&self.file_comment)?;
        Ok(())
    }
}
