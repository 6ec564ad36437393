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

use std::collections::HashSet;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use log::warn;
use zipsig_common::Result;

use crate::central_end::CentralEnd;
use crate::central_entry::CentralEntry;
use crate::cursor::SinkCursor;

/// Archive writer. Entries stream out as they arrive; [ZipOutput::close]
/// appends the central directory and end record. Closing consumes the writer,
/// so nothing can be appended after the directory is down.
pub struct ZipOutput {
    sink: SinkCursor,
    entries_written: Vec<CentralEntry>,
    names_written: HashSet<String>
}

impl ZipOutput {
    pub fn create(path: impl AsRef<Path>) -> Result<ZipOutput> {
        Ok(Self::to_writer(File::create(path)?))
    }

    pub fn to_writer(writer: impl Write + Seek + 'static) -> ZipOutput {
        ZipOutput {
            sink: SinkCursor::new(writer),
            entries_written: Vec::new(),
            names_written: HashSet::new()
        }
    }

    /// Writes the entry's local record and payload. A name seen before is
    /// skipped with a warning; the first occurrence wins.
    pub fn write(&mut self, mut entry: CentralEntry) -> Result<()> {
        if !self.names_written.insert(entry.name().to_string()) {
            warn!("skipping duplicate file in output: {}", entry.name());
            return Ok(());
        }
        entry.write_local_entry(&mut self.sink)?;
        self.entries_written.push(entry);
        Ok(())
    }

    /// Emits the central directory and end record, then flushes.
    pub fn close(mut self) -> Result<()> {
        let central_start_offset = self.sink.position()?;
        for entry in &self.entries_written {
            entry.write_central_record(&mut self.sink)?;
        }
        let central_directory_size = (self.sink.position()? - central_start_offset) as u32;

        let count = self.entries_written.len() as u16;
        let end = CentralEnd {
            num_central_entries: count,
            total_central_entries: count,
            central_directory_size,
            central_start_offset,
            ..CentralEnd::default()
        };
        end.write(&mut self.sink)?;
        self.sink.flush()?;
        Ok(())
    }
}
