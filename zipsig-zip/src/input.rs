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

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::debug;
use zipsig_common::{Result, ZipSigError};

use crate::central_end::CentralEnd;
use crate::central_entry::CentralEntry;
use crate::cursor::SourceCursor;
use crate::local_entry::LocalEntry;

pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// A fully parsed archive: every central directory record paired with its
/// local entry, in central directory order.
///
/// Parsing walks the file front to back. Local entries are consumed until a
/// non-local magic appears, then central records until a non-central magic,
/// then the end record, which must be present. Payload bytes stay on disk
/// and are only pulled through an entry's data accessors.
pub struct ZipInput {
    entries: Vec<CentralEntry>,
    central_end: CentralEnd
}

impl ZipInput {
    pub fn open(path: impl AsRef<Path>) -> Result<ZipInput> {
        debug!("reading archive {}", path.as_ref().display());
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader(reader: impl Read + Seek + 'static) -> Result<ZipInput> {
        let source = SourceCursor::new(reader);

        // When the same name appears twice in the local run the later entry
        // replaces the earlier one in place, keeping first-seen order.
        let mut locals: Vec<LocalEntry> = Vec::new();
        while let Some(local) = LocalEntry::read(&source)? {
            match locals.iter().position(|known| known.filename == local.filename) {
                Some(index) => locals[index] = local,
                None => locals.push(local)
            }
        }
        debug!("parsed {} local entries", locals.len());

        let mut entries = Vec::new();
        while let Some(mut central) = CentralEntry::read(&source)? {
            let index = locals
                .iter()
                .position(|local| local.filename == central.name())
                .ok_or_else(|| ZipSigError::MissingLocalEntry(central.name().to_string()))?;
            central.attach_local(locals.remove(index));
            entries.push(central);
        }
        debug!("parsed {} central records", entries.len());

        let central_end =
            CentralEnd::read(&source)?.ok_or(ZipSigError::MissingEndOfCentralDirectory)?;
        Ok(ZipInput { entries, central_end })
    }

    pub fn entries(&self) -> &[CentralEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&CentralEntry> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    /// Removes and returns the named entry, so it can be retimed or rewritten
    /// and handed to an output archive.
    pub fn take_entry(&mut self, name: &str) -> Option<CentralEntry> {
        let index = self.entries.iter().position(|entry| entry.name() == name)?;
        Some(self.entries.remove(index))
    }

    pub fn into_entries(self) -> Vec<CentralEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decompressed bytes of `META-INF/MANIFEST.MF`, if the archive has one.
    pub fn manifest_bytes(&self) -> Result<Option<Vec<u8>>> {
        match self.entry(MANIFEST_NAME) {
            Some(entry) => Ok(Some(entry.data()?)),
            None => Ok(None)
        }
    }

    pub fn central_end(&self) -> &CentralEnd {
        &self.central_end
    }
}
