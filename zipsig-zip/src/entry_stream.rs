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

use std::io::Read;

use flate2::read::DeflateDecoder;

use crate::cursor::SourceCursor;

/// Reads exactly one entry's compressed bytes from the shared source.
///
/// Each stream keeps its own offset and remaining-length bookkeeping, so any
/// number of them can be open against the same archive at once; every read
/// re-seeks the shared handle to this stream's position first.
pub struct EntryStream {
    source: SourceCursor,
    position: u64,
    remaining: u64
}

impl EntryStream {
    pub(crate) fn new(source: SourceCursor, data_position: u64, compressed_size: u32) -> EntryStream {
        EntryStream {
            source,
            position: data_position,
            remaining: compressed_size as u64
        }
    }
}

impl Read for EntryStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let limit = self.remaining.min(buf.len() as u64) as usize;
        let count = self.source.read_at(self.position, &mut buf[..limit])?;
        self.position += count as u64;
        self.remaining -= count as u64;
        Ok(count)
    }
}

/// Decompressing view over an entry's payload. Raw deflate has no zlib
/// wrapper in zip files, hence [DeflateDecoder] rather than `ZlibDecoder`.
pub enum EntryDataReader {
    Stored(EntryStream),
    Deflated(Box<DeflateDecoder<EntryStream>>)
}

impl Read for EntryDataReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            EntryDataReader::Stored(stream) => stream.read(buf),
            EntryDataReader::Deflated(decoder) => decoder.read(buf)
        }
    }
}
