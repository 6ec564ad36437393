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

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zipsig_common::Result;

pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

pub trait WriteSeek: Write + Seek {}
impl<T: Write + Seek> WriteSeek for T {}

/// Shared little-endian reading cursor over one random-access source.
///
/// Clones share the underlying handle and its file position. Anything holding
/// a clone re-seeks before reading, so several logical views (the entry
/// parser, any number of payload streams) can take turns on the same handle.
#[derive(Clone)]
pub struct SourceCursor {
    inner: Rc<RefCell<Box<dyn ReadSeek>>>
}

impl SourceCursor {
    pub fn new(source: impl Read + Seek + 'static) -> SourceCursor {
        SourceCursor {
            inner: Rc::new(RefCell::new(Box::new(source)))
        }
    }

    pub fn position(&self) -> Result<u64> {
        Ok(self.inner.borrow_mut().stream_position()?)
    }

    pub fn seek(&self, position: u64) -> Result<()> {
        self.inner.borrow_mut().seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn read_u8(&self) -> Result<u8> {
        Ok(self.inner.borrow_mut().read_u8()?)
    }

    pub fn read_u16(&self) -> Result<u16> {
        Ok(self.inner.borrow_mut().read_u16::<LittleEndian>()?)
    }

    pub fn read_u32(&self) -> Result<u32> {
        Ok(self.inner.borrow_mut().read_u32::<LittleEndian>()?)
    }

    pub fn read_bytes(&self, length: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; length];
        self.inner.borrow_mut().read_exact(&mut buffer)?;
        Ok(buffer)
    }

    pub fn read_string(&self, length: usize) -> Result<String> {
        let buffer = self.read_bytes(length)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Seek and read in one step, keeping the borrow of the shared handle to
    /// a single scope. Used by payload streams that track their own offset.
    pub(crate) fn read_at(&self, position: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inner = self.inner.borrow_mut();
        inner.seek(SeekFrom::Start(position))?;
        inner.read(buf)
    }
}

/// Little-endian writing cursor over a seekable sink.
pub struct SinkCursor {
    inner: Box<dyn WriteSeek>
}

impl SinkCursor {
    pub fn new(sink: impl Write + Seek + 'static) -> SinkCursor {
        SinkCursor {
            inner: Box::new(sink)
        }
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(self.inner.write_u16::<LittleEndian>(value)?)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.inner.write_u32::<LittleEndian>(value)?)
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        Ok(self.inner.write_all(value)?)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        Ok(self.inner.write_all(value.as_bytes())?)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }
}
