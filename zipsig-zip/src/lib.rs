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

mod central_end;
mod central_entry;
mod cursor;
mod dos_time;
mod entry_stream;
mod input;
mod local_entry;
mod output;

pub use central_end::{CentralEnd, END_OF_CENTRAL_MAGIC};
pub use central_entry::{CentralEntry, CENTRAL_HEADER_MAGIC};
pub use cursor::{SinkCursor, SourceCursor};
pub use entry_stream::{EntryDataReader, EntryStream};
pub use input::{ZipInput, MANIFEST_NAME};
pub use local_entry::{EntryDataWriter, LocalEntry, LOCAL_HEADER_MAGIC};
pub use output::ZipOutput;
