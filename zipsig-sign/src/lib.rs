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

mod crypto_keys;
mod manifest;
mod progress;
mod signature_block;
mod signature_file;
mod zip_signer;

pub use crypto_keys::Keys;
pub use manifest::{build_signed_manifest, Manifest};
pub use progress::{CancelToken, ProgressListener};
pub use signature_block::{build_signature_block, sign_signature_file};
pub use signature_file::generate_signature_file;
pub use zip_signer::{
    sign_archive, SignOutcome, SIGNATURE_BLOCK_NAME, SIGNATURE_FILE_NAME
};
