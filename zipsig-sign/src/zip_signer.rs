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

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

use chrono::Duration;
use log::{debug, warn};
use zipsig_common::{Result, ZipSigError};
use zipsig_zip::{CentralEntry, ZipInput, ZipOutput, MANIFEST_NAME};

use crate::crypto_keys::Keys;
use crate::manifest::build_signed_manifest;
use crate::progress::{CancelToken, ProgressListener, ProgressTracker};
use crate::signature_block::build_signature_block;
use crate::signature_file::generate_signature_file;

pub const SIGNATURE_FILE_NAME: &str = "META-INF/CERT.SF";
pub const SIGNATURE_BLOCK_NAME: &str = "META-INF/CERT.RSA";

#[derive(Debug, PartialEq, Eq)]
pub enum SignOutcome {
    Completed,
    Canceled
}

/// Signs `input_path` into `output_path`: digest manifest first, then the
/// signature file, the signature block, and finally every covered entry in
/// sorted order. Progress callbacks fire once per item; the cancel token is
/// polled between items. A canceled or failed run leaves no output file
/// behind.
pub fn sign_archive(
    input_path: &Path,
    output_path: &Path,
    keys: &Keys,
    listener: Option<&mut dyn ProgressListener>,
    cancel: &CancelToken
) -> Result<SignOutcome> {
    // Writing over the input would truncate it while it still has to be
    // read back, so refuse before opening anything.
    if input_path == output_path {
        return Err(ZipSigError::InputOutputPathsEqual(
            input_path.display().to_string()
        ));
    }

    let result = run_signing(input_path, output_path, keys, listener, cancel);
    if matches!(result, Ok(SignOutcome::Canceled) | Err(_)) {
        if let Err(error) = fs::remove_file(output_path) {
            if error.kind() != io::ErrorKind::NotFound {
                warn!(
                    "could not remove partial output {}: {}",
                    output_path.display(),
                    error
                );
            }
        }
    }
    result
}

fn run_signing(
    input_path: &Path,
    output_path: &Path,
    keys: &Keys,
    listener: Option<&mut dyn ProgressListener>,
    cancel: &CancelToken
) -> Result<SignOutcome> {
    // Assume the certificate is valid for at least an hour.
    let timestamp = keys.not_before()? + Duration::hours(1);

    let mut input = ZipInput::open(input_path)?;
    let mut output = ZipOutput::create(output_path)?;
    let mut progress = ProgressTracker::new(listener, input.len() + 3);

    progress.step(MANIFEST_NAME);
    let manifest = build_signed_manifest(&input, cancel)?;
    if cancel.is_canceled() {
        return Ok(SignOutcome::Canceled);
    }
    let mut manifest_entry = CentralEntry::new(MANIFEST_NAME);
    manifest_entry.set_time(&timestamp);
    manifest_entry.writer().write_all(&manifest.to_bytes())?;
    output.write(manifest_entry)?;

    progress.step(SIGNATURE_FILE_NAME);
    let sf_bytes = generate_signature_file(&manifest);
    if cancel.is_canceled() {
        return Ok(SignOutcome::Canceled);
    }
    let mut sf_entry = CentralEntry::new(SIGNATURE_FILE_NAME);
    sf_entry.set_time(&timestamp);
    sf_entry.writer().write_all(&sf_bytes)?;
    output.write(sf_entry)?;

    progress.step(SIGNATURE_BLOCK_NAME);
    let block = build_signature_block(&sf_bytes, keys)?;
    let mut block_entry = CentralEntry::new(SIGNATURE_BLOCK_NAME);
    block_entry.set_time(&timestamp);
    block_entry.writer().write_all(&block)?;
    output.write(block_entry)?;

    // Copy everything the manifest covers, in its sorted order, restamped
    // to the shared timestamp. Compressed payloads move verbatim.
    for name in manifest.entry_names() {
        if cancel.is_canceled() {
            return Ok(SignOutcome::Canceled);
        }
        progress.step(name);
        let mut entry = input
            .take_entry(name)
            .ok_or_else(|| ZipSigError::EntrySourceMissing(name.to_string()))?;
        entry.set_time(&timestamp);
        output.write(entry)?;
    }
    if cancel.is_canceled() {
        return Ok(SignOutcome::Canceled);
    }

    output.close()?;
    debug!(
        "signed {} into {}",
        input_path.display(),
        output_path.display()
    );
    Ok(SignOutcome::Completed)
}
