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

use std::collections::BTreeMap;
use std::io::Read;

use base64::{prelude::BASE64_STANDARD, Engine};
use log::debug;
use sha1::{Digest, Sha1};
use zipsig_common::Result;
use zipsig_zip::{ZipInput, MANIFEST_NAME};

use crate::progress::CancelToken;

/// JAR manifest: one main attribute section followed by one named stanza per
/// covered entry, sorted by name. Attribute order inside a stanza is
/// preserved, so rendering the same manifest twice gives identical bytes.
pub struct Manifest {
    main_attributes: Vec<(String, String)>,
    entries: BTreeMap<String, Vec<(String, String)>>
}

impl Manifest {
    pub fn new() -> Manifest {
        Manifest {
            main_attributes: Vec::new(),
            entries: BTreeMap::new()
        }
    }

    /// Parses manifest bytes. Folded lines (a leading space continuing the
    /// previous line) are unfolded first; blocks are separated by blank
    /// lines, with the first block forming the main attributes and each
    /// later block keyed by its `Name` attribute.
    pub fn parse(bytes: &[u8]) -> Manifest {
        let text = String::from_utf8_lossy(bytes);
        let mut logical_lines: Vec<String> = Vec::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(rest) = line.strip_prefix(' ') {
                if let Some(last) = logical_lines.last_mut() {
                    last.push_str(rest);
                    continue;
                }
            }
            logical_lines.push(line.to_string());
        }

        let mut manifest = Manifest::new();
        let mut block: Vec<(String, String)> = Vec::new();
        let mut in_main_section = true;
        let terminator = String::new();
        for line in logical_lines.iter().chain(std::iter::once(&terminator)) {
            if line.is_empty() {
                if in_main_section {
                    manifest.main_attributes = std::mem::take(&mut block);
                    in_main_section = false;
                } else if !block.is_empty() {
                    let mut name = None;
                    let mut attributes = Vec::new();
                    for (key, value) in block.drain(..) {
                        if key == "Name" && name.is_none() {
                            name = Some(value);
                        } else {
                            attributes.push((key, value));
                        }
                    }
                    if let Some(name) = name {
                        manifest.entries.insert(name, attributes);
                    }
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(": ") {
                block.push((key.to_string(), value.to_string()));
            }
        }
        manifest
    }

    pub fn main_attributes(&self) -> &[(String, String)] {
        &self.main_attributes
    }

    /// Entry names in sorted order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entry_attributes(&self, name: &str) -> Option<&[(String, String)]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// One entry's stanza exactly as [Manifest::to_bytes] renders it. The
    /// signature file digests these bytes, so the two must never diverge.
    pub fn entry_stanza_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let attributes = self.entries.get(name)?;
        let mut out = Vec::new();
        write_attribute_line(&mut out, "Name", name);
        for (key, value) in attributes {
            write_attribute_line(&mut out, key, value);
        }
        out.extend_from_slice(b"\r\n");
        Some(out)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in &self.main_attributes {
            write_attribute_line(&mut out, key, value);
        }
        out.extend_from_slice(b"\r\n");
        for name in self.entries.keys() {
            if let Some(stanza) = self.entry_stanza_bytes(name) {
                out.extend_from_slice(&stanza);
            }
        }
        out
    }
}

/// Signature-related names under META-INF never get digested or copied.
pub(crate) fn is_signature_entry_name(name: &str) -> bool {
    name.starts_with("META-INF/")
        && (name.ends_with(".SF") || name.ends_with(".RSA") || name.ends_with(".DSA"))
}

/// Builds the manifest covering every content entry of the input archive:
/// directories and signature files are skipped, everything else gets a
/// base64 SHA-1 of its decompressed bytes. Attributes an existing input
/// manifest carried for an entry are kept, with only the digest replaced.
pub fn build_signed_manifest(input: &ZipInput, cancel: &CancelToken) -> Result<Manifest> {
    let prior = match input.manifest_bytes()? {
        Some(bytes) => Some(Manifest::parse(&bytes)),
        None => None
    };

    let mut output = Manifest::new();
    match &prior {
        Some(prior_manifest) => {
            output.main_attributes = prior_manifest.main_attributes.clone();
        }
        None => {
            output
                .main_attributes
                .push(("Manifest-Version".to_string(), "1.0".to_string()));
            output
                .main_attributes
                .push(("Created-By".to_string(), "1.0 (Android SignApk)".to_string()));
        }
    }

    let mut entries: Vec<_> = input.entries().iter().collect();
    entries.sort_unstable_by_key(|entry| entry.name());
    for entry in entries {
        if cancel.is_canceled() {
            break;
        }
        let name = entry.name();
        if entry.is_directory() || name == MANIFEST_NAME || is_signature_entry_name(name) {
            continue;
        }
        debug!("digesting {}", name);

        let mut digest = Sha1::new();
        let mut stream = entry.data_stream()?;
        let mut buffer = [0u8; 4096];
        loop {
            let count = stream.read(&mut buffer)?;
            if count == 0 {
                break;
            }
            digest.update(&buffer[..count]);
        }
        let encoded = BASE64_STANDARD.encode(digest.finalize());

        let mut attributes = prior
            .as_ref()
            .and_then(|manifest| manifest.entry_attributes(name))
            .map(|attributes| attributes.to_vec())
            .unwrap_or_default();
        match attributes.iter_mut().find(|(key, _)| key == "SHA1-Digest") {
            Some(pair) => pair.1 = encoded,
            None => attributes.push(("SHA1-Digest".to_string(), encoded))
        }
        output.entries.insert(name.to_string(), attributes);
    }
    Ok(output)
}

/// Writes `key: value` folded to the manifest line limit: 72 bytes on the
/// first physical line, then space-led continuations of at most 71 content
/// bytes, each line ending CRLF.
pub(crate) fn write_attribute_line(out: &mut Vec<u8>, key: &str, value: &str) {
    let line = format!("{}: {}", key, value).into_bytes();
    let mut cursor = 0;
    let len = line.len();
    while cursor < len {
        let remaining = len - cursor;
        let limit = if cursor == 0 { 72 } else { 71 };
        let chunk_size = std::cmp::min(remaining, limit);
        if cursor > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(&line[cursor..cursor + chunk_size]);
        out.extend_from_slice(b"\r\n");
        cursor += chunk_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zipsig_zip::{CentralEntry, ZipOutput};

    #[test]
    fn long_lines_fold_and_parse_back() {
        let name = "assets/some/deeply/nested/path/with/a/quite/long/filename-000001.dat";
        let mut out = Vec::new();
        write_attribute_line(&mut out, "Name", name);

        for physical in out.split(|&b| b == b'\n') {
            assert!(physical.len() <= 73, "physical line too long");
        }

        let mut manifest_bytes = Vec::new();
        write_attribute_line(&mut manifest_bytes, "Manifest-Version", "1.0");
        manifest_bytes.extend_from_slice(b"\r\n");
        manifest_bytes.extend_from_slice(&out);
        manifest_bytes.extend_from_slice(b"SHA1-Digest: c2lnbmF0dXJl\r\n\r\n");

        let manifest = Manifest::parse(&manifest_bytes);
        assert_eq!(manifest.entry_names().collect::<Vec<_>>(), [name]);
        assert_eq!(
            manifest.entry_attributes(name).unwrap(),
            [("SHA1-Digest".to_string(), "c2lnbmF0dXJl".to_string())]
        );
    }

    #[test]
    fn rendering_and_parsing_round_trip() {
        let text = b"Manifest-Version: 1.0\r\nCreated-By: 1.0 (Android SignApk)\r\n\r\n\
            Name: a.txt\r\nSHA1-Digest: qZk+NkcGgWq6PiVxeFDCbJzQ2J0=\r\n\r\n\
            Name: b/c.bin\r\nFoo-Attr: keep\r\nSHA1-Digest: AAAA\r\n\r\n";
        let manifest = Manifest::parse(text);
        assert_eq!(manifest.main_attributes().len(), 2);
        assert_eq!(manifest.entry_names().collect::<Vec<_>>(), ["a.txt", "b/c.bin"]);

        let rendered = manifest.to_bytes();
        assert_eq!(rendered, text.to_vec());

        let reparsed = Manifest::parse(&rendered);
        assert_eq!(reparsed.to_bytes(), rendered);
    }

    #[test]
    fn digest_pass_covers_content_and_skips_signature_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.jar");

        let prior = b"Manifest-Version: 1.0\r\nBuilt-By: somebody\r\n\r\n\
            Name: a.txt\r\nFoo-Attr: keep\r\nSHA1-Digest: stale\r\n\r\n";

        let mut output = ZipOutput::create(&path).unwrap();
        let mut manifest_entry = CentralEntry::new("META-INF/MANIFEST.MF");
        manifest_entry.writer().write_all(prior).unwrap();
        output.write(manifest_entry).unwrap();
        let mut a = CentralEntry::new("a.txt");
        a.writer().write_all(b"abc").unwrap();
        output.write(a).unwrap();
        let mut old_sf = CentralEntry::new("META-INF/CERT.SF");
        old_sf.writer().write_all(b"old signature file").unwrap();
        output.write(old_sf).unwrap();
        let mut directory = CentralEntry::new("res/");
        directory.set_compression(0);
        output.write(directory).unwrap();
        let mut b = CentralEntry::new("res/b.bin");
        b.writer().write_all(b"contents of b").unwrap();
        output.write(b).unwrap();
        output.close().unwrap();

        let input = zipsig_zip::ZipInput::open(&path).unwrap();
        let manifest = build_signed_manifest(&input, &CancelToken::new()).unwrap();

        assert_eq!(
            manifest.main_attributes(),
            [
                ("Manifest-Version".to_string(), "1.0".to_string()),
                ("Built-By".to_string(), "somebody".to_string())
            ]
        );
        assert_eq!(manifest.entry_names().collect::<Vec<_>>(), ["a.txt", "res/b.bin"]);

        // sha1("abc"), the classic test vector, base64-encoded.
        assert_eq!(
            manifest.entry_attributes("a.txt").unwrap(),
            [
                ("Foo-Attr".to_string(), "keep".to_string()),
                ("SHA1-Digest".to_string(), "qZk+NkcGgWq6PiVxeFDCbJzQ2J0=".to_string())
            ]
        );

        let expected = BASE64_STANDARD.encode(Sha1::digest(b"contents of b"));
        assert_eq!(
            manifest.entry_attributes("res/b.bin").unwrap(),
            [("SHA1-Digest".to_string(), expected)]
        );
    }

    #[test]
    fn canceled_digest_pass_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.jar");
        let mut output = ZipOutput::create(&path).unwrap();
        let mut entry = CentralEntry::new("a.txt");
        entry.writer().write_all(b"abc").unwrap();
        output.write(entry).unwrap();
        output.close().unwrap();

        let token = CancelToken::new();
        token.cancel();
        let input = zipsig_zip::ZipInput::open(&path).unwrap();
        let manifest = build_signed_manifest(&input, &token).unwrap();
        assert_eq!(manifest.entry_names().count(), 0);
    }
}
