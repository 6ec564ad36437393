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

use base64::{prelude::BASE64_STANDARD, Engine};
use sha1::{Digest, Sha1};

use crate::manifest::{write_attribute_line, Manifest};

/// Renders the `.SF` signature file for a manifest: a digest of the whole
/// rendered manifest, then per entry a digest of that entry's manifest
/// stanza bytes. This is the content that actually gets signed.
pub fn generate_signature_file(manifest: &Manifest) -> Vec<u8> {
    let mut out = Vec::new();
    write_attribute_line(&mut out, "Signature-Version", "1.0");
    write_attribute_line(&mut out, "Created-By", "1.0 (Android SignApk)");
    let manifest_digest = BASE64_STANDARD.encode(Sha1::digest(manifest.to_bytes()));
    write_attribute_line(&mut out, "SHA1-Digest-Manifest", &manifest_digest);
    out.extend_from_slice(b"\r\n");

    for name in manifest.entry_names() {
        if let Some(stanza) = manifest.entry_stanza_bytes(name) {
            let digest = BASE64_STANDARD.encode(Sha1::digest(&stanza));
            write_attribute_line(&mut out, "Name", name);
            write_attribute_line(&mut out, "SHA1-Digest", &digest);
            out.extend_from_slice(b"\r\n");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_file_digests_check_out() {
        let manifest = Manifest::parse(
            b"Manifest-Version: 1.0\r\n\r\n\
            Name: a.txt\r\nSHA1-Digest: qZk+NkcGgWq6PiVxeFDCbJzQ2J0=\r\n\r\n\
            Name: lib/code.so\r\nSHA1-Digest: AAAA\r\n\r\n"
        );

        let sf_bytes = generate_signature_file(&manifest);
        // The signature file itself is in manifest format.
        let sf = Manifest::parse(&sf_bytes);

        let expected_manifest_digest = BASE64_STANDARD.encode(Sha1::digest(manifest.to_bytes()));
        assert_eq!(
            sf.main_attributes(),
            [
                ("Signature-Version".to_string(), "1.0".to_string()),
                ("Created-By".to_string(), "1.0 (Android SignApk)".to_string()),
                ("SHA1-Digest-Manifest".to_string(), expected_manifest_digest)
            ]
        );

        assert_eq!(sf.entry_names().collect::<Vec<_>>(), ["a.txt", "lib/code.so"]);
        for name in ["a.txt", "lib/code.so"] {
            let stanza = manifest.entry_stanza_bytes(name).unwrap();
            let expected = BASE64_STANDARD.encode(Sha1::digest(&stanza));
            assert_eq!(
                sf.entry_attributes(name).unwrap(),
                [("SHA1-Digest".to_string(), expected)]
            );
        }
    }
}
