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

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use pkcs8::EncryptedPrivateKeyInfo;
use rasn::Decode;
use rasn_pkix::{Certificate, Time};
use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey, RsaPublicKey};
use zipsig_common::{Result, ZipSigError};

/// Holds the certificate and RSA private key used for signing.
pub struct Keys {
    /// X.509 signing certificate in ASN.1 DER form
    pub certificate: Vec<u8>,
    /// RSA public key
    pub public_key: RsaPublicKey,
    /// RSA private key
    pub private_key: RsaPrivateKey,
    /// Pre-built signature block bytes to prepend to the raw signature in
    /// place of assembling a PKCS#7 structure from scratch. Produced by
    /// signing throwaway content once with the same key and snipping the
    /// signature off the end of the resulting block.
    pub signature_block_template: Option<Vec<u8>>
}

impl Keys {
    /// Parses and creates an instance of [Keys] from a `.pem` file.
    ///
    /// "Combined" in this case means that the one file has both a `BEGIN
    /// CERTIFICATE` and a `BEGIN PRIVATE KEY` section as one long UTF-8 string.
    ///
    /// If you don't have one of these, use
    /// [generate_random_testing_keys](Keys::generate_random_testing_keys).
    pub fn from_combined_pem_string(combined_pem: &str) -> Result<Keys> {
        let pem_map = parse_pem_map_by_tags(combined_pem)?;
        let certificate = pem_map
            .get("CERTIFICATE")
            .ok_or(ZipSigError::MissingKeyMaterial)?
            .clone();

        let priv_key_bytes = pem_map
            .get("PRIVATE KEY")
            .ok_or(ZipSigError::MissingKeyMaterial)?;
        let private_key = RsaPrivateKey::from_pkcs8_der(priv_key_bytes)?;
        let public_key = RsaPublicKey::from(private_key.clone());

        decode_certificate(&certificate)?;
        Ok(Keys {
            public_key,
            private_key,
            certificate,
            signature_block_template: None
        })
    }

    /// Loads a key and certificate from separate files. Either file may be
    /// PEM or raw DER; the key may be a password-protected PKCS#8 blob, in
    /// which case `key_password` must decrypt it.
    pub fn from_files(
        key_path: &Path,
        cert_path: &Path,
        key_password: Option<&str>
    ) -> Result<Keys> {
        let key_bytes = fs::read(key_path)?;
        let key_der = match pem::parse(&key_bytes) {
            Ok(block) => block.into_contents(),
            Err(_) => key_bytes
        };
        let private_key = parse_private_key(&key_der, key_password)?;
        let public_key = RsaPublicKey::from(private_key.clone());

        let cert_bytes = fs::read(cert_path)?;
        let certificate = match pem::parse(&cert_bytes) {
            Ok(block) => block.into_contents(),
            Err(_) => cert_bytes
        };
        decode_certificate(&certificate)?;

        Ok(Keys {
            public_key,
            private_key,
            certificate,
            signature_block_template: None
        })
    }

    /// Randomly generates RSA signing keys and an accompanying certificate.
    ///
    /// This API is only enabled when the optional "cert-gen" feature is
    /// enabled for zipsig-sign (it's on by default). It pulls in a
    /// non-trivial amount of extra dependencies, and it is also very slow,
    /// so it's recommended that you generate keys with OpenSSL and pass them
    /// in to [Keys::from_combined_pem_string] or [Keys::from_files].
    ///
    /// Archives signed with a throwaway key install fine for local testing,
    /// but an update signed with a *different* throwaway key will be
    /// rejected while the old version is still installed.
    #[cfg(feature = "cert-gen")]
    pub fn generate_random_testing_keys() -> Result<Keys> {
        // These dependencies only exist when compiled with cert-gen
        use rand::prelude::*;
        use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};

        log::warn!("randomly generating a placeholder signing key, this is slow");
        log::warn!("    it's recommended to generate your own keys first and pass them in");

        // Randomly generate an RSA private key, derive its public key,
        // and prepare it for passing over to the rcgen library.
        let private_key = RsaPrivateKey::new(&mut thread_rng(), 2048)?;
        let public_key = RsaPublicKey::from(private_key.clone());
        let private_key_pem = private_key.to_pkcs8_pem(LineEnding::LF)?.to_string();

        // Self-sign an X.509 certificate using the random keys
        let key_pair = KeyPair::from_pem(&private_key_pem).unwrap();
        // We sign all testing certificates as our crate name
        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, env!("CARGO_PKG_NAME"));
        let mut cert_params = CertificateParams::new(vec![]).unwrap();
        cert_params.distinguished_name = distinguished_name;
        let cert = cert_params.self_signed(&key_pair).unwrap();

        Ok(Self {
            certificate: cert.der().to_vec(),
            private_key,
            public_key,
            signature_block_template: None
        })
    }

    /// Start of the certificate's validity window.
    pub fn not_before(&self) -> Result<DateTime<Utc>> {
        let cert = decode_certificate(&self.certificate)?;
        Ok(match cert.tbs_certificate.validity.not_before {
            Time::Utc(time) => time,
            Time::General(time) => time.with_timezone(&Utc)
        })
    }
}

/// Decodes an X.509 certificate from DER bytes.
pub(crate) fn decode_certificate(der: &[u8]) -> Result<Certificate> {
    Ok(Certificate::decode(&mut rasn::ber::de::Decoder::new(
        der,
        rasn::ber::de::DecoderOptions::der()
    ))?)
}

/// PKCS#8 private key from DER bytes, trying the password-protected layout
/// first, like the stock Java key loader does.
fn parse_private_key(der: &[u8], password: Option<&str>) -> Result<RsaPrivateKey> {
    if let Ok(encrypted) = EncryptedPrivateKeyInfo::try_from(der) {
        let password = password.ok_or(ZipSigError::KeyDecryptionFailed)?;
        let document = encrypted
            .decrypt(password)
            .map_err(|_| ZipSigError::KeyDecryptionFailed)?;
        return Ok(RsaPrivateKey::from_pkcs8_der(document.as_bytes())?);
    }
    Ok(RsaPrivateKey::from_pkcs8_der(der)?)
}

/// Parses a .pem file and returns a map of Tag -> Contents
fn parse_pem_map_by_tags(combined_pem: &str) -> Result<HashMap<String, Vec<u8>>> {
    let parsed = pem::parse_many(combined_pem)?;
    let mut map = HashMap::new();
    for pem_part in parsed {
        map.insert(pem_part.tag().into(), pem_part.into_contents());
    }
    Ok(map)
}
