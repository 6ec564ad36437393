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

use std::{io, rc::Rc};

use rsa::pkcs8;

/// Common error type making it easier to share `Result`s between zipsig crates.
///
/// In general designed to avoid needing utilities like `map_err`.
#[derive(Debug, Clone)]
pub enum ZipSigError {
    /// zipsig-cli encountered an error while processing something specific to
    /// the command line implementation. For example, a private key was given
    /// without its certificate.
    Cli(String),
    /// A zip entry header carried general purpose bits other than 0x0000
    /// (plain) or 0x0008 (sizes in a trailing data descriptor). Encrypted and
    /// otherwise exotic entries are not handled.
    UnsupportedGeneralPurposeBits(u16),
    /// A central directory record named an entry for which no local file
    /// header was read. The archive's two sections disagree and it cannot be
    /// rewritten faithfully.
    MissingLocalEntry(String),
    /// The archive ended without an end-of-central-directory record where one
    /// was expected.
    MissingEndOfCentralDirectory,
    /// An entry was asked to produce its payload but holds neither a buffer
    /// nor a readable source. Entries parsed from an archive always have a
    /// source; fresh entries always have a buffer.
    EntrySourceMissing(String),
    /// Signing was invoked with the same path for input and output. The input
    /// must remain readable while the output is produced, so this is rejected
    /// before either file is opened.
    InputOutputPathsEqual(String),
    /// An error occurred while parsing key material from a `.pem` string.
    PemParsingFailed(Rc<pem::PemError>),
    /// The `.pem` content was valid, but it was missing either a certificate
    /// or a private key.
    MissingKeyMaterial,
    /// The private key bytes were present but could not be parsed as a
    /// PKCS#8 RSA private key.
    RsaKeyParsingFailed(pkcs8::Error),
    /// An encrypted PKCS#8 private key could not be decrypted. Usually a bad
    /// password; callers may re-prompt and retry.
    KeyDecryptionFailed,
    /// An error occurred while signing a digest, see [rsa::Error].
    RsaSigningFailed(Rc<rsa::Error>),
    /// The signing certificate couldn't be decoded from its DER bytes.
    CertificateDecodingFailed(Rc<rasn::error::DecodeError>),
    /// The PKCS#7 signature block couldn't be serialised.
    Pkcs7EncodingFailed(Rc<rasn::error::EncodeError>),
    /// An error occurred while reading or writing an archive. One of the file
    /// paths passed in may be invalid, the disk may be full, or an archive
    /// was truncated mid-record.
    FileIoError(Rc<io::Error>)
}

/// Result type where the error is always [ZipSigError].
pub type Result<T> = std::result::Result<T, ZipSigError>;

// Automatic conversion from other types of error to ZipSigError makes the rest of the code cleaner
impl From<io::Error> for ZipSigError {
    fn from(value: io::Error) -> Self {
        ZipSigError::FileIoError(value.into())
    }
}

impl From<pem::PemError> for ZipSigError {
    fn from(value: pem::PemError) -> Self {
        ZipSigError::PemParsingFailed(value.into())
    }
}

impl From<pkcs8::Error> for ZipSigError {
    fn from(value: pkcs8::Error) -> Self {
        ZipSigError::RsaKeyParsingFailed(value)
    }
}

impl From<rsa::Error> for ZipSigError {
    fn from(value: rsa::Error) -> Self {
        ZipSigError::RsaSigningFailed(value.into())
    }
}

impl From<rasn::error::DecodeError> for ZipSigError {
    fn from(value: rasn::error::DecodeError) -> Self {
        ZipSigError::CertificateDecodingFailed(value.into())
    }
}

impl From<rasn::error::EncodeError> for ZipSigError {
    fn from(value: rasn::error::EncodeError) -> Self {
        ZipSigError::Pkcs7EncodingFailed(value.into())
    }
}
