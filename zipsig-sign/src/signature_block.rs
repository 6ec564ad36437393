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

use rasn::types::Integer::Primitive;
use rasn::types::Oid;
use rasn::Encode;
use rasn_cms::algorithms::RSA;
use rasn_cms::ContentInfo;
use rasn_cms::{
    pkcs7_compat::SignedData, CertificateChoices, IssuerAndSerialNumber, SignerIdentifier,
    SignerInfo
};
use rsa::Pkcs1v15Sign;
use sha1::{Digest, Sha1};
use zipsig_common::Result;

use crate::crypto_keys::{decode_certificate, Keys};

const OID_SHA1: &Oid = Oid::ISO_IDENTIFIED_ORGANISATION_OIW_SECSIG_ALGORITHM_SHA1;
const OID_PKCS7_DATA: &Oid = Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_DATA;
const OID_PKCS7_SIGNED_DATA: &Oid = Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_SIGNED_DATA;

/// PKCS#1 v1.5 signature over the SHA-1 of the signature file. The verifier
/// on the other end decrypts with a fixed algorithm/mode/padding, which this
/// construction matches exactly.
pub fn sign_signature_file(sf_bytes: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    let digest = Sha1::digest(sf_bytes);
    let padding = Pkcs1v15Sign::new::<Sha1>();
    Ok(keys.private_key.sign(padding, &digest)?)
}

/// The `.RSA` entry's bytes. With a template, the block is the template
/// followed by the raw signature; otherwise a PKCS#7 SignedData structure
/// is assembled from scratch around the certificate and signature.
pub fn build_signature_block(sf_bytes: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    let signature = sign_signature_file(sf_bytes, keys)?;
    match &keys.signature_block_template {
        Some(template) => {
            let mut block = template.clone();
            block.extend_from_slice(&signature);
            Ok(block)
        }
        None => assemble_pkcs7(&signature, keys)
    }
}

fn assemble_pkcs7(signature: &[u8], keys: &Keys) -> Result<Vec<u8>> {
    let cert = decode_certificate(&keys.certificate)?;

    let signer_info = SignerInfo {
        version: Primitive(1),
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone()
        }),
        digest_algorithm: rasn_cms::AlgorithmIdentifier {
            algorithm: OID_SHA1.into(),
            parameters: None
        },
        signed_attrs: None,
        signature_algorithm: rasn_cms::AlgorithmIdentifier {
            algorithm: RSA.into(),
            parameters: None
        },
        signature: signature.to_vec().into(),
        unsigned_attrs: None
    };

    let signed_data = SignedData {
        version: Primitive(1),
        digest_algorithms: vec![rasn_cms::AlgorithmIdentifier {
            algorithm: OID_SHA1.into(),
            parameters: None
        }]
        .into(),
        encap_content_info: rasn_cms::pkcs7_compat::EncapsulatedContentInfo {
            content_type: OID_PKCS7_DATA.into(),
            content: None
        },
        certificates: Some(vec![CertificateChoices::Certificate(Box::new(cert))].into()),
        crls: None,
        signer_infos: vec![signer_info].into()
    };

    let mut inner_encoder = rasn::der::enc::Encoder::new(rasn::der::enc::EncoderOptions::der());
    signed_data.encode(&mut inner_encoder)?;
    let inner_vec = inner_encoder.output();

    let wrapper = ContentInfo {
        content_type: OID_PKCS7_SIGNED_DATA.into(),
        content: rasn::types::Any::new(inner_vec)
    };

    let mut outer_encoder = rasn::der::enc::Encoder::new(rasn::der::enc::EncoderOptions::der());
    wrapper.encode(&mut outer_encoder)?;

    Ok(outer_encoder.output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::{RsaPrivateKey, RsaPublicKey};

    // Certificate stays empty: these tests exercise the raw signature and
    // template paths, neither of which decodes it.
    fn bare_keys() -> Keys {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 512).unwrap();
        Keys {
            certificate: Vec::new(),
            public_key: RsaPublicKey::from(private_key.clone()),
            private_key,
            signature_block_template: None
        }
    }

    #[test]
    fn signatures_verify_against_the_public_key() {
        let keys = bare_keys();
        let sf_bytes = b"Signature-Version: 1.0\r\n\r\n";
        let signature = sign_signature_file(sf_bytes, &keys).unwrap();

        let padding = Pkcs1v15Sign::new::<Sha1>();
        keys.public_key
            .verify(padding, &Sha1::digest(sf_bytes), &signature)
            .unwrap();
    }

    #[test]
    fn signing_the_same_bytes_twice_is_deterministic() {
        let keys = bare_keys();
        let sf_bytes = b"Signature-Version: 1.0\r\n\r\n";
        assert_eq!(
            sign_signature_file(sf_bytes, &keys).unwrap(),
            sign_signature_file(sf_bytes, &keys).unwrap()
        );
    }

    #[test]
    fn template_blocks_are_template_then_signature() {
        let mut keys = bare_keys();
        keys.signature_block_template = Some(b"TEMPLATE-BYTES".to_vec());
        let sf_bytes = b"Signature-Version: 1.0\r\n\r\n";

        let block = build_signature_block(sf_bytes, &keys).unwrap();
        let signature = sign_signature_file(sf_bytes, &keys).unwrap();
        assert_eq!(&block[..14], b"TEMPLATE-BYTES");
        assert_eq!(&block[14..], &signature[..]);
    }
}
