use const_oid::ObjectIdentifier;
use der::asn1::{Any, SetOfVec};
use der::{Decode, Encode};
use pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use rsa::signature::Verifier;
use sha2::Sha256;
use x509_cert::attr::{Attribute, Attributes};
use x509_cert::ext::Extension;
use x509_cert::request::{CertReq, CertReqInfo, Version};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use super::extensions::{SubjectAltName, ToAndFromX509Extension};
use super::params::SubjectDescriptor;
use crate::error::{Result, SslToolError};
use crate::key::{PublicKeyAlgorithm, SignatureAlgorithm};
use crate::pem_utils::pem_to_der;

/// PKCS#9 `extensionRequest` attribute.
const EXTENSION_REQUEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");

/// The unsigned body of a certification request.
///
/// # Fields
/// * `subject` - The requested subject.
/// * `dns_names` - DNS names requested through the SAN extension.
/// * `public_key` - The public key being certified.
pub struct RequestInfo {
    pub subject: SubjectDescriptor,
    pub dns_names: Vec<String>,
    pub public_key: SubjectPublicKeyInfoOwned,
}

impl RequestInfo {
    /// Converts the `RequestInfo` into a `CertReqInfo` for DER encoding.
    ///
    /// DNS names travel in a non-critical SAN extension inside an `extensionRequest` attribute;
    /// when there are none the attribute set is left empty.
    pub fn to_cert_req_info(&self) -> Result<CertReqInfo> {
        let mut attributes = Vec::new();
        if !self.dns_names.is_empty() {
            let san = SubjectAltName {
                names: self.dns_names.clone(),
            };
            let extensions: Vec<Extension> = vec![san.to_extension(false)?];
            attributes.push(Attribute {
                oid: EXTENSION_REQUEST,
                values: SetOfVec::try_from(vec![Any::encode_from(&extensions)?])?,
            });
        }

        Ok(CertReqInfo {
            version: Version::V1,
            subject: self.subject.as_x509_name()?,
            public_key: self.public_key.clone(),
            attributes: Attributes::try_from(attributes)?,
        })
    }
}

/// A decoded certificate signing request.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub subject: SubjectDescriptor,
    pub dns_names: Vec<String>,
    pub public_key_algorithm: PublicKeyAlgorithm,
    inner: CertReq,
}

impl CertificateRequest {
    /// Decodes a DER-encoded request.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der)?;
        let subject = SubjectDescriptor::from_x509_name(&inner.info.subject);
        let dns_names = requested_dns_names(&inner.info.attributes)?;
        let public_key_algorithm =
            PublicKeyAlgorithm::from_oid(inner.info.public_key.algorithm.oid);
        Ok(Self {
            subject,
            dns_names,
            public_key_algorithm,
            inner,
        })
    }

    /// Decodes a `CERTIFICATE REQUEST` PEM block.
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let der = pem_to_der(pem_str, &["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"])?;
        Self::from_der(&der)
    }

    /// The signature algorithm the request claims.
    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_oid(self.inner.algorithm.oid)
    }

    /// Re-encodes the request as DER.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| SslToolError::EncodingError(e.to_string()))
    }

    /// The DER-encoded `SubjectPublicKeyInfo` carried in the request.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.inner
            .info
            .public_key
            .to_der()
            .map_err(|e| SslToolError::EncodingError(e.to_string()))
    }

    /// Checks the request's self-signature against the public key it carries.
    pub fn verify_signature(&self) -> Result<()> {
        let message = self
            .inner
            .info
            .to_der()
            .map_err(|e| SslToolError::EncodingError(e.to_string()))?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            SslToolError::DecodingError("signature bit string has unused bits".to_string())
        })?;
        let public_key = self.public_key_der()?;

        let key_error = |e: pkcs8::spki::Error| SslToolError::DecodingError(e.to_string());
        let invalid = |e: rsa::signature::Error| {
            SslToolError::InvalidInput(format!("signature verification failed: {e}"))
        };
        match self.signature_algorithm()? {
            SignatureAlgorithm::Sha256WithRSA => {
                let key = RsaPublicKey::from_public_key_der(&public_key).map_err(key_error)?;
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key);
                let signature = rsa::pkcs1v15::Signature::try_from(signature).map_err(invalid)?;
                verifying_key.verify(&message, &signature).map_err(invalid)
            }
            SignatureAlgorithm::Sha256WithECDSA => {
                let verifying_key =
                    p256::ecdsa::VerifyingKey::from_public_key_der(&public_key).map_err(key_error)?;
                let signature = p256::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key.verify(&message, &signature).map_err(invalid)
            }
            SignatureAlgorithm::Sha384WithECDSA => {
                let verifying_key =
                    p384::ecdsa::VerifyingKey::from_public_key_der(&public_key).map_err(key_error)?;
                let signature = p384::ecdsa::Signature::from_der(signature).map_err(invalid)?;
                verifying_key.verify(&message, &signature).map_err(invalid)
            }
            SignatureAlgorithm::Ed25519 => {
                let verifying_key = ed25519_dalek::VerifyingKey::from_public_key_der(&public_key)
                    .map_err(key_error)?;
                let signature = ed25519_dalek::Signature::from_slice(signature).map_err(invalid)?;
                verifying_key.verify(&message, &signature).map_err(invalid)
            }
        }
    }
}

/// DNS names from every SAN extension found in the `extensionRequest` attributes.
fn requested_dns_names(attributes: &Attributes) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for attribute in attributes.iter().filter(|attr| attr.oid == EXTENSION_REQUEST) {
        for value in attribute.values.iter() {
            let extensions = Vec::<Extension>::from_der(&value.to_der()?)?;
            names.extend(SubjectAltName::find_in(&extensions)?.names);
        }
    }
    Ok(names)
}
