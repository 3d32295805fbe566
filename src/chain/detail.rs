use std::fmt;

use der::Decode;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use x509_cert::Certificate;
use x509_cert::serial_number::SerialNumber;

pub use crate::key::PublicKeyAlgorithm;

use crate::csr::extensions::SubjectAltName;
use crate::error::{Result, SslToolError};
use crate::pem_utils::{der_to_pem, pem_to_der};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Details of one certificate from a peer chain.
///
/// # Fields
/// * `not_before` / `not_after` - The validity window, in UTC.
/// * `issuer` / `subject` - Distinguished names rendered in RFC 4514 form.
/// * `dns_names` - DNS names from the SAN extension, in certificate order.
/// * `serial_number` - The serial number as encoded by the issuer.
/// * `public_key_algorithm` - The algorithm of the certified key.
/// * `raw_bytes` - The DER encoding the details were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetail {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub issuer: String,
    pub subject: String,
    pub dns_names: Vec<String>,
    pub serial_number: SerialNumber,
    pub public_key_algorithm: PublicKeyAlgorithm,
    pub raw_bytes: Vec<u8>,
}

impl CertificateDetail {
    /// Parses a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let certificate = Certificate::from_der(der)?;
        let tbs = &certificate.tbs_certificate;
        let extensions = tbs.extensions.as_deref().unwrap_or_default();

        Ok(Self {
            not_before: OffsetDateTime::from(tbs.validity.not_before.to_system_time()),
            not_after: OffsetDateTime::from(tbs.validity.not_after.to_system_time()),
            issuer: tbs.issuer.to_string(),
            subject: tbs.subject.to_string(),
            dns_names: SubjectAltName::find_in(extensions)?.names,
            serial_number: tbs.serial_number.clone(),
            public_key_algorithm: PublicKeyAlgorithm::from_oid(
                tbs.subject_public_key_info.algorithm.oid,
            ),
            raw_bytes: der.to_vec(),
        })
    }

    /// Parses the first `CERTIFICATE` block of a PEM string.
    pub fn from_pem(pem_str: &str) -> Result<Self> {
        let der = pem_to_der(pem_str, &[CERTIFICATE_LABEL])?;
        Self::from_der(&der)
    }

    /// Encodes the certificate as PEM. Shorthand for [`encode_to_pem`].
    pub fn to_pem(&self) -> Result<String> {
        encode_to_pem(self)
    }

    /// The serial number as lowercase hex without leading zeros.
    pub fn serial_hex(&self) -> String {
        let hex: String = self
            .serial_number
            .as_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        match hex.trim_start_matches('0') {
            "" => "0".to_string(),
            trimmed => trimmed.to_string(),
        }
    }

    /// SHA-256 digest of the DER encoding, as colon-separated uppercase hex.
    pub fn fingerprint_sha256(&self) -> String {
        fingerprint(&Sha256::digest(&self.raw_bytes))
    }

    /// SHA-1 digest of the DER encoding, as colon-separated uppercase hex.
    pub fn fingerprint_sha1(&self) -> String {
        fingerprint(&Sha1::digest(&self.raw_bytes))
    }

    /// True when `at` falls inside the validity window.
    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

fn fingerprint(digest: &[u8]) -> String {
    digest
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

impl fmt::Display for CertificateDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not_after = self.not_after.format(&Rfc3339).map_err(|_| fmt::Error)?;
        let not_before = self.not_before.format(&Rfc3339).map_err(|_| fmt::Error)?;
        writeln!(f, "Issuer: {}", self.issuer)?;
        writeln!(f, "  Expiration Date: {not_after}")?;
        writeln!(f, "  Issue Date: {not_before}")?;
        writeln!(f, "  Serial: {}", self.serial_hex())?;
        if !self.dns_names.is_empty() {
            writeln!(f, "  DNS Names:")?;
            for name in &self.dns_names {
                writeln!(f, "  - {name}")?;
            }
        }
        Ok(())
    }
}

/// Encodes the raw certificate bytes of `detail` as a `CERTIFICATE` PEM block.
///
/// Fails with [`SslToolError::UnsupportedAlgorithm`] when the certified key is not RSA, ECDSA or
/// Ed25519.
pub fn encode_to_pem(detail: &CertificateDetail) -> Result<String> {
    let label = match detail.public_key_algorithm {
        PublicKeyAlgorithm::Rsa | PublicKeyAlgorithm::Ecdsa | PublicKeyAlgorithm::Ed25519 => {
            CERTIFICATE_LABEL
        }
        PublicKeyAlgorithm::Other(oid) => {
            return Err(SslToolError::UnsupportedAlgorithm(oid.to_string()));
        }
    };
    Ok(der_to_pem(&detail.raw_bytes, label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, KeyPair, SerialNumber as RcgenSerial};

    fn self_signed(names: &[&str]) -> CertificateDetail {
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let names = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let mut params = CertificateParams::new(names).unwrap();
        params.serial_number = Some(RcgenSerial::from_slice(&[0x0a, 0xbc]));
        params.not_before = rcgen::date_time_ymd(2024, 1, 1);
        params.not_after = rcgen::date_time_ymd(2034, 1, 1);
        let cert = params.self_signed(&key).unwrap();
        CertificateDetail::from_der(cert.der()).unwrap()
    }

    #[test]
    fn test_detail_fields() {
        let detail = self_signed(&["example.com", "www.example.com"]);
        assert_eq!(detail.dns_names, vec!["example.com", "www.example.com"]);
        assert_eq!(detail.public_key_algorithm, PublicKeyAlgorithm::Ecdsa);
        assert_eq!(detail.serial_hex(), "abc");
        assert_eq!(detail.not_before.year(), 2024);
        assert_eq!(detail.not_after.year(), 2034);
        assert!(detail.is_valid_at(OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()));
    }

    #[test]
    fn test_pem_round_trip() {
        let detail = self_signed(&["example.com"]);
        let pem = encode_to_pem(&detail).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert_eq!(CertificateDetail::from_pem(&pem).unwrap(), detail);
    }

    #[test]
    fn test_unknown_key_algorithm_is_rejected() {
        let mut detail = self_signed(&["example.com"]);
        detail.public_key_algorithm =
            PublicKeyAlgorithm::Other(const_oid::ObjectIdentifier::new_unwrap("1.2.3.4"));
        assert!(matches!(
            encode_to_pem(&detail),
            Err(SslToolError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_display_layout() {
        let detail = self_signed(&["example.com"]);
        let rendered = detail.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines[0].starts_with("Issuer: "));
        assert_eq!(lines[1], "  Expiration Date: 2034-01-01T00:00:00Z");
        assert_eq!(lines[2], "  Issue Date: 2024-01-01T00:00:00Z");
        assert_eq!(lines[3], "  Serial: abc");
        assert_eq!(lines[4], "  DNS Names:");
        assert_eq!(lines[5], "  - example.com");
    }

    #[test]
    fn test_fingerprints() {
        let detail = self_signed(&["example.com"]);
        assert_eq!(detail.fingerprint_sha256().split(':').count(), 32);
        assert_eq!(detail.fingerprint_sha1().split(':').count(), 20);
    }
}
