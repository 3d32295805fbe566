use const_oid::AssociatedOid;
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
    oid::ObjectIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::ext::pkix::name::GeneralName;

use crate::error::SslToolError;

/// Trait for converting to and from X.509 extensions.
///
/// This trait provides methods to encode and decode X.509 extension values.
///
/// # Example
/// ```
/// use ssltool::csr::extensions::{SubjectAltName, ToAndFromX509Extension};
/// let san = SubjectAltName { names: vec!["example.com".to_string()] };
/// let encoded = san.to_x509_extension_value().unwrap();
/// let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(san.names, decoded.names);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, SslToolError>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, SslToolError>
    where
        Self: Sized;

    /// Wraps the encoded value in an `Extension` record.
    fn to_extension(&self, critical: bool) -> Result<Extension, SslToolError> {
        Ok(Extension {
            extn_id: Self::OID,
            critical,
            extn_value: OctetString::new(self.to_x509_extension_value()?)?,
        })
    }
}

/// Represents the Subject Alternative Name (SAN) extension, restricted to DNS names.
///
/// # Fields
/// * `names` - DNS names in the order they appear in the extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAltName {
    pub names: Vec<String>,
}

impl SubjectAltName {
    /// Collects the DNS names from the first SAN extension in `extensions`, if any.
    pub fn find_in(extensions: &[Extension]) -> Result<Self, SslToolError> {
        match extensions.iter().find(|ext| ext.extn_id == Self::OID) {
            Some(ext) => Self::from_x509_extension_value(ext.extn_value.as_bytes()),
            None => Ok(Self::default()),
        }
    }
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, SslToolError> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .map(|name| {
                    Ia5String::try_from(name.clone())
                        .map(GeneralName::DnsName)
                        .map_err(|e| SslToolError::InvalidInput(format!("{name:?}: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
        );

        san.to_der()
            .map_err(|e| SslToolError::EncodingError(e.to_string()))
    }

    /// Non-DNS entries (IP addresses, e-mail addresses, URIs) are skipped.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, SslToolError> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let names = san
            .0
            .iter()
            .filter_map(|name| match name {
                GeneralName::DnsName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect();
        Ok(Self { names })
    }
}
