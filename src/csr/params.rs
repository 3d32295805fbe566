use std::fmt;

use bon::Builder;
use const_oid::ObjectIdentifier;
use der::{Tag, Tagged};
use der::asn1::{Any, Ia5StringRef, PrintableStringRef, SetOfVec, Utf8StringRef};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use crate::error::{Result, SslToolError};

const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

/// Subject of a certificate signing request.
///
/// Blank fields are left out of the encoded name entirely.
///
/// # Fields
/// * `common_name` - The common name (CN). May be empty when SANs are supplied.
/// * `organization` - The organization (O).
/// * `organizational_unit` - The organizational unit (OU).
/// * `country` - The two-letter country code (C).
/// * `locality` - The locality or city (L).
/// * `province` - The state or province (ST).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct SubjectDescriptor {
    #[builder(default)]
    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub country: Option<String>,
    pub locality: Option<String>,
    pub province: Option<String>,
}

/// The value as given, or `None` when it is missing or only whitespace.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl SubjectDescriptor {
    /// True when the common name has non-whitespace content.
    pub fn has_common_name(&self) -> bool {
        !self.common_name.trim().is_empty()
    }

    /// Converts the descriptor to an X.509 name.
    ///
    /// Attributes appear in C, ST, L, O, OU, CN order, one per RDN. The country is encoded as a
    /// PrintableString; other values use PrintableString when possible and UTF8String otherwise.
    pub fn as_x509_name(&self) -> Result<Name> {
        let common_name = Some(self.common_name.clone());
        let fields = [
            (COUNTRY, &self.country),
            (PROVINCE, &self.province),
            (LOCALITY, &self.locality),
            (ORGANIZATION, &self.organization),
            (ORGANIZATIONAL_UNIT, &self.organizational_unit),
            (COMMON_NAME, &common_name),
        ];

        let mut rdns = Vec::new();
        for (oid, value) in fields {
            let Some(value) = non_blank(value) else {
                continue;
            };
            let value = if oid == COUNTRY {
                let printable = PrintableStringRef::new(value).map_err(|_| {
                    SslToolError::InvalidInput(format!(
                        "country {value:?} is not a printable string"
                    ))
                })?;
                Any::encode_from(&printable)?
            } else {
                match PrintableStringRef::new(value) {
                    Ok(printable) => Any::encode_from(&printable)?,
                    Err(_) => Any::encode_from(&Utf8StringRef::new(value)?)?,
                }
            };
            let atv = AttributeTypeAndValue { oid, value };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `SubjectDescriptor` from an X.509 name.
    ///
    /// Attributes other than the six descriptor fields are ignored; for repeated attributes the
    /// first occurrence wins.
    pub fn from_x509_name(x509dn: &Name) -> Self {
        let mut subject = SubjectDescriptor::default();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Some(text) = attribute_text(&attr.value) else {
                    continue;
                };
                let slot = match attr.oid {
                    COMMON_NAME => {
                        if subject.common_name.is_empty() {
                            subject.common_name = text;
                        }
                        continue;
                    }
                    COUNTRY => &mut subject.country,
                    PROVINCE => &mut subject.province,
                    LOCALITY => &mut subject.locality,
                    ORGANIZATION => &mut subject.organization,
                    ORGANIZATIONAL_UNIT => &mut subject.organizational_unit,
                    _ => continue,
                };
                slot.get_or_insert(text);
            }
        }
        subject
    }
}

fn attribute_text(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String => value.decode_as::<Utf8StringRef<'_>>().ok().map(|s| s.to_string()),
        Tag::PrintableString => value
            .decode_as::<PrintableStringRef<'_>>()
            .ok()
            .map(|s| s.to_string()),
        Tag::Ia5String => value.decode_as::<Ia5StringRef<'_>>().ok().map(|s| s.to_string()),
        _ => None,
    }
}

/// Per-request options for CSR generation.
///
/// # Fields
/// * `encrypt` - Encrypt the emitted private key with `passphrase`.
/// * `passphrase` - Required and non-empty when `encrypt` is set.
#[derive(Clone, Builder, Default)]
pub struct CsrOptions {
    #[builder(default)]
    pub encrypt: bool,
    pub passphrase: Option<String>,
}

impl CsrOptions {
    /// The passphrase to encrypt with, `None` for plaintext output.
    pub(crate) fn encryption_passphrase(&self) -> Result<Option<&str>> {
        if !self.encrypt {
            return Ok(None);
        }
        match self.passphrase.as_deref() {
            Some(passphrase) if !passphrase.is_empty() => Ok(Some(passphrase)),
            _ => Err(SslToolError::KeyEncryptionFailed(
                "encryption requested without a passphrase".to_string(),
            )),
        }
    }
}

impl fmt::Debug for CsrOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrOptions")
            .field("encrypt", &self.encrypt)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// PEM-encoded certificate signing request and the matching private key.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrResult {
    pub csr_pem: String,
    pub private_key_pem: String,
}

impl fmt::Debug for CsrResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrResult")
            .field("csr_pem", &self.csr_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}
