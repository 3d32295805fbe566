use std::fmt;
use std::str::FromStr;

use der::{Decode, Encode};
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rand_core::CryptoRngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sec1::{EcParameters, EcPrivateKey};
use sha2::Sha256;
use tracing::{debug, warn};
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::error::{Result, SslToolError};
use crate::pem_utils::{der_to_pem, parse_block};

/// Smallest RSA modulus accepted for newly generated keys.
pub const MIN_RSA_BITS: usize = 2048;

/// RSA modulus size used when the caller does not pick one.
pub const DEFAULT_RSA_BITS: usize = 2048;

const PBKDF2_ITERATIONS: u32 = 100_000;

const ENCRYPTED_PRIVATE_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Named curves supported for ECDSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcdsaCurve {
    P256,
    P384,
}

/// Key generation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// RSA with the given modulus size in bits.
    Rsa { bits: usize },
    /// ECDSA on the given curve.
    Ecdsa(EcdsaCurve),
    /// Ed25519.
    Ed25519,
}

impl FromStr for KeyAlgorithm {
    type Err = SslToolError;

    /// Parses the `rsa`, `ecdsa` and `ed25519` selectors (case-insensitive).
    ///
    /// `ecdsa` selects P-256; `ecdsa-p384` selects P-384.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rsa" => Ok(KeyAlgorithm::Rsa {
                bits: DEFAULT_RSA_BITS,
            }),
            "ecdsa" | "ecdsa-p256" => Ok(KeyAlgorithm::Ecdsa(EcdsaCurve::P256)),
            "ecdsa-p384" => Ok(KeyAlgorithm::Ecdsa(EcdsaCurve::P384)),
            "ed25519" => Ok(KeyAlgorithm::Ed25519),
            other => Err(SslToolError::UnsupportedKeyType(other.to_string())),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "RSA-{bits}"),
            KeyAlgorithm::Ecdsa(EcdsaCurve::P256) => f.write_str("ECDSA-P256"),
            KeyAlgorithm::Ecdsa(EcdsaCurve::P384) => f.write_str("ECDSA-P384"),
            KeyAlgorithm::Ed25519 => f.write_str("Ed25519"),
        }
    }
}

/// Represents the supported signature algorithms for certification requests.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
    /// Pure Ed25519.
    Ed25519,
}

impl SignatureAlgorithm {
    /// Builds the `AlgorithmIdentifier` placed in the signed structure.
    ///
    /// RSA identifiers carry an explicit NULL parameter; ECDSA and Ed25519 carry none.
    pub fn identifier(self) -> Result<AlgorithmIdentifierOwned> {
        let (oid, parameters) = match self {
            SignatureAlgorithm::Sha256WithRSA => (
                const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                Some(der::Any::encode_from(&der::asn1::Null)?),
            ),
            SignatureAlgorithm::Sha256WithECDSA => {
                (const_oid::db::rfc5912::ECDSA_WITH_SHA_256, None)
            }
            SignatureAlgorithm::Sha384WithECDSA => {
                (const_oid::db::rfc5912::ECDSA_WITH_SHA_384, None)
            }
            SignatureAlgorithm::Ed25519 => (const_oid::db::rfc8410::ID_ED_25519, None),
        };
        Ok(AlgorithmIdentifierOwned { oid, parameters })
    }

    /// Determines the signature algorithm from its OID.
    pub fn from_oid(oid: const_oid::ObjectIdentifier) -> Result<Self> {
        match oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => {
                Ok(SignatureAlgorithm::Sha256WithRSA)
            }
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(SignatureAlgorithm::Sha256WithECDSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_384 => Ok(SignatureAlgorithm::Sha384WithECDSA),
            const_oid::db::rfc8410::ID_ED_25519 => Ok(SignatureAlgorithm::Ed25519),
            other => Err(SslToolError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Public key algorithm tag of a certificate or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyAlgorithm {
    Rsa,
    Ecdsa,
    Ed25519,
    /// Any other algorithm, identified by its OID.
    Other(const_oid::ObjectIdentifier),
}

impl PublicKeyAlgorithm {
    /// Classifies a `SubjectPublicKeyInfo` algorithm OID.
    pub fn from_oid(oid: const_oid::ObjectIdentifier) -> Self {
        match oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => PublicKeyAlgorithm::Rsa,
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => PublicKeyAlgorithm::Ecdsa,
            const_oid::db::rfc8410::ID_ED_25519 => PublicKeyAlgorithm::Ed25519,
            other => PublicKeyAlgorithm::Other(other),
        }
    }
}

impl fmt::Display for PublicKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKeyAlgorithm::Rsa => f.write_str("RSA"),
            PublicKeyAlgorithm::Ecdsa => f.write_str("ECDSA"),
            PublicKeyAlgorithm::Ed25519 => f.write_str("Ed25519"),
            PublicKeyAlgorithm::Other(oid) => write!(f, "{oid}"),
        }
    }
}

/// Private key material for one of the supported algorithms.
///
/// Each variant knows how to describe its public half, sign a message, and serialize itself.
#[derive(Clone)]
pub enum KeyMaterial {
    Rsa(Box<RsaPrivateKey>),
    EcdsaP256(p256::SecretKey),
    EcdsaP384(p384::SecretKey),
    Ed25519(Ed25519SigningKey),
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyMaterial").field(&self.algorithm()).finish()
    }
}

impl KeyMaterial {
    /// Generate a fresh key for `algorithm`, drawing randomness from `rng`.
    ///
    /// RSA moduli below [`MIN_RSA_BITS`] are rejected before any work is done.
    pub fn generate<R: CryptoRngCore>(algorithm: KeyAlgorithm, rng: &mut R) -> Result<Self> {
        debug!(%algorithm, "generating private key");
        match algorithm {
            KeyAlgorithm::Rsa { bits } => {
                if bits < MIN_RSA_BITS {
                    return Err(SslToolError::KeyGenerationFailed(format!(
                        "RSA keys must be at least {MIN_RSA_BITS} bits, got {bits}"
                    )));
                }
                let private = RsaPrivateKey::new(rng, bits)
                    .map_err(|e| SslToolError::KeyGenerationFailed(e.to_string()))?;
                Ok(KeyMaterial::Rsa(Box::new(private)))
            }
            KeyAlgorithm::Ecdsa(EcdsaCurve::P256) => {
                Ok(KeyMaterial::EcdsaP256(p256::SecretKey::random(rng)))
            }
            KeyAlgorithm::Ecdsa(EcdsaCurve::P384) => {
                Ok(KeyMaterial::EcdsaP384(p384::SecretKey::random(rng)))
            }
            KeyAlgorithm::Ed25519 => Ok(KeyMaterial::Ed25519(Ed25519SigningKey::generate(rng))),
        }
    }

    /// The algorithm (and size or curve) of this key.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyMaterial::Rsa(private) => KeyAlgorithm::Rsa {
                bits: private.size() * 8,
            },
            KeyMaterial::EcdsaP256(_) => KeyAlgorithm::Ecdsa(EcdsaCurve::P256),
            KeyMaterial::EcdsaP384(_) => KeyAlgorithm::Ecdsa(EcdsaCurve::P384),
            KeyMaterial::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    /// The signature scheme used when this key signs a request.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyMaterial::Rsa(_) => SignatureAlgorithm::Sha256WithRSA,
            KeyMaterial::EcdsaP256(_) => SignatureAlgorithm::Sha256WithECDSA,
            KeyMaterial::EcdsaP384(_) => SignatureAlgorithm::Sha384WithECDSA,
            KeyMaterial::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// The public half of the key as a `SubjectPublicKeyInfo`.
    pub fn public_key_info(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let encoding_error = |e: x509_cert::spki::Error| SslToolError::EncodingError(e.to_string());
        match self {
            KeyMaterial::Rsa(private) => {
                SubjectPublicKeyInfoOwned::from_key(RsaPublicKey::from(private.as_ref()))
                    .map_err(encoding_error)
            }
            KeyMaterial::EcdsaP256(secret) => {
                SubjectPublicKeyInfoOwned::from_key(secret.public_key()).map_err(encoding_error)
            }
            KeyMaterial::EcdsaP384(secret) => {
                SubjectPublicKeyInfoOwned::from_key(secret.public_key()).map_err(encoding_error)
            }
            KeyMaterial::Ed25519(signing_key) => {
                let pk_bytes = signing_key.verifying_key().to_bytes();
                Ok(SubjectPublicKeyInfoOwned {
                    algorithm: AlgorithmIdentifierOwned {
                        oid: const_oid::db::rfc8410::ID_ED_25519,
                        parameters: None,
                    },
                    subject_public_key: der::asn1::BitString::from_bytes(&pk_bytes)?,
                })
            }
        }
    }

    /// Signs `data` with the scheme from [`KeyMaterial::signature_algorithm`].
    ///
    /// ECDSA signatures are returned DER-encoded, as X.509 structures carry them.
    pub fn sign<R: CryptoRngCore>(&self, data: &[u8], rng: &mut R) -> Result<Vec<u8>> {
        let signing_error = |e: rsa::signature::Error| SslToolError::SigningFailed(e.to_string());
        match self {
            KeyMaterial::Rsa(private) => {
                let signing_key =
                    rsa::pkcs1v15::SigningKey::<Sha256>::new(private.as_ref().clone());
                let signature = signing_key.try_sign_with_rng(rng, data).map_err(signing_error)?;
                Ok(signature.to_vec())
            }
            KeyMaterial::EcdsaP256(secret) => {
                let signing_key = p256::ecdsa::SigningKey::from(secret);
                let signature: p256::ecdsa::Signature =
                    signing_key.try_sign_with_rng(rng, data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyMaterial::EcdsaP384(secret) => {
                let signing_key = p384::ecdsa::SigningKey::from(secret);
                let signature: p384::ecdsa::Signature =
                    signing_key.try_sign_with_rng(rng, data).map_err(signing_error)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyMaterial::Ed25519(signing_key) => {
                let signature = signing_key.try_sign(data).map_err(signing_error)?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    /// Serializes the private key in its algorithm's customary format.
    ///
    /// | Key | Encoding | PEM type |
    /// |---|---|---|
    /// | RSA | PKCS#1 | `RSA PRIVATE KEY` |
    /// | ECDSA | SEC1 | `EC PRIVATE KEY` |
    /// | Ed25519 | PKCS#8 | `PRIVATE KEY` |
    pub fn to_pem(&self) -> Result<String> {
        match self {
            KeyMaterial::Rsa(private) => {
                let document = private
                    .to_pkcs1_der()
                    .map_err(|e| SslToolError::EncodingError(e.to_string()))?;
                Ok(der_to_pem(document.as_bytes(), "RSA PRIVATE KEY"))
            }
            KeyMaterial::EcdsaP256(secret) => {
                let der = encode_sec1(
                    &secret.to_bytes(),
                    secret.public_key().to_encoded_point(false).as_bytes(),
                    const_oid::db::rfc5912::SECP_256_R_1,
                )?;
                Ok(der_to_pem(&der, "EC PRIVATE KEY"))
            }
            KeyMaterial::EcdsaP384(secret) => {
                let der = encode_sec1(
                    &secret.to_bytes(),
                    secret.public_key().to_encoded_point(false).as_bytes(),
                    const_oid::db::rfc5912::SECP_384_R_1,
                )?;
                Ok(der_to_pem(&der, "EC PRIVATE KEY"))
            }
            KeyMaterial::Ed25519(_) => self.to_pkcs8_pem(),
        }
    }

    /// Serializes the private key as an unencrypted PKCS#8 `PRIVATE KEY` block.
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let document = self.to_pkcs8_der()?;
        Ok(der_to_pem(document.as_bytes(), "PRIVATE KEY"))
    }

    /// Serializes the private key as a PKCS#8 `ENCRYPTED PRIVATE KEY` block.
    ///
    /// The key is wrapped with PBES2 (PBKDF2-HMAC-SHA256, AES-256-CBC); salt and IV come from
    /// `rng`.
    /// Any failure is reported as [`SslToolError::KeyEncryptionFailed`].
    pub fn to_encrypted_pem<R: CryptoRngCore>(
        &self,
        passphrase: &str,
        rng: &mut R,
    ) -> Result<String> {
        let encryption_error =
            |e: &dyn fmt::Display| SslToolError::KeyEncryptionFailed(e.to_string());
        if passphrase.is_empty() {
            return Err(SslToolError::KeyEncryptionFailed(
                "passphrase must not be empty".to_string(),
            ));
        }

        let document = self.to_pkcs8_der().map_err(|e| encryption_error(&e))?;
        let info = PrivateKeyInfo::try_from(document.as_bytes()).map_err(|e| encryption_error(&e))?;

        let mut salt = [0u8; 16];
        let mut iv = [0u8; 16];
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut iv);
        let params = pkcs8::pkcs5::pbes2::Parameters::pbkdf2_sha256_aes256cbc(
            PBKDF2_ITERATIONS,
            &salt,
            &iv,
        )
        .map_err(|e| encryption_error(&e))?;

        debug!(iterations = PBKDF2_ITERATIONS, "encrypting private key");
        let encrypted = info
            .encrypt_with_params(params, passphrase)
            .map_err(|e| encryption_error(&e))?;
        Ok(der_to_pem(encrypted.as_bytes(), ENCRYPTED_PRIVATE_KEY_LABEL))
    }

    /// Imports a private key from PEM.
    ///
    /// Accepts `RSA PRIVATE KEY` (PKCS#1), `EC PRIVATE KEY` (SEC1), `PRIVATE KEY` (PKCS#8) and
    /// `ENCRYPTED PRIVATE KEY` (PKCS#8, requires `passphrase`).
    pub fn from_pem(pem_str: &str, passphrase: Option<&str>) -> Result<Self> {
        let block = parse_block(pem_str)?;
        if block.headers().get("Proc-Type").is_some() {
            return Err(SslToolError::UnsupportedKeyType(
                "legacy encrypted PEM (Proc-Type header)".to_string(),
            ));
        }

        let key = match block.tag() {
            "RSA PRIVATE KEY" => {
                let private = RsaPrivateKey::from_pkcs1_der(block.contents())
                    .map_err(|e| SslToolError::DecodingError(e.to_string()))?;
                KeyMaterial::Rsa(Box::new(private))
            }
            "EC PRIVATE KEY" => Self::from_sec1_der(block.contents())?,
            "PRIVATE KEY" => Self::from_pkcs8_der(block.contents())?,
            ENCRYPTED_PRIVATE_KEY_LABEL => {
                let passphrase = passphrase.ok_or_else(|| {
                    SslToolError::InvalidInput(
                        "encrypted private key requires a passphrase".to_string(),
                    )
                })?;
                let info = EncryptedPrivateKeyInfo::try_from(block.contents())
                    .map_err(|e| SslToolError::DecodingError(e.to_string()))?;
                let document = info
                    .decrypt(passphrase)
                    .map_err(|e| SslToolError::DecodingError(e.to_string()))?;
                Self::from_pkcs8_der(document.as_bytes())?
            }
            other => return Err(SslToolError::UnsupportedKeyType(other.to_string())),
        };

        if let KeyAlgorithm::Rsa { bits } = key.algorithm() {
            if bits < MIN_RSA_BITS {
                warn!(
                    bits,
                    minimum = MIN_RSA_BITS,
                    "imported RSA key is below the recommended size"
                );
            }
        }
        Ok(key)
    }

    fn to_pkcs8_der(&self) -> Result<der::SecretDocument> {
        let document = match self {
            KeyMaterial::Rsa(private) => private.to_pkcs8_der(),
            KeyMaterial::EcdsaP256(secret) => secret.to_pkcs8_der(),
            KeyMaterial::EcdsaP384(secret) => secret.to_pkcs8_der(),
            KeyMaterial::Ed25519(signing_key) => signing_key.to_pkcs8_der(),
        };
        document.map_err(|e| SslToolError::EncodingError(e.to_string()))
    }

    fn from_sec1_der(der: &[u8]) -> Result<Self> {
        let decoding_error =
            |e: p256::elliptic_curve::Error| SslToolError::DecodingError(e.to_string());
        let key = EcPrivateKey::from_der(der)?;
        match key.parameters.and_then(|params| params.named_curve()) {
            Some(const_oid::db::rfc5912::SECP_256_R_1) => p256::SecretKey::from_sec1_der(der)
                .map(KeyMaterial::EcdsaP256)
                .map_err(decoding_error),
            Some(const_oid::db::rfc5912::SECP_384_R_1) => p384::SecretKey::from_sec1_der(der)
                .map(KeyMaterial::EcdsaP384)
                .map_err(decoding_error),
            Some(curve) => Err(SslToolError::UnsupportedKeyType(format!("EC curve {curve}"))),
            // No curve parameters: pick the curve from the scalar length.
            None => match key.private_key.len() {
                32 => p256::SecretKey::from_sec1_der(der)
                    .map(KeyMaterial::EcdsaP256)
                    .map_err(decoding_error),
                48 => p384::SecretKey::from_sec1_der(der)
                    .map(KeyMaterial::EcdsaP384)
                    .map_err(decoding_error),
                _ => Err(SslToolError::UnsupportedKeyType(
                    "EC private key on an unsupported curve".to_string(),
                )),
            },
        }
    }

    fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let decoding_error = |e: pkcs8::Error| SslToolError::DecodingError(e.to_string());
        let info = PrivateKeyInfo::try_from(der).map_err(decoding_error)?;
        match info.algorithm.oid {
            const_oid::db::rfc5912::RSA_ENCRYPTION => Ok(KeyMaterial::Rsa(Box::new(
                RsaPrivateKey::from_pkcs8_der(der).map_err(decoding_error)?,
            ))),
            const_oid::db::rfc5912::ID_EC_PUBLIC_KEY => match info.algorithm.parameters_oid() {
                Ok(const_oid::db::rfc5912::SECP_256_R_1) => Ok(KeyMaterial::EcdsaP256(
                    p256::SecretKey::from_pkcs8_der(der).map_err(decoding_error)?,
                )),
                Ok(const_oid::db::rfc5912::SECP_384_R_1) => Ok(KeyMaterial::EcdsaP384(
                    p384::SecretKey::from_pkcs8_der(der).map_err(decoding_error)?,
                )),
                Ok(curve) => Err(SslToolError::UnsupportedKeyType(format!("EC curve {curve}"))),
                Err(e) => Err(SslToolError::DecodingError(e.to_string())),
            },
            const_oid::db::rfc8410::ID_ED_25519 => Ok(KeyMaterial::Ed25519(
                Ed25519SigningKey::from_pkcs8_der(der).map_err(decoding_error)?,
            )),
            other => Err(SslToolError::UnsupportedKeyType(other.to_string())),
        }
    }
}

/// DER `ECPrivateKey` (RFC 5915) with the named curve and the uncompressed public point.
fn encode_sec1(
    private_key: &[u8],
    public_key: &[u8],
    curve: const_oid::ObjectIdentifier,
) -> Result<Vec<u8>> {
    let key = EcPrivateKey {
        private_key,
        parameters: Some(EcParameters::NamedCurve(curve)),
        public_key: Some(public_key),
    };
    key.to_der()
        .map_err(|e| SslToolError::EncodingError(e.to_string()))
}
