use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::DecodingKey;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;

const SPKI_BEGIN: &str = "-----BEGIN PUBLIC KEY-----";
const SPKI_END: &str = "-----END PUBLIC KEY-----";
const PKCS1_BEGIN: &str = "-----BEGIN RSA PUBLIC KEY-----";
const PKCS1_END: &str = "-----END RSA PUBLIC KEY-----";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read verification key '{path}': {message}")]
    Read { path: String, message: String },

    #[error("verification key is missing PEM public key markers")]
    NotPem,

    #[error("verification key body is not valid base64: {0}")]
    Base64(String),

    #[error("verification key is not an RSA public key: {0}")]
    NotRsa(String),
}

/// RSA public key used to verify token signatures.
#[derive(Clone)]
pub struct VerificationKey {
    decoding_key: DecodingKey,
    modulus_bits: usize,
}

impl VerificationKey {
    /// Accepts SubjectPublicKeyInfo (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM text.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let trimmed = pem.trim();

        let (body, pkcs1) = if let Some(rest) = trimmed.strip_prefix(SPKI_BEGIN) {
            (rest.strip_suffix(SPKI_END).ok_or(KeyError::NotPem)?, false)
        } else if let Some(rest) = trimmed.strip_prefix(PKCS1_BEGIN) {
            (rest.strip_suffix(PKCS1_END).ok_or(KeyError::NotPem)?, true)
        } else {
            return Err(KeyError::NotPem);
        };

        let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        let der = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| KeyError::Base64(e.to_string()))?;

        let public_key = if pkcs1 {
            RsaPublicKey::from_pkcs1_der(&der).map_err(|e| KeyError::NotRsa(e.to_string()))?
        } else {
            RsaPublicKey::from_public_key_der(&der).map_err(|e| KeyError::NotRsa(e.to_string()))?
        };

        Ok(Self::from_rsa(&public_key))
    }

    pub fn load(path: &Path) -> Result<Self, KeyError> {
        let contents = std::fs::read_to_string(path).map_err(|e| KeyError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_pem(&contents)
    }

    fn from_rsa(public_key: &RsaPublicKey) -> Self {
        let modulus = public_key.n().to_bytes_be();
        let exponent = public_key.e().to_bytes_be();
        Self {
            decoding_key: DecodingKey::from_rsa_raw_components(&modulus, &exponent),
            modulus_bits: public_key.size() * 8,
        }
    }

    pub fn modulus_bits(&self) -> usize {
        self.modulus_bits
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("modulus_bits", &self.modulus_bits)
            .finish_non_exhaustive()
    }
}
