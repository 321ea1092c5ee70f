mod key;

pub use key::{KeyError, VerificationKey};

use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use serde_json::{Map, Value};

pub type Claims = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidReason {
    NoVerificationKey,
    MalformedStructure,
    MalformedEncoding,
    UnsupportedAlgorithm,
    SignatureInvalid,
    Expired,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::NoVerificationKey => "no verification key configured",
            InvalidReason::MalformedStructure => "malformed structure",
            InvalidReason::MalformedEncoding => "malformed encoding",
            InvalidReason::UnsupportedAlgorithm => "unsupported algorithm",
            InvalidReason::SignatureInvalid => "signature invalid",
            InvalidReason::Expired => "token expired",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenVerdict {
    Valid { claims: Claims },
    Invalid { reason: InvalidReason },
}

impl TokenVerdict {
    fn invalid(reason: InvalidReason) -> Self {
        TokenVerdict::Invalid { reason }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TokenVerdict::Valid { .. })
    }
}

/// Verifies compact RS256/RS384/RS512 tokens against a single RSA public key.
///
/// A validator built without a key rejects every token.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    key: Option<VerificationKey>,
    leeway_secs: i64,
}

impl TokenValidator {
    pub fn new(key: VerificationKey) -> Self {
        Self {
            key: Some(key),
            leeway_secs: 0,
        }
    }

    pub fn without_key() -> Self {
        Self {
            key: None,
            leeway_secs: 0,
        }
    }

    /// Loads the PEM key at `path`. Unreadable or invalid key material is logged
    /// and leaves the validator without a key.
    pub fn from_key_file(path: &Path) -> Self {
        match VerificationKey::load(path) {
            Ok(key) => {
                tracing::info!(
                    path = %path.display(),
                    modulus_bits = key.modulus_bits(),
                    "loaded token verification key"
                );
                Self::new(key)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "token verification key unavailable, all tokens will be rejected"
                );
                Self::without_key()
            }
        }
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = i64::try_from(leeway_secs).unwrap_or(i64::MAX);
        self
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn validate(&self, token: &str) -> TokenVerdict {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.validate_at(token, now)
    }

    pub fn validate_at(&self, token: &str, now_secs: i64) -> TokenVerdict {
        let Some(key) = self.key.as_ref() else {
            return TokenVerdict::invalid(InvalidReason::NoVerificationKey);
        };

        // An empty signature segment is structurally acceptable so that unsigned
        // `alg: none` tokens are reported by the algorithm check.
        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            return TokenVerdict::invalid(InvalidReason::MalformedStructure);
        };
        if header_b64.is_empty() || payload_b64.is_empty() {
            return TokenVerdict::invalid(InvalidReason::MalformedStructure);
        }

        let (Some(header), Some(claims)) = (decode_object(header_b64), decode_object(payload_b64))
        else {
            return TokenVerdict::invalid(InvalidReason::MalformedEncoding);
        };

        let Some(algorithm) = header
            .get("alg")
            .and_then(Value::as_str)
            .and_then(accepted_algorithm)
        else {
            return TokenVerdict::invalid(InvalidReason::UnsupportedAlgorithm);
        };

        let signed_len = header_b64.len() + 1 + payload_b64.len();
        let message = &token.as_bytes()[..signed_len];
        match jsonwebtoken::crypto::verify(signature_b64, message, key.decoding_key(), algorithm) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                return TokenVerdict::invalid(InvalidReason::SignatureInvalid);
            }
        }

        if let Some(exp) = claims.get("exp").and_then(Value::as_f64)
            && exp + (self.leeway_secs as f64) < now_secs as f64
        {
            return TokenVerdict::invalid(InvalidReason::Expired);
        }

        TokenVerdict::Valid { claims }
    }
}

fn accepted_algorithm(alg: &str) -> Option<Algorithm> {
    match alg {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        _ => None,
    }
}

fn decode_object(segment: &str) -> Option<Claims> {
    let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
