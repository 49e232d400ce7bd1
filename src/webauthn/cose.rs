//! COSE key decoding and assertion signature verification.
//!
//! Supports the two algorithms the engine advertises in
//! `pubKeyCredParams`: ES256 (COSE alg -7, ECDSA over P-256 with
//! SHA-256) and RS256 (COSE alg -257, RSA PKCS#1 v1.5 with SHA-256).
//! Verification is delegated to `p256` and `rsa`; nothing here rolls
//! its own cryptography.

use crate::error::{CoreError, Result};
use ciborium::Value;

/// COSE key type labels (RFC 9052 §7).
const LABEL_KTY: i128 = 1;
const LABEL_ALG: i128 = 3;
/// EC2: curve / x / y. RSA reuses -1/-2 for modulus / exponent.
const LABEL_CRV_OR_N: i128 = -1;
const LABEL_X_OR_E: i128 = -2;
const LABEL_Y: i128 = -3;

const KTY_EC2: i128 = 2;
const KTY_RSA: i128 = 3;
const ALG_ES256: i128 = -7;
const ALG_RS256: i128 = -257;
const CRV_P256: i128 = 1;

/// A decoded credential public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    /// ECDSA over P-256 with SHA-256.
    Es256 {
        /// X coordinate, 32 bytes.
        x: Vec<u8>,
        /// Y coordinate, 32 bytes.
        y: Vec<u8>,
    },
    /// RSA PKCS#1 v1.5 with SHA-256.
    Rs256 {
        /// Modulus, big-endian.
        n: Vec<u8>,
        /// Public exponent, big-endian.
        e: Vec<u8>,
    },
}

impl CoseKey {
    /// Decode a COSE key from its CBOR encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for malformed CBOR and
    /// [`CoreError::Unauthorized`] for key types or algorithms the
    /// engine does not advertise.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| CoreError::InvalidInput(format!("COSE key is not CBOR: {e}")))?;

        let Value::Map(entries) = value else {
            return Err(CoreError::InvalidInput("COSE key is not a CBOR map".into()));
        };

        let kty = require_int(&entries, LABEL_KTY, "kty")?;
        let alg = require_int(&entries, LABEL_ALG, "alg")?;

        match (kty, alg) {
            (KTY_EC2, ALG_ES256) => {
                let crv = require_int(&entries, LABEL_CRV_OR_N, "crv")?;
                if crv != CRV_P256 {
                    return Err(CoreError::Unauthorized);
                }
                let x = require_bytes(&entries, LABEL_X_OR_E, "x")?;
                let y = require_bytes(&entries, LABEL_Y, "y")?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(CoreError::InvalidInput(
                        "P-256 coordinates must be 32 bytes".into(),
                    ));
                }
                Ok(Self::Es256 { x, y })
            }
            (KTY_RSA, ALG_RS256) => {
                let n = require_bytes(&entries, LABEL_CRV_OR_N, "n")?;
                let e = require_bytes(&entries, LABEL_X_OR_E, "e")?;
                Ok(Self::Rs256 { n, e })
            }
            // Unadvertised algorithm: treat as an authentication
            // failure, not a malformed request.
            _ => Err(CoreError::Unauthorized),
        }
    }

    /// Verify `signature` over `message` with this key.
    ///
    /// For ES256 the signature is DER-encoded; for RS256 it is a raw
    /// PKCS#1 v1.5 block. Both hash the message with SHA-256.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthorized`] if the signature does not
    /// verify or the key material is unusable.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        match self {
            Self::Es256 { x, y } => verify_es256(x, y, message, signature),
            Self::Rs256 { n, e } => verify_rs256(n, e, message, signature),
        }
    }
}

fn verify_es256(x: &[u8], y: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    use p256::EncodedPoint;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};

    let x: [u8; 32] = x.try_into().map_err(|_| CoreError::Unauthorized)?;
    let y: [u8; 32] = y.try_into().map_err(|_| CoreError::Unauthorized)?;
    let point = EncodedPoint::from_affine_coordinates(&x.into(), &y.into(), false);
    let key = VerifyingKey::from_encoded_point(&point).map_err(|_| CoreError::Unauthorized)?;
    let signature = Signature::from_der(signature).map_err(|_| CoreError::Unauthorized)?;

    key.verify(message, &signature)
        .map_err(|_| CoreError::Unauthorized)
}

fn verify_rs256(n: &[u8], e: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
    use sha2::{Digest, Sha256};

    let key = RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
        .map_err(|_| CoreError::Unauthorized)?;
    let digest = Sha256::digest(message);

    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| CoreError::Unauthorized)
}

fn lookup<'a>(entries: &'a [(Value, Value)], label: i128) -> Option<&'a Value> {
    entries.iter().find_map(|(k, v)| match k {
        Value::Integer(i) if i128::from(*i) == label => Some(v),
        _ => None,
    })
}

fn require_int(entries: &[(Value, Value)], label: i128, name: &str) -> Result<i128> {
    match lookup(entries, label) {
        Some(Value::Integer(i)) => Ok(i128::from(*i)),
        _ => Err(CoreError::InvalidInput(format!(
            "COSE key missing integer field `{name}`"
        ))),
    }
}

fn require_bytes(entries: &[(Value, Value)], label: i128, name: &str) -> Result<Vec<u8>> {
    match lookup(entries, label) {
        Some(Value::Bytes(b)) => Ok(b.clone()),
        _ => Err(CoreError::InvalidInput(format!(
            "COSE key missing bytes field `{name}`"
        ))),
    }
}

/// Encode an ES256 COSE key. Used by the engine's tests to build
/// authenticator payloads; exposed crate-internal only.
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn encode_es256(x: &[u8], y: &[u8]) -> Vec<u8> {
    let map = Value::Map(vec![
        (Value::Integer(1.into()), Value::Integer(2.into())),
        (Value::Integer(3.into()), Value::Integer((-7).into())),
        (Value::Integer((-1).into()), Value::Integer(1.into())),
        (Value::Integer((-2).into()), Value::Bytes(x.to_vec())),
        (Value::Integer((-3).into()), Value::Bytes(y.to_vec())),
    ]);
    let mut out = Vec::new();
    // Writing CBOR into a Vec cannot fail.
    #[allow(clippy::unwrap_used)]
    ciborium::ser::into_writer(&map, &mut out).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{DerSignature, SigningKey};
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    fn test_keypair() -> (SigningKey, Vec<u8>, Vec<u8>) {
        let signing = SigningKey::random(&mut rand::rngs::OsRng);
        let point = signing.verifying_key().to_encoded_point(false);
        let x = point.x().unwrap().to_vec();
        let y = point.y().unwrap().to_vec();
        (signing, x, y)
    }

    #[test]
    fn test_es256_round_trip() {
        let (signing, x, y) = test_keypair();
        let encoded = encode_es256(&x, &y);
        let key = CoseKey::decode(&encoded).unwrap();
        assert_eq!(key, CoseKey::Es256 { x, y });

        let message = b"authenticator data || client data hash";
        let signature: DerSignature = signing.sign(message);
        key.verify(message, signature.as_bytes()).unwrap();
    }

    #[test]
    fn test_es256_rejects_wrong_message() {
        let (signing, x, y) = test_keypair();
        let key = CoseKey::decode(&encode_es256(&x, &y)).unwrap();

        let signature: DerSignature = signing.sign(b"signed message");
        let result = key.verify(b"different message", signature.as_bytes());
        assert_eq!(result, Err(CoreError::Unauthorized));
    }

    #[test]
    fn test_rejects_unknown_algorithm() {
        // kty EC2 but alg EdDSA (-8), which we never advertise.
        let map = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-8).into())),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&map, &mut bytes).unwrap();
        assert_eq!(CoseKey::decode(&bytes), Err(CoreError::Unauthorized));
    }

    #[test]
    fn test_rejects_non_map() {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Value::Text("nope".into()), &mut bytes).unwrap();
        assert!(matches!(
            CoseKey::decode(&bytes),
            Err(CoreError::InvalidInput(_))
        ));
    }
}
