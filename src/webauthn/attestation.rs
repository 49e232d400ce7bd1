//! Attestation object and authenticator data parsing.
//!
//! Wire formats from the WebAuthn Level 2 specification: the
//! attestation object is a CBOR map `{fmt, attStmt, authData}`; the
//! authenticator data is a fixed 37-byte header optionally followed by
//! attested credential data and extensions.

use crate::error::{CoreError, Result};
use ciborium::Value;
use serde::Deserialize;

/// Flag bits in the authenticator data (WebAuthn §6.1).
pub mod flags {
    /// User present.
    pub const UP: u8 = 0x01;
    /// User verified.
    pub const UV: u8 = 0x04;
    /// Attested credential data included.
    pub const AT: u8 = 0x40;
    /// Extension data included.
    pub const ED: u8 = 0x80;
}

/// Upper bound on credential id length (WebAuthn §5.8.3).
const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// The client's collected data, decoded from `clientDataJSON`.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectedClientData {
    /// Ceremony type: `webauthn.create` or `webauthn.get`.
    #[serde(rename = "type")]
    pub ceremony_type: String,

    /// The challenge the client signed over, base64url.
    pub challenge: String,

    /// The origin the client saw.
    pub origin: String,
}

impl CollectedClientData {
    /// Decode from raw `clientDataJSON` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the payload is not the
    /// expected JSON shape.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CoreError::InvalidInput(format!("malformed clientDataJSON: {e}")))
    }
}

/// Credential material attested at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    /// Authenticator AAGUID.
    pub aaguid: [u8; 16],

    /// Raw credential id bytes.
    pub credential_id: Vec<u8>,

    /// COSE public key, raw CBOR bytes.
    pub public_key_cose: Vec<u8>,
}

/// Parsed authenticator data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    /// SHA-256 of the relying-party id the authenticator scoped to.
    pub rp_id_hash: [u8; 32],

    /// Flag byte (see [`flags`]).
    pub flags: u8,

    /// 32-bit big-endian signature counter.
    pub sign_count: u32,

    /// Present when the AT flag is set (registration).
    pub attested_credential: Option<AttestedCredential>,
}

impl AuthenticatorData {
    /// Parse authenticator data bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] on truncated or
    /// inconsistent input.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 37 {
            return Err(CoreError::InvalidInput(
                "authenticator data shorter than 37 bytes".into(),
            ));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[0..32]);
        let flag_byte = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested_credential = if flag_byte & flags::AT == 0 {
            None
        } else {
            Some(parse_attested_credential(&bytes[37..])?)
        };

        Ok(Self {
            rp_id_hash,
            flags: flag_byte,
            sign_count,
            attested_credential,
        })
    }

    /// Whether the user-present flag is set.
    #[must_use]
    pub const fn user_present(&self) -> bool {
        self.flags & flags::UP != 0
    }
}

fn parse_attested_credential(bytes: &[u8]) -> Result<AttestedCredential> {
    if bytes.len() < 18 {
        return Err(CoreError::InvalidInput(
            "attested credential data truncated".into(),
        ));
    }

    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&bytes[0..16]);
    let id_len = usize::from(u16::from_be_bytes([bytes[16], bytes[17]]));

    if id_len == 0 || id_len > MAX_CREDENTIAL_ID_LEN {
        return Err(CoreError::InvalidInput(format!(
            "credential id length {id_len} out of range"
        )));
    }
    if bytes.len() < 18 + id_len {
        return Err(CoreError::InvalidInput(
            "credential id extends past authenticator data".into(),
        ));
    }

    let credential_id = bytes[18..18 + id_len].to_vec();

    // The COSE key is one CBOR value; extensions may follow it, so
    // measure exactly how much the deserializer consumed.
    let key_slice = &bytes[18 + id_len..];
    let public_key_cose = take_one_cbor_value(key_slice)?;

    Ok(AttestedCredential {
        aaguid,
        credential_id,
        public_key_cose,
    })
}

/// Read one CBOR value off the front of `bytes` and return exactly the
/// bytes it occupied.
fn take_one_cbor_value(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(bytes);
    let _: Value = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| CoreError::InvalidInput(format!("malformed COSE key CBOR: {e}")))?;

    #[allow(clippy::cast_possible_truncation)]
    let consumed = cursor.position() as usize;
    Ok(bytes[..consumed].to_vec())
}

/// Parsed attestation object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationObject {
    /// Attestation statement format (`none`, `packed`, …).
    pub fmt: String,

    /// Raw authenticator data bytes.
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    /// Parse an attestation object from its CBOR encoding.
    ///
    /// The attestation statement is deliberately not retained: the
    /// engine only accepts `fmt = "none"`, which has an empty one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] on malformed CBOR.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| CoreError::InvalidInput(format!("malformed attestation object: {e}")))?;

        let Value::Map(entries) = value else {
            return Err(CoreError::InvalidInput(
                "attestation object is not a CBOR map".into(),
            ));
        };

        let mut fmt = None;
        let mut auth_data = None;
        for (key, entry) in entries {
            match (key, entry) {
                (Value::Text(k), Value::Text(v)) if k == "fmt" => fmt = Some(v),
                (Value::Text(k), Value::Bytes(v)) if k == "authData" => auth_data = Some(v),
                _ => {}
            }
        }

        match (fmt, auth_data) {
            (Some(fmt), Some(auth_data)) => Ok(Self { fmt, auth_data }),
            _ => Err(CoreError::InvalidInput(
                "attestation object missing fmt or authData".into(),
            )),
        }
    }
}
