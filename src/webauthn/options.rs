//! Challenge option wire types.
//!
//! Serialized shapes the front door relays to `navigator.credentials`
//! unchanged, so serde names follow the WebAuthn JSON conventions.

use serde::Serialize;

/// ECDSA over P-256 with SHA-256.
pub const ALG_ES256: i64 = -7;
/// RSA PKCS#1 v1.5 with SHA-256.
pub const ALG_RS256: i64 = -257;

/// Relying-party entity.
#[derive(Debug, Clone, Serialize)]
pub struct RpEntity {
    /// Relying-party id (a DNS name).
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

/// User entity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// User handle; this crate uses the application user id.
    pub id: String,
    /// Account name.
    pub name: String,
    /// Display name.
    pub display_name: String,
}

/// One entry of `pubKeyCredParams`.
#[derive(Debug, Clone, Serialize)]
pub struct PubKeyCredParam {
    /// Always `public-key`.
    #[serde(rename = "type")]
    pub credential_type: &'static str,
    /// COSE algorithm identifier.
    pub alg: i64,
}

/// Authenticator selection criteria.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    /// Resident keys are not required.
    pub require_resident_key: bool,
    /// User verification preference.
    pub user_verification: &'static str,
}

/// Credential reference for `excludeCredentials` / `allowCredentials`.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialDescriptor {
    /// Always `public-key`.
    #[serde(rename = "type")]
    pub credential_type: &'static str,
    /// Credential id, base64url.
    pub id: String,
    /// Transport hints.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

/// Options returned for a registration ceremony.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationChallenge {
    /// Relying party.
    pub rp: RpEntity,
    /// User being enrolled.
    pub user: UserEntity,
    /// Challenge, base64url.
    pub challenge: String,
    /// Accepted algorithms, in preference order.
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Client-side timeout in milliseconds.
    pub timeout: u64,
    /// Credentials the authenticator must not re-enroll.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_credentials: Vec<CredentialDescriptor>,
    /// Authenticator selection criteria.
    pub authenticator_selection: AuthenticatorSelection,
    /// Attestation conveyance preference; always `none`.
    pub attestation: &'static str,
}

/// Options returned for an authentication ceremony.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationChallenge {
    /// Challenge, base64url.
    pub challenge: String,
    /// Client-side timeout in milliseconds.
    pub timeout: u64,
    /// Relying-party id.
    pub rp_id: String,
    /// Credentials allowed to answer.
    pub allow_credentials: Vec<CredentialDescriptor>,
    /// User verification preference.
    pub user_verification: &'static str,
}
