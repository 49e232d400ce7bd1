//! Utility functions: hashing, identifier derivation, input validation.

use crate::error::{CoreError, Result};
use crate::state::ChannelType;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// SHA-256 of `input`, lowercase hex.
///
/// Every hash persisted by this crate (recipients, codes, tokens)
/// goes through here so the encoding is uniform.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// SHA-256 of raw bytes.
#[must_use]
pub fn sha256_bytes(input: &[u8]) -> [u8; 32] {
    Sha256::digest(input).into()
}

/// Derive the channel DID for a `(channel, recipient)` pair.
///
/// `H(channel_type ":" recipient)` — the same recipient over two
/// channels yields two identities, acting as a privacy-preserving
/// channel fingerprint.
#[must_use]
pub fn channel_did(channel_type: ChannelType, recipient: &str) -> String {
    sha256_hex(&format!("{}:{recipient}", channel_type.as_str()))
}

/// Base64url (no padding) encode.
#[must_use]
pub fn b64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Base64url decode, accepting both padded and unpadded input.
///
/// Browsers and authenticator libraries disagree on trailing `=`;
/// both forms must parse.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] if `input` is not base64url.
pub fn b64url_decode(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| CoreError::InvalidInput(format!("invalid base64url: {e}")))
}

/// Validate a recipient address for the given channel.
///
/// # Rules
///
/// - `email`: 3-255 chars, exactly one `@`, non-empty local and domain
///   parts, domain contains a `.`, no control characters.
/// - `sms` / `whatsapp`: E.164-shaped — leading `+`, then 7-15 digits.
/// - `telegram`: non-empty numeric chat identifier.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] describing the violated rule.
pub fn validate_recipient(channel_type: ChannelType, recipient: &str) -> Result<()> {
    match channel_type {
        ChannelType::Email => validate_email(recipient),
        ChannelType::Sms | ChannelType::Whatsapp => validate_phone(recipient),
        ChannelType::Telegram => {
            if recipient.is_empty() || !recipient.chars().all(|c| c.is_ascii_digit()) {
                return Err(CoreError::InvalidInput(
                    "Telegram chat id must be numeric".into(),
                ));
            }
            Ok(())
        }
    }
}

/// Validate email address format.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] if validation fails.
pub fn validate_email(email: &str) -> Result<()> {
    if email.len() < 3 {
        return Err(CoreError::InvalidInput("Email too short".into()));
    }

    if email.len() > 255 {
        return Err(CoreError::InvalidInput("Email too long".into()));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(CoreError::InvalidInput(
            "Email must contain exactly one '@'".into(),
        ));
    }

    let (local, domain) = (parts[0], parts[1]);
    if local.is_empty() || domain.is_empty() {
        return Err(CoreError::InvalidInput(
            "Email local and domain parts must be non-empty".into(),
        ));
    }

    if !domain.contains('.') {
        return Err(CoreError::InvalidInput(
            "Email domain must contain at least one '.'".into(),
        ));
    }

    if email.chars().any(char::is_control) {
        return Err(CoreError::InvalidInput(
            "Email contains control characters".into(),
        ));
    }

    Ok(())
}

fn validate_phone(number: &str) -> Result<()> {
    let Some(digits) = number.strip_prefix('+') else {
        return Err(CoreError::InvalidInput(
            "Phone number must start with '+'".into(),
        ));
    };

    if digits.len() < 7 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::InvalidInput(
            "Phone number must be 7-15 digits".into(),
        ));
    }

    Ok(())
}

/// Mask a recipient for logging.
///
/// Keeps the first two characters and the domain of an email, or the
/// last two digits of a phone number. Full addresses never reach logs.
///
/// # Examples
///
/// ```
/// use cerberus_auth::utils::mask_recipient;
///
/// assert_eq!(mask_recipient("alice@example.com"), "al***@example.com");
/// assert_eq!(mask_recipient("+15551234567"), "***67");
/// ```
#[must_use]
pub fn mask_recipient(recipient: &str) -> String {
    if let Some(at) = recipient.find('@') {
        let prefix: String = recipient.chars().take(2.min(at)).collect();
        format!("{prefix}***{}", &recipient[at..])
    } else {
        let tail: String = recipient
            .chars()
            .rev()
            .take(2)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("***{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_stable() {
        // Known vector: SHA-256 of "abc".
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_channel_did_separates_channels() {
        let email = channel_did(ChannelType::Email, "a@b.test");
        let sms = channel_did(ChannelType::Sms, "a@b.test");
        assert_ne!(email, sms);
        assert_eq!(email, sha256_hex("email:a@b.test"));
    }

    #[test]
    fn test_b64url_accepts_padded_and_unpadded() {
        let bytes = b"challenge-bytes";
        let unpadded = b64url_encode(bytes);
        let padded = format!("{unpadded}==");
        assert_eq!(b64url_decode(&unpadded).unwrap(), bytes);
        assert_eq!(b64url_decode(&padded).unwrap(), bytes);
    }

    #[test]
    fn test_validate_recipient() {
        assert!(validate_recipient(ChannelType::Email, "user@example.com").is_ok());
        assert!(validate_recipient(ChannelType::Email, "invalid").is_err());
        assert!(validate_recipient(ChannelType::Email, "@example.com").is_err());
        assert!(validate_recipient(ChannelType::Sms, "+15551234567").is_ok());
        assert!(validate_recipient(ChannelType::Sms, "15551234567").is_err());
        assert!(validate_recipient(ChannelType::Whatsapp, "+44123").is_err());
        assert!(validate_recipient(ChannelType::Telegram, "123456789").is_ok());
        assert!(validate_recipient(ChannelType::Telegram, "@user").is_err());
    }

    #[test]
    fn test_mask_recipient_hides_address() {
        assert_eq!(mask_recipient("a@b.test"), "a***@b.test");
        assert!(!mask_recipient("alice@example.com").contains("alice"));
    }
}
