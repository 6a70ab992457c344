//! Provisioning URI construction for authenticator apps.

use super::code::{DIGITS, STEP_SECONDS};

/// Build the `otpauth://` URI an authenticator app scans. The secret is the
/// stored base32 seed; issuer and account are percent-encoded.
#[must_use]
pub fn provisioning_uri(issuer: &str, account: &str, secret_base32: &str) -> String {
    let issuer = encode_component(issuer);
    let account = encode_component(account);
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret_base32}&issuer={issuer}\
         &algorithm=SHA1&digits={DIGITS}&period={STEP_SECONDS}"
    )
}

/// Decode a stored base32 seed back into HMAC key bytes.
#[must_use]
pub fn decode_seed(secret_base32: &str) -> Option<Vec<u8>> {
    base32::decode(base32::Alphabet::Rfc4648 { padding: false }, secret_base32)
}

fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_carries_algorithm_and_window_parameters() {
        let uri = provisioning_uri("enlasi", "a@x.com", "JBSWY3DPEHPK3PXP");
        assert!(uri.starts_with("otpauth://totp/enlasi:a%40x.com?"));
        assert!(uri.contains("secret=JBSWY3DPEHPK3PXP"));
        assert!(uri.contains("issuer=enlasi"));
        assert!(uri.contains("algorithm=SHA1"));
        assert!(uri.contains("digits=6"));
        assert!(uri.contains("period=30"));
    }

    #[test]
    fn seed_round_trips_through_base32() {
        let encoded = base32::encode(
            base32::Alphabet::Rfc4648 { padding: false },
            b"12345678901234567890",
        );
        assert_eq!(decode_seed(&encoded).as_deref(), Some(b"12345678901234567890".as_slice()));
        assert_eq!(decode_seed("not base32!"), None);
    }
}
