//! Generators for the short-lived secrets the signup flow hands out.

use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha512};
use uuid::Uuid;

/// Length of the one-time-code seed in raw bytes, before base32 encoding.
const TOTP_SEED_LEN: usize = 20;

/// 6-digit numeric verification code for email confirmation, zero-padded.
#[must_use]
pub fn verification_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000_u32))
}

/// Opaque session id bound into token claims: UUIDv4 with dashes stripped.
#[must_use]
pub fn session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Fresh one-time-code seed, base32-encoded (RFC 4648, no padding) for
/// storage and for the provisioning URI.
#[must_use]
pub fn totp_seed() -> String {
    let mut bytes = [0u8; TOTP_SEED_LEN];
    OsRng.fill_bytes(&mut bytes);
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes)
}

/// Opaque certificate fingerprint stored on the identity row:
/// hex-encoded SHA-512 of 32 random bytes.
#[must_use]
pub fn cert_print() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let hash = Sha512::digest(bytes);
    hash.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Timing-safe equality for user-submitted codes.
///
/// A length mismatch short-circuits; the contents are never compared
/// byte-early-exit.
#[must_use]
pub fn verify_eq(submitted: &str, expected: &str) -> bool {
    submitted.len() == expected.len()
        && bool::from(subtle::ConstantTimeEq::ct_eq(
            submitted.as_bytes(),
            expected.as_bytes(),
        ))
}
