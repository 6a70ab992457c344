//! Time-based one-time-code derivation (RFC 6238 over RFC 4226, SHA-1).

use crate::auth::code::verify_eq;
use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Time step shared with provisioned authenticator apps.
pub const STEP_SECONDS: u64 = 30;

/// Codes are reduced modulo 10^6 and zero-padded to this width.
pub const DIGITS: usize = 6;

const CODE_MODULUS: u32 = 1_000_000;

type HmacSha1 = Hmac<Sha1>;

/// Derive the 6-digit code for one time counter.
///
/// HMAC-SHA1 over the 64-bit big-endian counter, dynamic truncation at the
/// offset named by the low nibble of the final hash byte, sign bit masked.
///
/// # Errors
/// Returns an error if the HMAC cannot be keyed with the seed.
pub fn derive_code(seed: &[u8], counter: u64) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(seed).map_err(|err| anyhow!("hmac key error: {err}"))?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = usize::from(hash.last().copied().unwrap_or_default() & 0x0f);
    let truncated: [u8; 4] = hash
        .get(offset..offset + 4)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| anyhow!("truncation offset out of range"))?;
    let binary = u32::from_be_bytes(truncated) & 0x7fff_ffff;

    Ok(format!("{:06}", binary % CODE_MODULUS))
}

/// Check a submitted code against the counters for now, now-1, and now+1
/// (±30 s drift tolerance). Comparison is timing-safe per candidate.
///
/// # Errors
/// Returns an error only on derivation failure, never on mismatch.
pub fn verify_window(seed: &[u8], submitted: &str, now_unix: u64) -> Result<bool> {
    let counter = i64::try_from(now_unix / STEP_SECONDS).unwrap_or(i64::MAX);
    for delta in -1..=1_i64 {
        let Some(candidate) = counter
            .checked_add(delta)
            .and_then(|adjacent| u64::try_from(adjacent).ok())
        else {
            continue;
        };
        let code = derive_code(seed, candidate)?;
        if verify_eq(submitted, &code) {
            return Ok(true);
        }
    }
    Ok(false)
}
