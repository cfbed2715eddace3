//! `X-Twilio-Signature` webhook validation
//!
//! Twilio signs each webhook by sorting the POST parameters alphabetically
//! by key, concatenating the full request URL with each key and value, and
//! taking an HMAC-SHA1 of the result with the account's auth token, base64
//! encoded.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha1::Sha1;

/// Compute the signature Twilio would attach to this request
///
/// Returns None only if the HMAC cannot be keyed, which does not happen for
/// any auth token length.
#[must_use]
pub fn expected_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
) -> Option<String> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = url.to_string();
    for (key, value) in sorted {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(data.as_bytes());
    Some(BASE64.encode(mac.finalize().into_bytes()))
}

/// Validate a webhook signature against the auth token
#[must_use]
pub fn validate(auth_token: &str, url: &str, params: &[(String, String)], signature: &str) -> bool {
    expected_signature(auth_token, url, params)
        .is_some_and(|expected| constant_time_eq(expected.as_bytes(), signature.as_bytes()))
}

/// Compare byte strings without early exit
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
