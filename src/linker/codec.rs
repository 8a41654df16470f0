//! Linker token codec.
//!
//! Wire format (query-string value):
//! `version '*' checksum ('*' key '*' base64url(value))*`
//!
//! The checksum is the base36 rendering of a crc32 over the page
//! fingerprint (user agent, timezone offset, language), the epoch minute,
//! and the encoded pairs. Decoding tolerates a one-minute clock skew in
//! either direction; the forward tolerance is deliberate and kept for
//! interoperability with existing readers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::collections::HashMap;

/// Only supported wire version.
pub const LINKER_VERSION: &str = "1";

const DELIMITER: char = '*';

/// Browser-environment values mixed into the checksum so a token is bound
/// to the sending context.
#[derive(Debug, Clone)]
pub struct PageFingerprint {
    pub user_agent: String,
    pub timezone_offset_minutes: i32,
    pub language: String,
}

impl PageFingerprint {
    fn render(&self) -> String {
        format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.user_agent, self.timezone_offset_minutes, self.language
        )
    }
}

/// A linker key: first char ASCII alphabetic, rest alphanumeric or
/// `.`/`_`/`-`.
fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Lowercase base36 rendering, as `Number.prototype.toString(36)` produces.
fn base36(mut value: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

fn checksum(fingerprint: &PageFingerprint, epoch_minutes: u64, encoded_pairs: &str) -> String {
    let input = format!(
        "{}{DELIMITER}{epoch_minutes}{encoded_pairs}",
        fingerprint.render()
    );
    base36(crc32fast::hash(input.as_bytes()))
}

/// Encode `pairs` into a linker token.
///
/// Returns an empty string when there is nothing to carry. Keys failing
/// validation are dropped individually with a warning, not fatal; if all
/// keys are invalid the result is empty. Pair order is preserved.
pub fn encode(
    version: &str,
    pairs: &[(String, String)],
    fingerprint: &PageFingerprint,
    now_millis: u64,
) -> String {
    if pairs.is_empty() {
        return String::new();
    }
    let mut encoded_pairs = String::new();
    let mut valid = 0usize;
    for (key, value) in pairs {
        if !is_valid_key(key) {
            tracing::warn!(key, "invalid linker key dropped");
            continue;
        }
        valid += 1;
        encoded_pairs.push(DELIMITER);
        encoded_pairs.push_str(key);
        encoded_pairs.push(DELIMITER);
        encoded_pairs.push_str(&URL_SAFE_NO_PAD.encode(value.as_bytes()));
    }
    if valid == 0 {
        return String::new();
    }
    let check = checksum(fingerprint, now_millis / 60_000, &encoded_pairs);
    format!("{version}{DELIMITER}{check}{encoded_pairs}")
}

/// Decode a linker token back into its key/value pairs.
///
/// Returns `None` for structural damage, an unsupported version, or a
/// checksum that matches neither the current minute nor the minute before
/// or after. Entries with invalid keys or undecodable values are dropped
/// from the result rather than failing the whole decode.
pub fn decode(
    value: &str,
    fingerprint: &PageFingerprint,
    now_millis: u64,
) -> Option<HashMap<String, String>> {
    let parts: Vec<&str> = value.split(DELIMITER).collect();
    // version + checksum + at least one pair, and no dangling key.
    if parts.len() < 4 || parts.len() % 2 != 0 {
        tracing::warn!(value, "malformed linker token structure");
        return None;
    }
    if parts[0] != LINKER_VERSION {
        tracing::warn!(version = parts[0], "unsupported linker version");
        return None;
    }
    let claimed = parts[1];

    let mut encoded_pairs = String::new();
    for part in &parts[2..] {
        encoded_pairs.push(DELIMITER);
        encoded_pairs.push_str(part);
    }

    let minute = now_millis / 60_000;
    let candidates = [minute, minute.wrapping_sub(1), minute + 1];
    let verified = candidates
        .iter()
        .any(|&m| checksum(fingerprint, m, &encoded_pairs) == claimed);
    if !verified {
        tracing::warn!(value, "linker checksum mismatch");
        return None;
    }

    let mut result = HashMap::new();
    for chunk in parts[2..].chunks(2) {
        let (key, encoded) = (chunk[0], chunk[1]);
        if !is_valid_key(key) {
            tracing::warn!(key, "invalid linker key in token dropped");
            continue;
        }
        let bytes = match URL_SAFE_NO_PAD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(key, error = %err, "undecodable linker value dropped");
                continue;
            }
        };
        match String::from_utf8(bytes) {
            Ok(decoded) => {
                result.insert(key.to_string(), decoded);
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "non-utf8 linker value dropped");
            }
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> PageFingerprint {
        PageFingerprint {
            user_agent: "Mozilla/5.0 (test)".to_string(),
            timezone_offset_minutes: -120,
            language: "en-US".to_string(),
        }
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn test_round_trip_within_same_minute() {
        let token = encode("1", &pairs(&[("a", "1")]), &fingerprint(), NOW);
        let decoded = decode(&token, &fingerprint(), NOW).unwrap();
        assert_eq!(decoded.get("a").map(String::as_str), Some("1"));
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_round_trip_tolerates_one_minute_skew_both_ways() {
        let token = encode("1", &pairs(&[("cid", "user-123")]), &fingerprint(), NOW);
        assert!(decode(&token, &fingerprint(), NOW + 60_000).is_some());
        assert!(decode(&token, &fingerprint(), NOW.saturating_sub(60_000)).is_some());
        assert!(decode(&token, &fingerprint(), NOW + 180_000).is_none());
    }

    #[test]
    fn test_empty_pairs_encode_to_empty_string() {
        assert_eq!(encode("1", &[], &fingerprint(), NOW), "");
    }

    #[test]
    fn test_all_invalid_keys_encode_to_empty_string() {
        assert_eq!(
            encode("1", &pairs(&[("9bad", "x"), ("_also", "y")]), &fingerprint(), NOW),
            ""
        );
    }

    #[test]
    fn test_invalid_keys_dropped_individually() {
        let token = encode(
            "1",
            &pairs(&[("good", "1"), ("1bad", "2"), ("als.o-ok_2", "3")]),
            &fingerprint(),
            NOW,
        );
        let decoded = decode(&token, &fingerprint(), NOW).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded.contains_key("good"));
        assert!(decoded.contains_key("als.o-ok_2"));
    }

    #[test]
    fn test_flipped_checksum_char_fails_decode() {
        let token = encode("1", &pairs(&[("a", "1")]), &fingerprint(), NOW);
        let mut parts: Vec<String> = token.split('*').map(String::from).collect();
        let mut checksum = parts[1].clone();
        let flipped = if checksum.starts_with('z') { "a" } else { "z" };
        checksum.replace_range(0..1, flipped);
        parts[1] = checksum;
        assert_eq!(decode(&parts.join("*"), &fingerprint(), NOW), None);
    }

    #[test]
    fn test_dangling_key_is_structural_damage() {
        let token = encode("1", &pairs(&[("a", "1")]), &fingerprint(), NOW);
        let truncated = format!("{token}*orphan");
        assert_eq!(decode(&truncated, &fingerprint(), NOW), None);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let token = encode("2", &pairs(&[("a", "1")]), &fingerprint(), NOW);
        assert_eq!(decode(&token, &fingerprint(), NOW), None);
    }

    #[test]
    fn test_checksum_binds_fingerprint() {
        let token = encode("1", &pairs(&[("a", "1")]), &fingerprint(), NOW);
        let other = PageFingerprint {
            user_agent: "different".to_string(),
            ..fingerprint()
        };
        assert_eq!(decode(&token, &other, NOW), None);
    }

    #[test]
    fn test_values_survive_utf8_and_url_unsafe_bytes() {
        let token = encode(
            "1",
            &pairs(&[("v", "snow ☃ & ampersand?/+")]),
            &fingerprint(),
            NOW,
        );
        // The token itself stays URL-safe.
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | '_' | '.')));
        let decoded = decode(&token, &fingerprint(), NOW).unwrap();
        assert_eq!(
            decoded.get("v").map(String::as_str),
            Some("snow ☃ & ampersand?/+")
        );
    }

    #[test]
    fn test_base36_matches_js_rendering() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        // (1234567890).toString(36) === "kf12oi"
        assert_eq!(base36(1_234_567_890), "kf12oi");
    }
}
