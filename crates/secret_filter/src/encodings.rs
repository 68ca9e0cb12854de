//! Encoded-window extraction for the secret filter's layers 2-4: base64,
//! hex, and URL-percent-encoded substrings, each decoded and rescanned
//! with the same pattern set as the raw layer (spec §4.D).

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static BASE64_WINDOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9+/_-]{20,}=*").unwrap());
static HEX_WINDOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-fA-F]{20,}").unwrap());
static URLENC_WINDOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:%[0-9a-fA-F]{2}){3,}").unwrap());

fn printable_ratio(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let printable = bytes
        .iter()
        .filter(|&&b| (0x20..=0x7e).contains(&b) || b == b'\n' || b == b'\t')
        .count();
    printable as f64 / bytes.len() as f64
}

pub struct DecodedWindow {
    pub span: Range<usize>,
    pub decoded: String,
}

/// Base64 windows of >= 20 chars, decoded (standard or URL-safe alphabet)
/// and kept only when the decode is mostly printable ASCII.
pub fn base64_windows(text: &str) -> Vec<DecodedWindow> {
    BASE64_WINDOW
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let decoded_bytes = STANDARD
                .decode(raw)
                .or_else(|_| URL_SAFE.decode(raw))
                .or_else(|_| STANDARD.decode(raw.trim_end_matches('=')))
                .ok()?;
            if printable_ratio(&decoded_bytes) <= 0.8 {
                return None;
            }
            Some(DecodedWindow {
                span: m.start()..m.end(),
                decoded: String::from_utf8_lossy(&decoded_bytes).into_owned(),
            })
        })
        .collect()
}

/// Hex windows of >= 20 even-length chars, decoded to bytes then treated
/// as text for rescanning.
pub fn hex_windows(text: &str) -> Vec<DecodedWindow> {
    HEX_WINDOW
        .find_iter(text)
        .filter_map(|m| {
            let mut raw = m.as_str();
            if raw.len() % 2 != 0 {
                raw = &raw[..raw.len() - 1];
            }
            if raw.len() < 20 {
                return None;
            }
            let decoded_bytes = hex::decode(raw).ok()?;
            if printable_ratio(&decoded_bytes) <= 0.8 {
                return None;
            }
            Some(DecodedWindow {
                span: m.start()..m.start() + raw.len(),
                decoded: String::from_utf8_lossy(&decoded_bytes).into_owned(),
            })
        })
        .collect()
}

/// URL-percent-encoded sequences of >= 3 `%xx` triplets, percent-decoded.
pub fn url_encoded_windows(text: &str) -> Vec<DecodedWindow> {
    URLENC_WINDOW
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let mut bytes = Vec::with_capacity(raw.len() / 3);
            let mut chars = raw.as_bytes().chunks(3);
            for chunk in &mut chars {
                if chunk.len() != 3 || chunk[0] != b'%' {
                    return None;
                }
                let hex_byte = std::str::from_utf8(&chunk[1..3]).ok()?;
                bytes.push(u8::from_str_radix(hex_byte, 16).ok()?);
            }
            Some(DecodedWindow {
                span: m.start()..m.end(),
                decoded: String::from_utf8_lossy(&bytes).into_owned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_window_decodes_printable_payload() {
        let secret = "hello this is a reasonably long printable payload";
        let encoded = STANDARD.encode(secret);
        let text = format!("aaa {encoded} bbb");
        let windows = base64_windows(&text);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].decoded, secret);
    }

    #[test]
    fn hex_window_decodes() {
        let secret = "a secret string long enough";
        let encoded = hex::encode(secret);
        let text = format!("prefix {encoded} suffix");
        let windows = hex_windows(&text);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].decoded, secret);
    }

    #[test]
    fn url_encoded_window_decodes() {
        let text = "q=%41%42%43%44%45";
        let windows = url_encoded_windows(text);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].decoded, "ABCDE");
    }
}
