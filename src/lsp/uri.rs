//! `file://` URI <-> absolute path conversion.
//!
//! The percent-encode/decode pair is kept close to the teacher's hand-rolled
//! implementation in `lsp_client.rs` (same unreserved-byte table): it is
//! already correct and dependency-free, so there is no reason to route it
//! through the `percent-encoding` crate once this module is the only
//! caller.

use anyhow::{bail, Context, Result};
use lsp_types::Uri;
use std::path::{Path, PathBuf};

/// Build a `file://` URI from an absolute filesystem path.
///
/// # Errors
///
/// Returns an error if `path` is not absolute or cannot be parsed as a URI.
pub fn path_to_uri(path: &Path) -> Result<Uri> {
    if !path.is_absolute() {
        bail!("invalid absolute file path for URI: {}", path.display());
    }
    let uri_str = format!("file://{}", percent_encode_path(&path.to_string_lossy()));
    uri_str
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid file URI for path {}: {e}", path.display()))
}

/// Extract an absolute filesystem path from a `file://` URI.
///
/// # Errors
///
/// Returns an error if the URI is not a `file://` URI.
pub fn uri_to_path(uri: &Uri) -> Result<PathBuf> {
    let s = uri.as_str();
    let path = s
        .strip_prefix("file://")
        .with_context(|| format!("not a file URI: {s}"))?;
    let decoded = percent_decode_path(path).unwrap_or_else(|| path.to_string());
    Ok(PathBuf::from(decoded))
}

fn percent_encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for &b in path.as_bytes() {
        if is_unreserved_path_byte(b) {
            encoded.push(char::from(b));
        } else {
            encoded.push('%');
            encoded.push(hex_upper(b >> 4));
            encoded.push(hex_upper(b & 0x0f));
        }
    }
    encoded
}

fn percent_decode_path(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    let mut i = 0;
    let mut decoded = Vec::with_capacity(bytes.len());
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return None;
            }
            let hi = hex_value(bytes[i + 1])?;
            let lo = hex_value(bytes[i + 2])?;
            decoded.push((hi << 4) | lo);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

const fn is_unreserved_path_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'.' || b == b'_' || b == b'~' || b == b'/'
}

const fn hex_upper(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        10..=15 => (b'A' + (nibble - 10)) as char,
        _ => '?',
    }
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_to_uri_absolute() {
        let uri = path_to_uri(Path::new("/tmp/test.rs")).unwrap();
        assert_eq!(uri.as_str(), "file:///tmp/test.rs");
    }

    #[test]
    fn path_to_uri_percent_encodes_spaces() {
        let uri = path_to_uri(Path::new("/tmp/space file.rs")).unwrap();
        assert_eq!(uri.as_str(), "file:///tmp/space%20file.rs");
    }

    #[test]
    fn path_to_uri_rejects_relative() {
        assert!(path_to_uri(Path::new("tmp/test.rs")).is_err());
    }

    #[test]
    fn round_trip_any_absolute_path() {
        for p in ["/tmp/test.rs", "/a/b/c.py", "/has space/and-dash_under.go"] {
            let uri = path_to_uri(Path::new(p)).unwrap();
            assert_eq!(uri_to_path(&uri).unwrap(), PathBuf::from(p));
        }
    }

    #[test]
    fn uri_to_path_decodes_percent_encoding() {
        let uri: Uri = "file:///tmp/space%20file.rs".parse().unwrap();
        assert_eq!(uri_to_path(&uri).unwrap(), PathBuf::from("/tmp/space file.rs"));
    }
}
