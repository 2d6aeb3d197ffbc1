//! Payload decoding: undo transport compression, then parse JSON.

use crate::compression::{self, Compression};
use crate::error::DecodeError;
use serde_json::Value;

/// Out-of-band information about how a payload was stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeHint<'a> {
    /// `Content-Encoding` reported by the backend.
    pub content_encoding: Option<&'a str>,
    /// Object path, whose suffix may name the compression.
    pub path: Option<&'a str>,
}

/// Pick the compression for a payload. Hints win over magic bytes.
pub fn resolve_compression(raw: &[u8], hint: DecodeHint<'_>) -> Compression {
    hint.content_encoding
        .and_then(Compression::from_content_encoding)
        .or_else(|| hint.path.and_then(Compression::from_path))
        .unwrap_or_else(|| Compression::detect(raw))
}

/// Decode a raw object body into a JSON value.
pub fn decode(raw: &[u8], hint: DecodeHint<'_>) -> Result<Value, DecodeError> {
    let compression = resolve_compression(raw, hint);
    let payload = compression::decompress(raw, compression)?;

    let text = std::str::from_utf8(&payload).map_err(|e| DecodeError {
        compression,
        cause: format!("Payload is not valid UTF-8: {}", e),
    })?;

    serde_json::from_str(text).map_err(|e| DecodeError {
        compression,
        cause: format!("Invalid JSON: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::compress;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DOC: &str = r#"{"a": 1, "nested": {"list": [true, null, "x"]}}"#;

    #[test]
    fn test_compressed_and_plain_decode_identically() {
        let plain = decode(DOC.as_bytes(), DecodeHint::default()).unwrap();
        assert_eq!(plain, json!({"a": 1, "nested": {"list": [true, null, "x"]}}));

        for algorithm in [Compression::Gzip, Compression::Zstd, Compression::Bzip2] {
            let packed = compress(DOC.as_bytes(), algorithm).unwrap();
            let decoded = decode(&packed, DecodeHint::default()).unwrap();
            assert_eq!(decoded, plain, "{} payload decoded differently", algorithm);
        }
    }

    #[test]
    fn test_path_hint_selects_bzip2() {
        let packed = compress(DOC.as_bytes(), Compression::Bzip2).unwrap();
        let hint = DecodeHint {
            content_encoding: None,
            path: Some("taar/whitelist.json.bz2"),
        };
        assert_eq!(resolve_compression(&packed, hint), Compression::Bzip2);
        assert_eq!(decode(&packed, hint).unwrap()["a"], json!(1));
    }

    #[test]
    fn test_content_encoding_beats_path() {
        let packed = compress(DOC.as_bytes(), Compression::Gzip).unwrap();
        let hint = DecodeHint {
            content_encoding: Some("gzip"),
            path: Some("data.json.bz2"),
        };
        assert_eq!(resolve_compression(&packed, hint), Compression::Gzip);
    }

    #[test]
    fn test_wrong_hint_is_a_decode_error() {
        let hint = DecodeHint {
            content_encoding: None,
            path: Some("data.json.gz"),
        };
        let err = decode(DOC.as_bytes(), hint).unwrap_err();
        assert_eq!(err.compression, Compression::Gzip);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = decode(b"{\"a\": ", DecodeHint::default()).unwrap_err();
        assert_eq!(err.compression, Compression::None);
        assert!(err.cause.starts_with("Invalid JSON"));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let err = decode(&[b'"', 0xff, 0xfe, b'"'], DecodeHint::default()).unwrap_err();
        assert!(err.cause.contains("UTF-8"));
    }
}
