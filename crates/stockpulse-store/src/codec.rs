//! Compact text encoding for JSON values: gzip, then base64

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

use crate::StoreError;

/// Encode any serializable value into a compact string
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, StoreError> {
    let json = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Decode a string produced by [`encode`]. Malformed input yields `None`.
pub fn decode<T: DeserializeOwned>(encoded: &str) -> Option<T> {
    let compressed = match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!("codec: not base64: {}", e);
            return None;
        }
    };

    let mut json = Vec::new();
    if let Err(e) = GzDecoder::new(compressed.as_slice()).read_to_end(&mut json) {
        tracing::debug!("codec: not gzip: {}", e);
        return None;
    }

    match serde_json::from_slice(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("codec: not json: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_roundtrip_preserves_value() {
        let values = [
            json!(null),
            json!(42),
            json!("贵州茅台"),
            json!({"basic_info": {"stock_code": "600519"}, "scores": [1.5, -2, 3e10], "ok": true}),
            json!([[], {}, ""]),
        ];
        for value in values {
            let encoded = encode(&value).unwrap();
            let decoded: Option<Value> = decode(&encoded);
            assert_eq!(decoded, Some(value));
        }
    }

    #[test]
    fn test_repetitive_payload_shrinks() {
        let news: Vec<String> = (0..500)
            .map(|i| format!("news item {} about the quarterly report", i))
            .collect();
        let value = json!({ "news_data": news });
        let encoded = encode(&value).unwrap();
        assert!(encoded.len() < serde_json::to_string(&value).unwrap().len() / 2);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode::<Value>("").is_none());
        assert!(decode::<Value>("not base64 !!!").is_none());
        // valid base64, not gzip
        assert!(decode::<Value>("aGVsbG8gd29ybGQ=").is_none());
        // plain JSON is not an encoded payload
        assert!(decode::<Value>("{\"data\":1}").is_none());
    }
}
