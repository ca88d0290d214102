//! Cold-storage blob format and key layout.
//!
//! One object per conversation per month: `archives/{conversation}/{YYYY-MM}.json.gz`,
//! a gzip-compressed JSON array of [`ArchivedMessage`]. Objects are immutable;
//! mutable per-message state lives in the metadata store and is overlaid at
//! read time.

use crate::error::{AppError, AppResult};
use crate::models::ArchivedMessage;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn archive_object_key(conversation: &str, month: &str) -> String {
    format!("archives/{conversation}/{month}.json.gz")
}

/// Cache key for the decoded-blob cache in front of object storage.
pub fn archive_cache_key(conversation: &str, month: &str) -> String {
    format!("archive:{conversation}:{month}")
}

pub fn encode_blob(messages: &[ArchivedMessage]) -> AppResult<Vec<u8>> {
    let json = serde_json::to_vec(messages)
        .map_err(|e| AppError::DataIntegrity(format!("encode archive blob: {e}")))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|_| encoder.finish())
        .map_err(|e| AppError::Store(format!("gzip archive blob: {e}")))
}

pub fn decode_blob(bytes: &[u8]) -> AppResult<Vec<ArchivedMessage>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| AppError::DataIntegrity(format!("gunzip archive blob: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| AppError::DataIntegrity(format!("decode archive blob: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn blob_round_trip() {
        let messages = vec![ArchivedMessage {
            message_id: Uuid::now_v7(),
            sender_id: Uuid::new_v4(),
            receiver_id: Some(Uuid::new_v4()),
            group_id: None,
            content: "archived hello".into(),
            content_type: ContentType::Text,
            media_urls: None,
            product_id: None,
            is_marketplace: false,
            created_at: Utc::now(),
        }];
        let blob = encode_blob(&messages).unwrap();
        let back = decode_blob(&blob).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].message_id, messages[0].message_id);
        assert_eq!(back[0].content, messages[0].content);
    }

    #[test]
    fn garbage_blob_is_a_data_integrity_error() {
        let err = decode_blob(b"not gzip at all").unwrap_err();
        assert!(matches!(err, AppError::DataIntegrity(_)));
    }

    #[test]
    fn key_layout() {
        assert_eq!(
            archive_object_key("group_abc", "2026-07"),
            "archives/group_abc/2026-07.json.gz"
        );
        assert_eq!(archive_cache_key("group_abc", "2026-07"), "archive:group_abc:2026-07");
    }
}
