//! AS4 payload compression
//!
//! Attachments are gzip compressed. The compressed payload carries the
//! `CompressionType` part property and the original media type in `MimeType`.
//! Payloads in the SOAP body are never compressed.

use std::io::{Read, Write};
use tracing::debug;

use crate::domain::entities::{Containment, Payload, UserMessage};
use crate::error::{MshError, Result};

pub const COMPRESSION_TYPE_PROPERTY: &str = "CompressionType";
pub const MIME_TYPE_PROPERTY: &str = "MimeType";
pub const GZIP_MIME_TYPE: &str = "application/gzip";

pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| MshError::Internal(format!("Gzip compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| MshError::Internal(format!("Gzip compression failed: {}", e)))
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| MshError::Packaging(format!("Gzip decompression failed: {}", e)))?;
    Ok(decompressed)
}

pub fn is_compressed(payload: &Payload) -> bool {
    payload.property(COMPRESSION_TYPE_PROPERTY) == Some(GZIP_MIME_TYPE)
}

/// Compress the content of all uncompressed attachments. The compressed
/// content is written next to the original as `<location>.gz`.
pub async fn compress_payloads(um: &mut UserMessage) -> Result<usize> {
    let mut compressed = 0;
    for payload in um.payloads.iter_mut() {
        if payload.containment == Containment::Body || is_compressed(payload) {
            continue;
        }
        let Some(location) = payload.content_location.clone() else {
            continue;
        };

        let content = tokio::fs::read(&location).await?;
        let target = format!("{}.gz", location);
        tokio::fs::write(&target, gzip(&content)?).await?;

        let original_type = payload
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        payload.set_property(MIME_TYPE_PROPERTY, original_type);
        payload.set_property(COMPRESSION_TYPE_PROPERTY, GZIP_MIME_TYPE);
        payload.mime_type = Some(GZIP_MIME_TYPE.to_string());
        payload.content_location = Some(target);
        compressed += 1;
        debug!(payload_id = %payload.payload_id, "Compressed payload");
    }
    Ok(compressed)
}

/// Restore the original content of compressed payloads
pub async fn decompress_payloads(um: &mut UserMessage) -> Result<usize> {
    let mut decompressed = 0;
    for payload in um.payloads.iter_mut() {
        if !is_compressed(payload) {
            continue;
        }
        let Some(location) = payload.content_location.clone() else {
            continue;
        };

        let content = gunzip(&tokio::fs::read(&location).await?)?;
        let target = location
            .strip_suffix(".gz")
            .map(String::from)
            .unwrap_or_else(|| format!("{}.raw", location));
        tokio::fs::write(&target, content).await?;

        payload.mime_type = payload.property(MIME_TYPE_PROPERTY).map(String::from);
        payload.properties.retain(|p| p.name != COMPRESSION_TYPE_PROPERTY);
        payload.content_location = Some(target);
        decompressed += 1;
        debug!(payload_id = %payload.payload_id, "Decompressed payload");
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CollaborationInfo, TradingPartner};

    fn message_with(payloads: Vec<Payload>) -> UserMessage {
        let mut um = UserMessage::new(
            TradingPartner::default(),
            TradingPartner::default(),
            CollaborationInfo::default(),
        );
        um.payloads = payloads;
        um
    }

    #[tokio::test]
    async fn test_attachments_are_compressed_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        let attachment = dir.path().join("order.xml");
        let body = dir.path().join("body.xml");
        tokio::fs::write(&attachment, "<order>42</order>").await.unwrap();
        tokio::fs::write(&body, "<body/>").await.unwrap();

        let mut um = message_with(vec![
            Payload::new(Containment::Attachment).with_content(attachment.to_string_lossy(), "application/xml"),
            Payload::new(Containment::Body).with_content(body.to_string_lossy(), "application/xml"),
        ]);

        assert_eq!(compress_payloads(&mut um).await.unwrap(), 1);
        let compressed = &um.payloads[0];
        assert!(is_compressed(compressed));
        assert_eq!(compressed.mime_type.as_deref(), Some(GZIP_MIME_TYPE));
        assert_eq!(compressed.property(MIME_TYPE_PROPERTY), Some("application/xml"));
        assert!(!is_compressed(&um.payloads[1]));

        // already compressed payloads are left alone
        assert_eq!(compress_payloads(&mut um).await.unwrap(), 0);

        tokio::fs::remove_file(&attachment).await.unwrap();
        assert_eq!(decompress_payloads(&mut um).await.unwrap(), 1);
        let restored = &um.payloads[0];
        assert_eq!(restored.mime_type.as_deref(), Some("application/xml"));
        let content = tokio::fs::read_to_string(restored.content_location.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(content, "<order>42</order>");
    }

    #[test]
    fn test_corrupt_content_fails() {
        assert!(gunzip(b"not gzip").is_err());
        assert_eq!(gunzip(&gzip(b"abc").unwrap()).unwrap(), b"abc");
    }
}
