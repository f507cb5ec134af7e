//! Event factory (C4, construction half): builds immutable `ScanEventRecord`s,
//! applying C1 encryption to `sensitiveValue`/`sensitiveContext` and C2
//! masking to `maskedContext` before anything is persisted or published.
//! `eventSeq` is left at 0 here; the event store assigns it on append.

use std::collections::HashMap;

use chrono::Utc;

use pii_envelope::{EncryptionMetadata, Envelope, EnvelopeError, Kek};

use crate::context::{extract_context, ContextBounds, DetectionSpan};
use crate::detector::SensitiveData;
use crate::severity::accumulate;
use crate::types::{DetectedEntity, EventType, ScanEventRecord, ScanId, SeverityCounts, SpaceKey};

/// Encrypts `value`/`context` for one detection and computes its masked
/// context, yielding a `DetectedEntity` ready for persistence.
pub fn build_detected_entity(
    source: &str,
    all_detections: &[DetectionSpan],
    detection: &SensitiveData,
    kek: &Kek,
    bounds: ContextBounds,
) -> Result<DetectedEntity, EnvelopeError> {
    let span = DetectionSpan { start: detection.start, end: detection.end, pii_type: detection.pii_type };
    let masked_context = extract_context(source, all_detections, span, bounds);

    let metadata = EncryptionMetadata::new(detection.pii_type.label(), detection.start, detection.end);
    let envelope = Envelope::new();
    let sensitive_value = envelope.encrypt(kek, &metadata, detection.value.as_bytes())?;
    let sensitive_context = envelope.encrypt(kek, &metadata, detection.context.as_bytes())?;

    Ok(DetectedEntity {
        pii_type: detection.pii_type,
        pii_type_label: detection.pii_type.label().to_string(),
        start_position: detection.start,
        end_position: detection.end,
        confidence: detection.score,
        sensitive_value,
        sensitive_context,
        masked_context,
    })
}

fn type_counts(entities: &[DetectedEntity]) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for e in entities {
        *counts.entry(e.pii_type_label.clone()).or_insert(0) += 1;
    }
    counts
}

fn severity_counts(entities: &[DetectedEntity]) -> SeverityCounts {
    accumulate(entities.iter().map(|e| e.pii_type))
}

fn base_record(scan_id: &ScanId, space_key: Option<SpaceKey>, event_type: EventType) -> ScanEventRecord {
    ScanEventRecord {
        scan_id: scan_id.clone(),
        event_seq: 0,
        space_key,
        event_type,
        page_id: None,
        page_title: None,
        attachment_name: None,
        attachment_type: None,
        masked_content: None,
        detected_entities: Vec::new(),
        severity_counts: SeverityCounts::default(),
        type_counts: HashMap::new(),
        progress_percentage: 0.0,
        ts: Utc::now(),
        is_final: false,
        error_message: None,
    }
}

pub fn multi_start(scan_id: &ScanId) -> ScanEventRecord {
    base_record(scan_id, None, EventType::MultiStart)
}

pub fn multi_complete(scan_id: &ScanId) -> ScanEventRecord {
    let mut record = base_record(scan_id, None, EventType::MultiComplete);
    record.progress_percentage = 100.0;
    record.is_final = true;
    record
}

pub fn space_start(scan_id: &ScanId, space_key: SpaceKey) -> ScanEventRecord {
    base_record(scan_id, Some(space_key), EventType::Start)
}

pub fn space_complete(scan_id: &ScanId, space_key: SpaceKey, progress_percentage: f64) -> ScanEventRecord {
    let mut record = base_record(scan_id, Some(space_key), EventType::Complete);
    record.progress_percentage = progress_percentage;
    record
}

pub fn page_start(scan_id: &ScanId, space_key: SpaceKey, page_id: String, page_title: String) -> ScanEventRecord {
    let mut record = base_record(scan_id, Some(space_key), EventType::PageStart);
    record.page_id = Some(page_id);
    record.page_title = Some(page_title);
    record
}

pub fn item(
    scan_id: &ScanId,
    space_key: SpaceKey,
    page_id: String,
    masked_content: Option<String>,
    entities: Vec<DetectedEntity>,
    progress_percentage: f64,
) -> ScanEventRecord {
    let mut record = base_record(scan_id, Some(space_key), EventType::Item);
    record.page_id = Some(page_id);
    record.masked_content = masked_content;
    record.type_counts = type_counts(&entities);
    record.severity_counts = severity_counts(&entities);
    record.detected_entities = entities;
    record.progress_percentage = progress_percentage;
    record
}

pub fn attachment_item(
    scan_id: &ScanId,
    space_key: SpaceKey,
    page_id: String,
    attachment_name: String,
    attachment_type: String,
    entities: Vec<DetectedEntity>,
    progress_percentage: f64,
) -> ScanEventRecord {
    let mut record = base_record(scan_id, Some(space_key), EventType::AttachmentItem);
    record.page_id = Some(page_id);
    record.attachment_name = Some(attachment_name);
    record.attachment_type = Some(attachment_type);
    record.type_counts = type_counts(&entities);
    record.severity_counts = severity_counts(&entities);
    record.detected_entities = entities;
    record.progress_percentage = progress_percentage;
    record
}

pub fn page_complete(scan_id: &ScanId, space_key: SpaceKey, page_id: String, progress_percentage: f64) -> ScanEventRecord {
    let mut record = base_record(scan_id, Some(space_key), EventType::PageComplete);
    record.page_id = Some(page_id);
    record.progress_percentage = progress_percentage;
    record
}

pub fn scan_error(scan_id: &ScanId, space_key: Option<SpaceKey>, page_id: Option<String>, message: String) -> ScanEventRecord {
    let mut record = base_record(scan_id, space_key, EventType::ScanError);
    record.page_id = page_id;
    record.error_message = Some(message);
    record
}

pub fn keepalive(scan_id: &ScanId) -> ScanEventRecord {
    base_record(scan_id, None, EventType::Keepalive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PiiType;

    #[test]
    fn detected_entity_value_is_envelope_encrypted_and_context_is_masked() {
        let kek = Kek::from_bytes([9u8; 32]);
        let source = "Contact: alice@example.com for details";
        let detection = SensitiveData {
            pii_type: PiiType::Email,
            value: "alice@example.com".into(),
            context: "alice@example.com".into(),
            start: 9,
            end: 26,
            score: 0.96,
            selector: "pii-entity-email".into(),
        };
        let span = DetectionSpan { start: 9, end: 26, pii_type: PiiType::Email };
        let entity = build_detected_entity(source, &[span], &detection, &kek, ContextBounds::default()).unwrap();

        assert!(entity.sensitive_value.starts_with("ENC:v1:"));
        assert!(entity.sensitive_context.starts_with("ENC:v1:"));
        assert_eq!(entity.masked_context, "Contact: [EMAIL] for details");
        assert!(!entity.masked_context.contains("alice@example.com"));
    }

    #[test]
    fn item_event_aggregates_type_and_severity_counts() {
        let kek = Kek::from_bytes([3u8; 32]);
        let source = "email a@b.com ssn 123-45-6789";
        let spans = [DetectionSpan { start: 6, end: 13, pii_type: PiiType::Email }, DetectionSpan { start: 18, end: 29, pii_type: PiiType::Ssn }];
        let detections = [
            SensitiveData { pii_type: PiiType::Email, value: "a@b.com".into(), context: String::new(), start: 6, end: 13, score: 0.9, selector: String::new() },
            SensitiveData { pii_type: PiiType::Ssn, value: "123-45-6789".into(), context: String::new(), start: 18, end: 29, score: 0.9, selector: String::new() },
        ];
        let entities: Vec<DetectedEntity> =
            detections.iter().map(|d| build_detected_entity(source, &spans, d, &kek, ContextBounds::default()).unwrap()).collect();

        let record = item(&ScanId::new("s1"), SpaceKey::new("DEMO"), "p1".into(), Some("masked".into()), entities, 10.0);
        assert_eq!(record.severity_counts.high, 1);
        assert_eq!(record.severity_counts.medium, 1);
        assert_eq!(*record.type_counts.get("EMAIL").unwrap(), 1);
    }
}
