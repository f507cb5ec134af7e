//! Detector Gateway (C3): a uniform call to the detection microservice.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PiiDetectionException;
use crate::types::PiiType;

/// Raw entity as returned over the wire, before type normalization.
#[derive(Clone, Debug)]
pub struct WireEntity {
    pub text: String,
    pub pii_type_raw: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
}

/// `{entities[], summary{type->count}, maskedContent}` per §6.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    pub entities: Vec<WireEntity>,
    pub summary: std::collections::HashMap<String, u32>,
    pub masked_content: Option<String>,
}

/// The external PII detection microservice, consumed over gRPC in
/// production. Only the call shape is specified here (§6); adapters own
/// the wire protocol.
#[async_trait]
pub trait PiiDetector: Send + Sync {
    async fn analyze(&self, content: &str, threshold: f64, deadline: Duration) -> Result<DetectionResult, PiiDetectionException>;
}

/// Normalized detection produced for the orchestrator.
#[derive(Clone, Debug)]
pub struct SensitiveData {
    pub pii_type: PiiType,
    pub value: String,
    pub context: String,
    pub start: usize,
    pub end: usize,
    pub score: f64,
    pub selector: String,
}

/// Wraps a `PiiDetector`, applying the deadline, the wire-type-to-domain
/// mapping, and the §4.3 `SensitiveData` shape.
pub struct DetectorGateway<D: PiiDetector> {
    detector: D,
    threshold: f64,
    deadline: Duration,
}

impl<D: PiiDetector> DetectorGateway<D> {
    pub fn new(detector: D, threshold: f64, deadline: Duration) -> Self {
        Self { detector, threshold, deadline }
    }

    pub async fn analyze(&self, content: &str) -> Result<Vec<SensitiveData>, PiiDetectionException> {
        Ok(self.analyze_with_masked_content(content).await?.0)
    }

    /// Same normalization as [`Self::analyze`], additionally returning the
    /// detector's own whole-content `maskedContent` when it supplied one.
    pub async fn analyze_with_masked_content(&self, content: &str) -> Result<(Vec<SensitiveData>, Option<String>), PiiDetectionException> {
        let result = self.detector.analyze(content, self.threshold, self.deadline).await?;
        let entities = result
            .entities
            .into_iter()
            .filter(|e| e.end > e.start)
            .map(|e| {
                let pii_type = PiiType::from_wire(&e.pii_type_raw);
                if pii_type == PiiType::Unknown {
                    tracing::warn!(raw = %e.pii_type_raw, "unrecognized PII type from detector");
                }
                SensitiveData {
                    context: format!("Detected at {}-{} (conf: {:.2})", e.start, e.end, e.score),
                    selector: format!("pii-entity-{}", pii_type.label().to_ascii_lowercase()),
                    start: e.start,
                    end: e.end,
                    score: e.score,
                    value: e.text,
                    pii_type,
                }
            })
            .collect();
        Ok((entities, result.masked_content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector {
        result: DetectionResult,
    }

    #[async_trait]
    impl PiiDetector for FixedDetector {
        async fn analyze(&self, _content: &str, _threshold: f64, _deadline: Duration) -> Result<DetectionResult, PiiDetectionException> {
            Ok(self.result.clone())
        }
    }

    #[tokio::test]
    async fn maps_known_type_exact_uppercase() {
        let detector = FixedDetector {
            result: DetectionResult {
                entities: vec![WireEntity { text: "alice@example.com".into(), pii_type_raw: "EMAIL".into(), start: 9, end: 26, score: 0.96 }],
                ..Default::default()
            },
        };
        let gateway = DetectorGateway::new(detector, 0.5, Duration::from_millis(1500));
        let found = gateway.analyze("Contact: alice@example.com").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pii_type.label(), "EMAIL");
        assert_eq!(found[0].selector, "pii-entity-email");
    }

    #[tokio::test]
    async fn unknown_wire_type_maps_to_unknown() {
        let detector = FixedDetector {
            result: DetectionResult {
                entities: vec![WireEntity { text: "x".into(), pii_type_raw: "SOMETHING_NEW".into(), start: 0, end: 1, score: 0.5 }],
                ..Default::default()
            },
        };
        let gateway = DetectorGateway::new(detector, 0.5, Duration::from_millis(1500));
        let found = gateway.analyze("x").await.unwrap();
        assert_eq!(found[0].pii_type.label(), "UNKNOWN");
    }

    #[tokio::test]
    async fn zero_length_detections_are_rejected() {
        let detector = FixedDetector {
            result: DetectionResult {
                entities: vec![WireEntity { text: "".into(), pii_type_raw: "EMAIL".into(), start: 5, end: 5, score: 0.9 }],
                ..Default::default()
            },
        };
        let gateway = DetectorGateway::new(detector, 0.5, Duration::from_millis(1500));
        let found = gateway.analyze("anything").await.unwrap();
        assert!(found.is_empty());
    }
}
