//! Core scan pipeline: detect PII across a documentation space tree, mask
//! and encrypt what it finds, checkpoint progress per space, and publish a
//! live, replayable event stream.
//!
//! Consumed ports ([`ports::DocumentationClient`], [`ports::AttachmentTextExtractor`],
//! [`detector::PiiDetector`]) are supplied by adapters outside this crate;
//! everything here is the orchestration core.

pub mod checkpoint;
pub mod config;
pub mod context;
pub mod detector;
pub mod error;
pub mod event_factory;
pub mod event_store;
pub mod orchestrator;
pub mod ports;
pub mod resume;
pub mod severity;
pub mod task_manager;
pub mod types;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, SharedCheckpointStore};
pub use config::ScanConfig;
pub use context::{extract_context, ContextBounds, DetectionSpan};
pub use detector::{DetectorGateway, PiiDetector, SensitiveData};
pub use event_store::{EventStore, InMemoryEventStore, IntegrityChainedEventStore, SharedEventStore};
pub use orchestrator::ScanOrchestrator;
pub use resume::ResumeOrchestrator;
pub use task_manager::ScanTaskManager;
pub use types::{
    CheckpointStatus, DetectedEntity, EventType, Initiator, PiiType, ScanEventRecord, ScanId, SeverityBand, SeverityCounts,
    SpaceCheckpoint, SpaceKey,
};
