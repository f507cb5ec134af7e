//! Core entities: `Scan`, `SpaceCheckpoint`, `ScanEventRecord`, `DetectedEntity`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Random, unique, immutable identifier for one scan run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(String);

impl ScanId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand_core::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

use rand_core::RngCore;

/// Key of a documentation space, e.g. `"DEMO"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceKey(String);

impl SpaceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PII type / severity
// ---------------------------------------------------------------------------

/// Normalized, uppercase PII type. Unknown wire values collapse to
/// `Unknown` rather than failing the item (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PiiType {
    Ssn,
    CreditCard,
    BankAccount,
    ApiKey,
    Token,
    Password,
    Phone,
    Email,
    Person,
    Address,
    DateOfBirth,
    Url,
    Ip,
    Unknown,
}

impl PiiType {
    /// Map a normalized (already-uppercased) wire string to a domain type.
    /// Anything unrecognized maps to `Unknown`.
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "SSN" => Self::Ssn,
            "CREDIT_CARD" | "CREDIT-CARD" | "CREDITCARD" => Self::CreditCard,
            "BANK_ACCOUNT" | "BANK-ACCOUNT" | "BANKACCOUNT" => Self::BankAccount,
            "API_KEY" | "API-KEY" | "APIKEY" => Self::ApiKey,
            "TOKEN" => Self::Token,
            "PASSWORD" => Self::Password,
            "PHONE" => Self::Phone,
            "EMAIL" => Self::Email,
            "PERSON" | "NAME" => Self::Person,
            "ADDRESS" => Self::Address,
            "DATE_OF_BIRTH" | "DOB" => Self::DateOfBirth,
            "URL" => Self::Url,
            "IP" | "IP_ADDRESS" => Self::Ip,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ssn => "SSN",
            Self::CreditCard => "CREDIT_CARD",
            Self::BankAccount => "BANK_ACCOUNT",
            Self::ApiKey => "API_KEY",
            Self::Token => "TOKEN",
            Self::Password => "PASSWORD",
            Self::Phone => "PHONE",
            Self::Email => "EMAIL",
            Self::Person => "PERSON",
            Self::Address => "ADDRESS",
            Self::DateOfBirth => "DATE_OF_BIRTH",
            Self::Url => "URL",
            Self::Ip => "IP",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for PiiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Severity band a `PiiType` falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeverityBand {
    Low,
    Medium,
    High,
}

/// `{high, medium, low}` counts, summed across a page's detections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl SeverityCounts {
    pub fn total(&self) -> u32 {
        self.high + self.medium + self.low
    }

    pub fn add(&mut self, band: SeverityBand) {
        match band {
            SeverityBand::High => self.high += 1,
            SeverityBand::Medium => self.medium += 1,
            SeverityBand::Low => self.low += 1,
        }
    }

    /// The maximum non-zero band present, or `None` if all counts are zero.
    pub fn max_band(&self) -> Option<SeverityBand> {
        if self.high > 0 {
            Some(SeverityBand::High)
        } else if self.medium > 0 {
            Some(SeverityBand::Medium)
        } else if self.low > 0 {
            Some(SeverityBand::Low)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Detected entity
// ---------------------------------------------------------------------------

/// One detection within a page or attachment's extracted text.
///
/// `sensitive_value`/`sensitive_context` hold envelope tokens once
/// encrypted by the orchestrator; `masked_context` is always cleartext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectedEntity {
    pub pii_type: PiiType,
    pub pii_type_label: String,
    pub start_position: usize,
    pub end_position: usize,
    pub confidence: f64,
    pub sensitive_value: String,
    pub sensitive_context: String,
    pub masked_context: String,
}

impl DetectedEntity {
    /// `0 <= start < end <= len(source)`.
    pub fn is_well_formed(&self, source_len: usize) -> bool {
        self.start_position < self.end_position && self.end_position <= source_len
    }
}

// ---------------------------------------------------------------------------
// Space checkpoint
// ---------------------------------------------------------------------------

/// Who is allowed to request a checkpoint status transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Initiator {
    System,
    User,
}

/// Per-(scanId, spaceKey) progress and lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointStatus {
    NotStarted,
    Running,
    Paused,
    Completed,
    Failed,
}

impl CheckpointStatus {
    /// Valid transition targets from this status, per the table in §4.5 —
    /// without regard to initiator. Use [`Self::allowed_initiators`] for
    /// the initiator constraint on a given target.
    pub fn valid_transitions(&self) -> &'static [CheckpointStatus] {
        match self {
            Self::NotStarted => &[Self::NotStarted, Self::Running],
            Self::Running => &[Self::Running, Self::Paused, Self::Completed, Self::Failed],
            Self::Paused => &[Self::Paused, Self::Running, Self::Completed],
            Self::Completed => &[Self::Completed],
            Self::Failed => &[Self::Failed, Self::Running],
        }
    }

    /// Initiators allowed to drive `self -> target`. Empty if the
    /// transition itself is invalid (check [`Self::can_transition_to`]
    /// first to distinguish "disallowed initiator" from "no such edge").
    pub fn allowed_initiators(&self, target: CheckpointStatus) -> &'static [Initiator] {
        use CheckpointStatus::*;
        use Initiator::*;
        match (self, target) {
            (NotStarted, NotStarted) => &[System, User],
            (NotStarted, Running) => &[System],
            (Running, Running) => &[System, User],
            (Running, Paused) => &[User],
            (Running, Completed) => &[System],
            (Running, Failed) => &[System],
            (Paused, Paused) => &[System, User],
            (Paused, Running) => &[User],
            (Paused, Completed) => &[System],
            (Completed, Completed) => &[System, User],
            (Failed, Failed) => &[System, User],
            (Failed, Running) => &[User],
            _ => &[],
        }
    }

    pub fn can_transition_to(&self, target: CheckpointStatus, initiator: Initiator) -> bool {
        self.valid_transitions().contains(&target) && self.allowed_initiators(target).contains(&initiator)
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Durable record of how far a scan progressed in one space.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpaceCheckpoint {
    pub scan_id: ScanId,
    pub space_key: SpaceKey,
    pub last_processed_page_id: Option<String>,
    pub last_processed_attachment_name: Option<String>,
    pub status: CheckpointStatus,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    pub progress_percentage: f64,
}

impl SpaceCheckpoint {
    pub fn new_not_started(scan_id: ScanId, space_key: SpaceKey) -> Self {
        Self {
            scan_id,
            space_key,
            last_processed_page_id: None,
            last_processed_attachment_name: None,
            status: CheckpointStatus::NotStarted,
            updated_at: Utc::now(),
            version: 0,
            progress_percentage: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan event record
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    MultiStart,
    Start,
    PageStart,
    Item,
    AttachmentItem,
    PageComplete,
    ScanError,
    Complete,
    MultiComplete,
    Keepalive,
}

/// Append-only record; primary key `(scanId, eventSeq)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanEventRecord {
    pub scan_id: ScanId,
    pub event_seq: u64,
    pub space_key: Option<SpaceKey>,
    pub event_type: EventType,
    pub page_id: Option<String>,
    pub page_title: Option<String>,
    pub attachment_name: Option<String>,
    pub attachment_type: Option<String>,
    pub masked_content: Option<String>,
    pub detected_entities: Vec<DetectedEntity>,
    pub severity_counts: SeverityCounts,
    pub type_counts: HashMap<String, u32>,
    pub progress_percentage: f64,
    pub ts: DateTime<Utc>,
    pub is_final: bool,
    pub error_message: Option<String>,
}
