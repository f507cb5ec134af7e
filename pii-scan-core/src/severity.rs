//! Pure functions: severity banding and scan progress (C4).

use crate::types::{PiiType, SeverityBand, SeverityCounts};

/// Table-driven `piiType -> severity band` mapping. `Unknown` has no band
/// and is excluded from `SeverityCounts` totals (§4.4, resolved open
/// question in `SPEC_FULL.md`).
pub fn severity_band(pii_type: PiiType) -> Option<SeverityBand> {
    use PiiType::*;
    match pii_type {
        Ssn | CreditCard | BankAccount | ApiKey | Token | Password => Some(SeverityBand::High),
        Phone | Email | Person | Address | DateOfBirth => Some(SeverityBand::Medium),
        Url | Ip => Some(SeverityBand::Low),
        Unknown => None,
    }
}

/// Accumulate severity counts over a page's detections.
pub fn accumulate(types: impl IntoIterator<Item = PiiType>) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for t in types {
        if let Some(band) = severity_band(t) {
            counts.add(band);
        }
    }
    counts
}

/// `(pagesDone + attachmentsDone / max(attachmentsTotalForPage,1)) /
/// max(pagesTotal,1) x 100`, clamped to `[0,100]`.
///
/// `attachmentsDone`/`attachmentsTotalForPage` are scoped to the page
/// currently in flight, per the resolved open question in
/// `SPEC_FULL.md`.
pub fn scan_progress(pages_done: u64, pages_total: u64, attachments_done: u64, attachments_total_for_page: u64) -> f64 {
    let attachment_fraction = attachments_done as f64 / (attachments_total_for_page.max(1)) as f64;
    let raw = (pages_done as f64 + attachment_fraction) / (pages_total.max(1)) as f64 * 100.0;
    raw.clamp(0.0, 100.0)
}
