//! Consumed ports (§6): shapes the orchestrator depends on. Adapters for a
//! real documentation backend, text extractor, and gRPC detector live
//! outside this crate; only their interfaces are specified here.

use async_trait::async_trait;

use crate::types::SpaceKey;

#[derive(Clone, Debug)]
pub struct PageInfo {
    pub page_id: String,
    pub title: String,
}

#[derive(Clone, Debug)]
pub struct AttachmentInfo {
    pub name: String,
    pub content_type: String,
}

/// Errors a `DocumentationClient` call can raise. All are treated as
/// transient per §7 unless the caller decides otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentationClientError(pub String);

impl std::fmt::Display for DocumentationClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "documentation client error: {}", self.0)
    }
}

impl std::error::Error for DocumentationClientError {}

#[async_trait]
pub trait DocumentationClient: Send + Sync {
    async fn list_spaces(&self) -> Result<Vec<SpaceKey>, DocumentationClientError>;
    async fn list_pages(&self, space_key: &SpaceKey) -> Result<Vec<PageInfo>, DocumentationClientError>;
    async fn list_attachments(&self, page_id: &str) -> Result<Vec<AttachmentInfo>, DocumentationClientError>;
    async fn fetch_page_text(&self, page_id: &str) -> Result<String, DocumentationClientError>;
    async fn fetch_attachment_bytes(&self, page_id: &str, name: &str) -> Result<Vec<u8>, DocumentationClientError>;
    async fn modified_pages_since(
        &self,
        space_key: &SpaceKey,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<PageInfo>, DocumentationClientError>;
    async fn modified_attachments_since(
        &self,
        space_key: &SpaceKey,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<AttachmentInfo>, DocumentationClientError>;
}

/// Extensions the filter set in §6 recognizes as worth extracting text from.
pub const SUPPORTED_ATTACHMENT_EXTENSIONS: &[&str] =
    &["pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "rtf", "txt", "csv", "odt", "ods", "odp", "html", "htm"];

pub fn is_supported_attachment(info: &AttachmentInfo) -> bool {
    info.name
        .rsplit('.')
        .next()
        .map(|ext| SUPPORTED_ATTACHMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
pub trait AttachmentTextExtractor: Send + Sync {
    /// Returns `None` for image-only or otherwise unsupported input; never
    /// fails the enclosing page.
    async fn extract(&self, info: &AttachmentInfo, bytes: &[u8]) -> Option<String>;
}
