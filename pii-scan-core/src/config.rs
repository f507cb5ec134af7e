//! Scan configuration (§6), loaded from the process environment the way
//! the surrounding ecosystem loads its own service configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use pii_envelope::Kek;

#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub kek: Arc<Kek>,
    pub detector_threshold: f64,
    pub detector_timeout: Duration,
    pub page_concurrency: usize,
    pub attachment_concurrency: usize,
    pub replay_buffer_size: usize,
    pub scan_ttl: Duration,
    pub keepalive_interval: Duration,
    pub context_max_length: usize,
    pub context_side_length: usize,
}

impl ScanConfig {
    /// Loads configuration from `PII_SCAN_*` environment variables. `kek`
    /// (base64, 32 bytes) is the only required setting; everything else
    /// falls back to the §6 defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let kek_b64 = std::env::var("PII_SCAN_KEK").map_err(|_| ConfigError::MissingKek)?;
        let kek = Arc::new(Kek::from_base64(&kek_b64).map_err(|e| ConfigError::InvalidKek(e.to_string()))?);

        let detector_threshold = env_parse("PII_SCAN_DETECTOR_THRESHOLD", 0.5)?;
        let detector_timeout_ms = env_parse("PII_SCAN_DETECTOR_TIMEOUT_MS", 1500u64)?;
        let page_concurrency = env_parse("PII_SCAN_PAGE_CONCURRENCY", 4usize)?;
        let attachment_concurrency = env_parse("PII_SCAN_ATTACHMENT_CONCURRENCY", 2usize)?;
        let replay_buffer_size = env_parse("PII_SCAN_REPLAY_BUFFER_SIZE", 1000usize)?;
        let scan_ttl_secs = env_parse("PII_SCAN_TTL_SECS", 3600u64)?;
        let keepalive_interval_secs = env_parse("PII_SCAN_KEEPALIVE_INTERVAL_SECS", 15u64)?;
        let context_max_length = env_parse("PII_SCAN_CONTEXT_MAX_LENGTH", 240usize)?;
        let context_side_length = env_parse("PII_SCAN_CONTEXT_SIDE_LENGTH", 120usize)?;

        Ok(Self {
            kek,
            detector_threshold,
            detector_timeout: Duration::from_millis(detector_timeout_ms),
            page_concurrency,
            attachment_concurrency,
            replay_buffer_size,
            scan_ttl: Duration::from_secs(scan_ttl_secs),
            keepalive_interval: Duration::from_secs(keepalive_interval_secs),
            context_max_length,
            context_side_length,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_kek_is_fatal() {
        std::env::remove_var("PII_SCAN_KEK");
        assert!(matches!(ScanConfig::from_env(), Err(ConfigError::MissingKek)));
    }

    #[test]
    fn malformed_numeric_override_is_rejected() {
        std::env::set_var("PII_SCAN_KEK", base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [7u8; 32]));
        std::env::set_var("PII_SCAN_PAGE_CONCURRENCY", "not-a-number");
        let err = ScanConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        std::env::remove_var("PII_SCAN_PAGE_CONCURRENCY");
        std::env::remove_var("PII_SCAN_KEK");
    }
}
