use std::time::Duration;

/// Runtime tunables for the broker. Producer uniqueness has no field here —
/// it is always enforced, with no override.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub max_cache_mb: u64,
    pub correction_context_size: usize,
    pub correction_enabled_source_languages: Vec<String>,
    pub default_target_language: String,
    pub stt_ping_interval: Duration,
    pub stt_ping_timeout: Duration,
    pub reconnect_backoff_schedule: Vec<Duration>,
    pub stt_finalize_timeout: Duration,
    pub artifact_root: std::path::PathBuf,
    pub viewer_channel_capacity: usize,
    pub viewer_send_failure_threshold: u32,
}

impl BrokerConfig {
    pub fn correction_eligible(&self, source_language: Option<&str>) -> bool {
        match source_language {
            Some(lang) => self
                .correction_enabled_source_languages
                .iter()
                .any(|l| l == lang),
            None => false,
        }
    }

    /// `reconnect_backoff_schedule[attempt]`, clamped to the last entry once
    /// attempts exceed the configured schedule.
    pub fn backoff_for_attempt(&self, attempt: usize) -> Duration {
        self.reconnect_backoff_schedule
            .get(attempt)
            .copied()
            .or_else(|| self.reconnect_backoff_schedule.last().copied())
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_cache_mb: 10,
            correction_context_size: 5,
            correction_enabled_source_languages: vec!["zh".to_string()],
            default_target_language: "en".to_string(),
            stt_ping_interval: Duration::from_secs(20),
            stt_ping_timeout: Duration::from_secs(10),
            reconnect_backoff_schedule: vec![
                Duration::ZERO,
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
            stt_finalize_timeout: Duration::from_secs(5),
            artifact_root: std::path::PathBuf::from("output"),
            viewer_channel_capacity: 64,
            viewer_send_failure_threshold: 3,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawBrokerConfig {
    max_cache_mb: Option<u64>,
    correction_context_size: Option<usize>,
    correction_enabled_source_languages: Option<String>,
    default_target_language: Option<String>,
    stt_ping_interval_s: Option<u64>,
    stt_ping_timeout_s: Option<u64>,
    reconnect_backoff_schedule_s: Option<String>,
    stt_finalize_timeout_s: Option<u64>,
    artifact_root: Option<String>,
    viewer_channel_capacity: Option<usize>,
    viewer_send_failure_threshold: Option<u32>,
}

impl BrokerConfig {
    /// Loads from environment variables prefixed `BROKER_`, falling back to
    /// [`Default`] for anything unset.
    pub fn from_env() -> Self {
        let raw: RawBrokerConfig = envy::prefixed("BROKER_").from_env().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "broker_config_parse_failed_using_defaults");
            RawBrokerConfig {
                max_cache_mb: None,
                correction_context_size: None,
                correction_enabled_source_languages: None,
                default_target_language: None,
                stt_ping_interval_s: None,
                stt_ping_timeout_s: None,
                reconnect_backoff_schedule_s: None,
                stt_finalize_timeout_s: None,
                artifact_root: None,
                viewer_channel_capacity: None,
                viewer_send_failure_threshold: None,
            }
        });

        let defaults = Self::default();

        Self {
            max_cache_mb: raw.max_cache_mb.unwrap_or(defaults.max_cache_mb),
            correction_context_size: raw
                .correction_context_size
                .unwrap_or(defaults.correction_context_size),
            correction_enabled_source_languages: raw
                .correction_enabled_source_languages
                .map(|s| s.split(',').map(|l| l.trim().to_string()).collect())
                .unwrap_or(defaults.correction_enabled_source_languages),
            default_target_language: raw
                .default_target_language
                .unwrap_or(defaults.default_target_language),
            stt_ping_interval: raw
                .stt_ping_interval_s
                .map(Duration::from_secs)
                .unwrap_or(defaults.stt_ping_interval),
            stt_ping_timeout: raw
                .stt_ping_timeout_s
                .map(Duration::from_secs)
                .unwrap_or(defaults.stt_ping_timeout),
            reconnect_backoff_schedule: raw
                .reconnect_backoff_schedule_s
                .map(|s| {
                    s.split(',')
                        .filter_map(|v| v.trim().parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .collect()
                })
                .unwrap_or(defaults.reconnect_backoff_schedule),
            stt_finalize_timeout: raw
                .stt_finalize_timeout_s
                .map(Duration::from_secs)
                .unwrap_or(defaults.stt_finalize_timeout),
            artifact_root: raw
                .artifact_root
                .map(std::path::PathBuf::from)
                .unwrap_or(defaults.artifact_root),
            viewer_channel_capacity: raw
                .viewer_channel_capacity
                .unwrap_or(defaults.viewer_channel_capacity),
            viewer_send_failure_threshold: raw
                .viewer_send_failure_threshold
                .unwrap_or(defaults.viewer_send_failure_threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_repeats_last_entry_past_schedule_end() {
        let config = BrokerConfig::default();
        let last = *config.reconnect_backoff_schedule.last().unwrap();
        assert_eq!(config.backoff_for_attempt(0), Duration::ZERO);
        assert_eq!(config.backoff_for_attempt(100), last);
    }

    #[test]
    fn correction_eligible_checks_configured_languages() {
        let config = BrokerConfig::default();
        assert!(config.correction_eligible(Some("zh")));
        assert!(!config.correction_eligible(Some("en")));
        assert!(!config.correction_eligible(None));
    }
}
