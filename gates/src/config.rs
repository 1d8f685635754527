use serde::{Deserialize, Serialize};

/// Evaluation settings shared by every sample gated with a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    /// Event count at which per-event predicates run on the rayon pool
    pub parallel_threshold: usize,
    /// Reuse extracted columns across gates sharing channel, compensation and transform
    pub cache_dimensions: bool,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 50_000,
            cache_dimensions: true,
        }
    }
}

impl GatingConfig {
    pub fn is_parallel(&self, event_count: usize) -> bool {
        event_count >= self.parallel_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: GatingConfig = serde_json::from_str(r#"{"cache_dimensions": false}"#).unwrap();
        assert_eq!(config.parallel_threshold, 50_000);
        assert!(!config.cache_dimensions);
        assert!(config.is_parallel(50_000));
        assert!(!config.is_parallel(49_999));
    }
}
