//! Engine configuration.
//!
//! The defaults mirror the limits every caller has historically relied on:
//! pages never exceed 1000 rows, an unspecified page size means 20 rows, and
//! bulk inserts are sent in chunks of 1000 documents.

use serde::{Deserialize, Serialize};

/// Upper bound on any page, sample or bulk read.
pub const MAX_SIZE: usize = 1000;
/// Page size used when the caller asks for zero rows or does not say.
pub const DEFAULT_SIZE: usize = 20;
/// Number of documents per `insert_many` round trip in batch inserts.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Size limits applied to every page request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PageLimits {
    /// Largest page size a caller may request.
    pub max_size: usize,
    /// Page size substituted for a zero or missing size.
    pub default_size: usize,
}

impl PageLimits {
    /// Resolves a requested page size into `[1, max_size]`.
    ///
    /// Zero resolves to `default_size`, anything above `max_size` is clamped.
    pub fn clamp(&self, size: usize) -> usize {
        match size {
            0 => self.default_size.clamp(1, self.max_size.max(1)),
            size => size.min(self.max_size.max(1)),
        }
    }

    /// Clamps a bulk read limit, where zero means "as many as allowed".
    pub fn clamp_limit(&self, limit: usize) -> usize {
        match limit {
            0 => self.max_size,
            limit => limit.min(self.max_size),
        }
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            max_size: MAX_SIZE,
            default_size: DEFAULT_SIZE,
        }
    }
}

/// Configuration shared by every collection handed out by a
/// [`QueryStore`](crate::store::QueryStore).
///
/// # Example
///
/// ```ignore
/// use querylayer::config::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .with_max_size(500)
///     .with_batch_size(200)
///     .build();
///
/// assert_eq!(config.limits.clamp(5000), 500);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Page size limits.
    pub limits: PageLimits,
    /// Chunk size for batch inserts.
    pub batch_size: usize,
}

impl EngineConfig {
    /// Creates a new builder starting from the defaults.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: PageLimits::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Builder for constructing [`EngineConfig`] instances.
pub struct EngineConfigBuilder {
    max_size: Option<usize>,
    default_size: Option<usize>,
    batch_size: Option<usize>,
}

impl EngineConfigBuilder {
    /// Creates a new builder with no overrides set.
    pub fn new() -> Self {
        Self {
            max_size: None,
            default_size: None,
            batch_size: None,
        }
    }

    /// Sets the largest page size a caller may request.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Sets the page size used for zero or missing sizes.
    pub fn with_default_size(mut self, default_size: usize) -> Self {
        self.default_size = Some(default_size);
        self
    }

    /// Sets the number of documents sent per batch insert round trip.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Builds the configuration, using defaults for unset values.
    ///
    /// Zero sizes are meaningless and fall back to the defaults as well.
    pub fn build(self) -> EngineConfig {
        let non_zero = |value: Option<usize>, default: usize| {
            value.filter(|v| *v > 0).unwrap_or(default)
        };

        EngineConfig {
            limits: PageLimits {
                max_size: non_zero(self.max_size, MAX_SIZE),
                default_size: non_zero(self.default_size, DEFAULT_SIZE),
            },
            batch_size: non_zero(self.batch_size, DEFAULT_BATCH_SIZE),
        }
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_oversized_and_zero_sizes() {
        let limits = PageLimits::default();

        assert_eq!(limits.clamp(5000), 1000);
        assert_eq!(limits.clamp(0), 20);
        assert_eq!(limits.clamp(1), 1);
        assert_eq!(limits.clamp(1000), 1000);
    }

    #[test]
    fn builder_ignores_zero_overrides() {
        let config = EngineConfig::builder()
            .with_max_size(0)
            .with_default_size(50)
            .build();

        assert_eq!(config.limits.max_size, MAX_SIZE);
        assert_eq!(config.limits.default_size, 50);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn deserializes_partial_config() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "limits": { "max_size": 200 } }"#).unwrap();

        assert_eq!(config.limits.max_size, 200);
        assert_eq!(config.limits.default_size, DEFAULT_SIZE);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }
}
