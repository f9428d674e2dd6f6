//! Configuration Module - Bridge Tuning Parameters

use thiserror::Error;

/// Bridge configuration
///
/// # Examples
///
/// ```rust
/// use xref_bridge::BridgeConfig;
///
/// // Give up on a proxy after 1000 consecutive deferrals
/// let config = BridgeConfig {
///     max_deferrals: Some(1000),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Consecutive deferrals after which a proxy is abandoned
    ///
    /// An abandoned proxy stops re-arming its finalizer and deliberately
    /// leaks its foreign reference, toggle notification and callbacks, with a
    /// warning. Re-wrapping the handle later revives it.
    /// If None, a proxy is deferred for as long as the foreign side keeps it.
    ///
    /// Default: None
    pub max_deferrals: Option<u32>,

    /// Request a collection when the foreign side drops its extra reference
    ///
    /// Default: true
    pub collect_on_last_reference: bool,

    /// Request a collection when a finalizer finds its registry resurrected
    ///
    /// Default: true
    pub collect_on_resurrection: bool,

    /// Keep emitted events in memory (see [`crate::logging::EventLog`])
    ///
    /// Default: false
    pub record_events: bool,

    /// Render logged events as JSON instead of plain text
    ///
    /// Default: false
    pub json_events: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_deferrals: None,
            collect_on_last_reference: true,
            collect_on_resurrection: true,
            record_events: false,
            json_events: false,
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_deferrals == Some(0) {
            return Err(ConfigError::InvalidDeferralLimit(
                "max_deferrals must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid deferral limit: {0}")]
    InvalidDeferralLimit(String),
}
