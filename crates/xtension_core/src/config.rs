//! Binding configuration.

use crate::error::{Result, XwfError};

/// How the growing-retry protocol enlarges its buffer between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Double the previous size.
    Doubling,
    /// Add a fixed number of bytes.
    Linear(usize),
}

/// Sizing policy for host outputs of unknown length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthPolicy {
    /// Size of the first buffer, in bytes.
    pub initial_bytes: usize,
    /// Enlargement strategy.
    pub strategy: Growth,
    /// No buffer larger than this is ever allocated.
    pub ceiling_bytes: usize,
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self {
            initial_bytes: 128,
            strategy: Growth::Doubling,
            ceiling_bytes: 64 * 1024,
        }
    }
}

impl GrowthPolicy {
    /// Returns the buffer size following `current`, or `None` once the ceiling would be crossed.
    pub fn next(&self, current: usize) -> Option<usize> {
        let next = match self.strategy {
            Growth::Doubling => current.checked_mul(2)?,
            Growth::Linear(step) => current.checked_add(step)?,
        };
        (next <= self.ceiling_bytes && next > current).then_some(next)
    }

    /// Number of attempts the policy allows before giving up.
    pub fn max_attempts(&self) -> u32 {
        let mut attempts = 1;
        let mut size = self.initial_bytes;
        while let Some(next) = self.next(size) {
            size = next;
            attempts += 1;
        }
        attempts
    }
}

/// Configuration for a host binding.
#[derive(Debug, Clone)]
pub struct BindingConfig {
    /// Growing-retry buffer policy.
    pub growth: GrowthPolicy,

    /// Separator placed before each component of a reconstructed path.
    pub path_separator: char,

    /// Deepest parent chain accepted by path reconstruction.
    pub max_path_depth: usize,

    /// Longest host-owned string decoded, in UTF-16 units.
    pub max_string_units: usize,

    /// Largest single read request, in bytes.
    pub read_chunk: u32,

    /// Filter directive for host-routed logging.
    pub log_filter: String,

    /// Ask the host not to record messages in its error log.
    pub suppress_error_log: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            growth: GrowthPolicy::default(),
            path_separator: '\\',
            max_path_depth: 4096,
            max_string_units: 1 << 20,
            read_chunk: 64 * 1024,
            log_filter: "info".to_string(),
            suppress_error_log: false,
        }
    }
}

impl BindingConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the growing-retry policy.
    #[must_use]
    pub fn growth(mut self, policy: GrowthPolicy) -> Self {
        self.growth = policy;
        self
    }

    /// Sets the path separator.
    #[must_use]
    pub fn path_separator(mut self, separator: char) -> Self {
        self.path_separator = separator;
        self
    }

    /// Sets the maximum parent-chain depth.
    #[must_use]
    pub fn max_path_depth(mut self, depth: usize) -> Self {
        self.max_path_depth = depth;
        self
    }

    /// Sets the maximum read chunk.
    #[must_use]
    pub fn read_chunk(mut self, bytes: u32) -> Self {
        self.read_chunk = bytes;
        self
    }

    /// Sets the logging filter directive.
    #[must_use]
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Sets whether host-routed messages skip the host's error log.
    #[must_use]
    pub fn suppress_error_log(mut self, value: bool) -> Self {
        self.suppress_error_log = value;
        self
    }

    /// Overlays values from `XTENSION_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_vars(|key| std::env::var(key).ok())
    }

    /// Overlays values supplied by `lookup`.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(step) = parse_var(&lookup, "XTENSION_BUFFER_STEP")? {
            self.growth.initial_bytes = step;
        }
        if let Some(ceiling) = parse_var(&lookup, "XTENSION_BUFFER_CEILING")? {
            self.growth.ceiling_bytes = ceiling;
        }
        if let Some(depth) = parse_var(&lookup, "XTENSION_MAX_PATH_DEPTH")? {
            self.max_path_depth = depth;
        }
        if let Some(chunk) = parse_var(&lookup, "XTENSION_READ_CHUNK")? {
            self.read_chunk = chunk;
        }
        if let Some(filter) = lookup("XTENSION_LOG") {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.growth.initial_bytes < 2 {
            return Err(XwfError::invalid("buffer step must hold at least one character"));
        }
        if self.growth.ceiling_bytes < self.growth.initial_bytes {
            return Err(XwfError::invalid(format!(
                "buffer ceiling {} is below the initial step {}",
                self.growth.ceiling_bytes, self.growth.initial_bytes
            )));
        }
        if self.growth.strategy == Growth::Linear(0) {
            return Err(XwfError::invalid("linear growth step must be positive"));
        }
        if self.max_path_depth == 0 {
            return Err(XwfError::invalid("path depth limit must be positive"));
        }
        if self.read_chunk == 0 {
            return Err(XwfError::invalid("read chunk must be positive"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| XwfError::invalid(format!("{key} is not a valid number: {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_policy_doubles_from_128_to_64k() {
        let policy = GrowthPolicy::default();
        assert_eq!(policy.next(128), Some(256));
        assert_eq!(policy.next(32 * 1024), Some(64 * 1024));
        assert_eq!(policy.next(64 * 1024), None);
        assert_eq!(policy.max_attempts(), 10);
    }

    #[test]
    fn linear_policy_adds_step() {
        let policy = GrowthPolicy {
            initial_bytes: 128,
            strategy: Growth::Linear(128),
            ceiling_bytes: 512,
        };
        assert_eq!(policy.next(128), Some(256));
        assert_eq!(policy.next(384), Some(512));
        assert_eq!(policy.next(512), None);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn builder_sets_fields() {
        let config = BindingConfig::new()
            .path_separator('/')
            .max_path_depth(16)
            .read_chunk(4096)
            .log_filter("debug")
            .suppress_error_log(true);
        assert_eq!(config.path_separator, '/');
        assert_eq!(config.max_path_depth, 16);
        assert_eq!(config.read_chunk, 4096);
        assert_eq!(config.log_filter, "debug");
        assert!(config.suppress_error_log);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("XTENSION_BUFFER_STEP", "256"),
            ("XTENSION_BUFFER_CEILING", "4096"),
            ("XTENSION_LOG", "xtension_core=trace"),
        ]
        .into_iter()
        .collect();
        let config = BindingConfig::default()
            .with_vars(|key| vars.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.growth.initial_bytes, 256);
        assert_eq!(config.growth.ceiling_bytes, 4096);
        assert_eq!(config.log_filter, "xtension_core=trace");
        assert_eq!(config.max_path_depth, 4096);
    }

    #[test]
    fn env_overlay_rejects_garbage() {
        let result = BindingConfig::default().with_vars(|key| {
            (key == "XTENSION_MAX_PATH_DEPTH").then(|| "deep".to_string())
        });
        assert!(matches!(result, Err(XwfError::InvalidArgument(_))));
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let config = BindingConfig::new().growth(GrowthPolicy {
            initial_bytes: 1024,
            strategy: Growth::Doubling,
            ceiling_bytes: 512,
        });
        assert!(config.validate().is_err());
        assert!(BindingConfig::new().max_path_depth(0).validate().is_err());
    }
}
