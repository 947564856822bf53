//! VM configuration

use nova_syscalls::MAX_ITERATORS_PER_CALL;
use serde::{Deserialize, Serialize};

/// Default gas limit for invocations that do not name one
pub const DEFAULT_GAS_LIMIT: u64 = 10_000_000;

/// Host-side configuration of a [`crate::NovaVm`]
///
/// Serializable so it can be embedded in the host's own config file; missing
/// fields take their default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Passed as `verbose` to every entry point
    pub verbose: bool,
    /// Maximum iterators one invocation may open
    pub iterator_limit: usize,
    /// Gas limit used when a call passes `None`
    pub default_gas_limit: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            verbose: false,
            iterator_limit: MAX_ITERATORS_PER_CALL,
            default_gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

impl VmConfig {
    /// Enable or disable verbose engine output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the per-invocation iterator limit
    pub fn with_iterator_limit(mut self, limit: usize) -> Self {
        self.iterator_limit = limit;
        self
    }

    /// Set the default gas limit
    pub fn with_default_gas_limit(mut self, gas_limit: u64) -> Self {
        self.default_gas_limit = gas_limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VmConfig::default();
        assert!(!config.verbose);
        assert_eq!(config.iterator_limit, 32_768);
        assert_eq!(config.default_gas_limit, DEFAULT_GAS_LIMIT);
    }

    #[test]
    fn test_builder() {
        let config = VmConfig::default()
            .with_verbose(true)
            .with_iterator_limit(4)
            .with_default_gas_limit(500);
        assert!(config.verbose);
        assert_eq!(config.iterator_limit, 4);
        assert_eq!(config.default_gas_limit, 500);
    }

    #[test]
    fn test_config_survives_bincode() {
        let config = VmConfig::default().with_iterator_limit(9);
        let bytes = bincode::serialize(&config).unwrap();
        let decoded: VmConfig = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, config);
    }
}
