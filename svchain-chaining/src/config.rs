use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::errors::ConfigError;

///
/// Tunable parameters of a chaining run.
///
/// Every field is optional in the TOML representation; missing fields take
/// their default.
///
/// # Example
/// ```toml
/// min_templated_insertion_length = 30
/// min_sv_jcn = 0.15
/// allow_dm_chain_splits = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainingConfig {
    /// Shortest templated insertion the catalog will propose.
    pub min_templated_insertion_length: i64,
    /// SVs with a JCN below this are not chained.
    pub min_sv_jcn: f64,
    pub max_iterations_without_progress: usize,
    /// Reconciliation is skipped for clusters with more chains than this.
    pub max_reconcile_chains: usize,
    /// Let a double-minute link be absorbed by a chain whose JCN does not match it.
    pub allow_dm_chain_splits: bool,
    /// Check proposed links against the major-allele JCN of the segments they span.
    pub use_allele_jcn_limits: bool,
    pub multi_connection_max_sv_length: i64,
    pub line_max_link_distance: i64,
    pub validate_chains: bool,
    pub verbose: bool,
}

impl Default for ChainingConfig {
    fn default() -> Self {
        Self {
            min_templated_insertion_length: DEFAULT_MIN_TEMPLATED_INSERTION_LENGTH,
            min_sv_jcn: DEFAULT_MIN_SV_JCN,
            max_iterations_without_progress: DEFAULT_MAX_ITERATIONS_WITHOUT_PROGRESS,
            max_reconcile_chains: DEFAULT_MAX_RECONCILE_CHAINS,
            allow_dm_chain_splits: true,
            use_allele_jcn_limits: true,
            multi_connection_max_sv_length: DEFAULT_MULTI_CONNECTION_MAX_SV_LENGTH,
            line_max_link_distance: DEFAULT_LINE_MAX_LINK_DISTANCE,
            validate_chains: true,
            verbose: false,
        }
    }
}

impl ChainingConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_templated_insertion_length < 0 {
            return Err(ConfigError::InvalidValue(
                "min_templated_insertion_length".to_string(),
                self.min_templated_insertion_length.to_string(),
            ));
        }
        if !self.min_sv_jcn.is_finite() || self.min_sv_jcn < 0.0 {
            return Err(ConfigError::InvalidValue(
                "min_sv_jcn".to_string(),
                self.min_sv_jcn.to_string(),
            ));
        }
        if self.max_iterations_without_progress == 0 {
            return Err(ConfigError::InvalidValue(
                "max_iterations_without_progress".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_min_templated_insertion_length(mut self, length: i64) -> Self {
        self.min_templated_insertion_length = length;
        self
    }

    pub fn with_min_sv_jcn(mut self, jcn: f64) -> Self {
        self.min_sv_jcn = jcn;
        self
    }

    pub fn with_max_iterations_without_progress(mut self, iterations: usize) -> Self {
        self.max_iterations_without_progress = iterations;
        self
    }

    pub fn with_allow_dm_chain_splits(mut self, allow: bool) -> Self {
        self.allow_dm_chain_splits = allow;
        self
    }

    pub fn with_allele_jcn_limits(mut self, enabled: bool) -> Self {
        self.use_allele_jcn_limits = enabled;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_chains = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use tempfile::NamedTempFile;

    #[rstest]
    fn test_partial_toml_takes_defaults() {
        let config = ChainingConfig::from_toml_str("min_sv_jcn = 0.5\nverbose = true\n").unwrap();
        assert_eq!(config.min_sv_jcn, 0.5);
        assert!(config.verbose);
        assert_eq!(config.max_iterations_without_progress, 50);
        assert_eq!(config.min_templated_insertion_length, 30);
    }

    #[rstest]
    fn test_config_file_round_trip() {
        let file = NamedTempFile::with_suffix(".toml").unwrap();
        let config = ChainingConfig::default()
            .with_allow_dm_chain_splits(false)
            .with_min_templated_insertion_length(50);
        config.to_file(file.path()).unwrap();

        let loaded = ChainingConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[rstest]
    #[case("max_iterations_without_progress = 0")]
    #[case("min_sv_jcn = -1.0")]
    #[case("min_templated_insertion_length = -5")]
    fn test_invalid_values_are_rejected(#[case] content: &str) {
        let result = ChainingConfig::from_toml_str(content);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_, _))));
    }

    #[rstest]
    fn test_unparseable_config() {
        let result = ChainingConfig::from_toml_str("min_sv_jcn = \"high\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
