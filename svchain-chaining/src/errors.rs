use thiserror::Error;

use svchain_core::models::BreakendId;

/// Conditions that invalidate chaining for a whole cluster.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainingError {
    #[error("Breakend {breakend} of SV {sv_id} received a link after being exhausted")]
    BreakendExhausted { sv_id: u32, breakend: BreakendId },

    #[error("No copy-number state for SV {0}")]
    MissingChainState(u32),

    #[error("Link {link} is shared by chains {chain1} and {chain2}")]
    SharedLink {
        link: String,
        chain1: usize,
        chain2: usize,
    },

    #[error("Chain {0} is inconsistent: {1}")]
    InconsistentChain(usize, String),

    #[error("Chain {0} not found")]
    MissingChain(usize),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialise config: {0}")]
    Serialise(#[from] toml::ser::Error),

    #[error("Invalid config value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Error, Debug)]
pub enum DiagnosticsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
