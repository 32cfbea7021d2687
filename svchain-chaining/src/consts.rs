pub const CHAIN_CMD: &str = "chain";
pub const DEFAULT_CONFIG_CMD: &str = "default-config";

pub const DEFAULT_OUT: &str = "chains.json";

pub const DEFAULT_MIN_TEMPLATED_INSERTION_LENGTH: i64 = 30;
pub const DEFAULT_MIN_SV_JCN: f64 = 0.15;
pub const DEFAULT_MAX_ITERATIONS_WITHOUT_PROGRESS: usize = 50;
pub const DEFAULT_MAX_RECONCILE_CHAINS: usize = 50;
pub const DEFAULT_MULTI_CONNECTION_MAX_SV_LENGTH: i64 = 5000;
pub const DEFAULT_LINE_MAX_LINK_DISTANCE: i64 = 5000;

/// Catalog building stops extending a breakend's candidates past a segment
/// whose major allele JCN falls below this.
pub const MIN_MAJOR_ALLELE_JCN: f64 = 0.5;

/// Floor of the remaining JCN at which a breakend counts as exhausted.
pub const EXHAUSTED_JCN_FLOOR: f64 = 0.25;

pub const CHAIN_DIAG_PREFIX: &str = "CHAIN_DIAG";
