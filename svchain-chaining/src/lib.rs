//! # svchain-chaining
//!
//! Reconstructs derivative-chromosome chains from a cluster of structural
//! variants. Links between breakends (templated insertions) are chosen so the
//! chains agree with each SV's junction copy number (JCN).
//!
//! ## Overview
//!
//! One [`ChainFinder`] runs per cluster and owns everything it mutates:
//!
//! - [`BreakendLinkCatalog`]: candidate links for every available breakend, shortest first
//! - [`LinkAllocator`]: the JCN ledger, chain list and skip table
//! - [`RuleSelector`]: the ordered rule cascade proposing the next links
//! - [`SvChain`]: chain primitives (extend, merge, split, duplicate, fold back, reconcile)
//! - [`LineChainer`]: nearest-neighbour pairing for LINE insertion clusters
//!
//! Progress and diagnostics are reported through a [`ChainingObserver`]
//! rather than by changing logger state. Clusters share nothing, so callers
//! may chain them in parallel.
//!
//! ## Example
//!
//! ```rust
//! use svchain_chaining::{ChainFinder, ChainingConfig, RecordingObserver};
//! use svchain_core::models::{Breakend, SvCluster, SvType, SvVarData};
//!
//! let svs = vec![
//!     SvVarData::new(1, SvType::Bnd, Breakend::new("1", 1000, -1), Some(Breakend::new("2", 100, 1)), 1.0),
//!     SvVarData::new(2, SvType::Bnd, Breakend::new("1", 1600, 1), Some(Breakend::new("3", 100, 1)), 1.0),
//! ];
//! let cluster = SvCluster::new(1, "SAMPLE", svs);
//!
//! let mut recorder = RecordingObserver::new();
//! let outcome = ChainFinder::new(&cluster, &ChainingConfig::default())
//!     .with_observer(&mut recorder)
//!     .form_chains();
//!
//! assert_eq!(outcome.chains.len(), 1);
//! assert_eq!(recorder.links_added(), 1);
//! ```
pub mod allocator;
pub mod catalog;
pub mod chain;
pub mod chain_finder;
pub mod chain_state;
pub mod config;
pub mod consts;
pub mod diagnostics;
pub mod errors;
pub mod foldback;
pub mod jcn_limits;
pub mod line_chainer;
pub mod observer;
pub mod outcome;
pub mod proposed;
pub mod rules;

// re-export for cleaner imports
pub use self::allocator::LinkAllocator;
pub use self::catalog::BreakendLinkCatalog;
pub use self::chain::SvChain;
pub use self::chain_finder::ChainFinder;
pub use self::config::ChainingConfig;
pub use self::diagnostics::{ChainDiagnosticsRecord, CsvDiagnosticsSink, DiagnosticsSink};
pub use self::errors::{ChainingError, ConfigError, DiagnosticsError};
pub use self::line_chainer::LineChainer;
pub use self::observer::{ChainingEvent, ChainingObserver, LogObserver, RecordingObserver};
pub use self::outcome::{ChainRecord, ChainingOutcome, LinkRecord};
pub use self::rules::RuleSelector;
