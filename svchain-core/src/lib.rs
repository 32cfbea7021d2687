//! # svchain-core
//!
//! Shared data model for structural-variant chaining.
//!
//! A cluster of structural variants (SVs) is loaded into an [`SvCluster`](models::SvCluster)
//! arena. Every other structure refers to a variant by its index in that arena and
//! to one of its two sides through a [`BreakendId`](models::BreakendId), so identity
//! comparisons are plain value comparisons.
//!
//! ## Modules
//!
//! - [`models`]: breakends, variants, linked pairs (templated insertions) and clusters
//! - [`io`]: serde records for cluster files and their validation into arenas
//! - [`utils`]: copy-number comparison helpers and gzip-aware readers
//!
//! ## Example
//!
//! ```rust
//! use svchain_core::models::{Breakend, BreakendId, SvCluster, SvType, SvVarData};
//!
//! let svs = vec![
//!     SvVarData::new(1, SvType::Del, Breakend::new("1", 1000, 1), Some(Breakend::new("1", 5000, -1)), 1.0),
//!     SvVarData::new(2, SvType::Del, Breakend::new("1", 5500, 1), Some(Breakend::new("1", 9000, -1)), 1.0),
//! ];
//! let cluster = SvCluster::new(1, "SAMPLE", svs);
//!
//! let link = cluster.form_link(BreakendId::end(0), BreakendId::start(1)).unwrap();
//! assert_eq!(link.length, 500);
//! ```
pub mod errors;
pub mod io;
pub mod models;
pub mod utils;

pub use errors::ClusterError;
pub use io::{ClusterRecord, read_clusters};
