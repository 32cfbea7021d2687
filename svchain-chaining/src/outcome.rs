use serde::{Deserialize, Serialize};

use svchain_core::io::BreakendRef;
use svchain_core::models::{BreakendId, LinkedPair, SvCluster};

use crate::chain::SvChain;
use crate::chain_state::SvChainState;
use crate::diagnostics::ChainDiagnosticsRecord;
use crate::errors::ChainingError;

fn external_ref(cluster: &SvCluster, breakend: BreakendId) -> BreakendRef {
    BreakendRef {
        sv: cluster.sv_id(breakend.sv),
        is_start: breakend.is_start,
    }
}

/// One link of an output chain, referring to SVs by their external ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub first: BreakendRef,
    pub second: BreakendRef,
    pub length: i64,
    pub reason: String,
    pub link_index: Option<usize>,
    pub assembled: bool,
    pub duplicate: bool,
}

impl LinkRecord {
    pub fn from_link(cluster: &SvCluster, link: &LinkedPair) -> Self {
        Self {
            first: external_ref(cluster, link.first),
            second: external_ref(cluster, link.second),
            length: link.length,
            reason: link.link_reason.clone(),
            link_index: link.link_index,
            assembled: link.is_assembled,
            duplicate: link.is_duplicate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    pub sample_id: String,
    pub cluster_id: u32,
    pub chain_id: usize,
    pub jcn: f64,
    pub jcn_uncertainty: f64,
    pub closed: bool,
    pub double_minute: bool,
    pub open_start: Option<BreakendRef>,
    pub open_end: Option<BreakendRef>,
    pub links: Vec<LinkRecord>,
}

impl ChainRecord {
    pub fn from_chain(cluster: &SvCluster, chain: &SvChain) -> Self {
        let (start, end) = chain.open_breakends(cluster);
        Self {
            sample_id: cluster.sample_id.clone(),
            cluster_id: cluster.id,
            chain_id: chain.id(),
            jcn: chain.jcn(),
            jcn_uncertainty: chain.jcn_uncertainty(),
            closed: chain.is_closed(),
            double_minute: chain.is_double_minute(),
            open_start: start.map(|b| external_ref(cluster, b)),
            open_end: end.map(|b| external_ref(cluster, b)),
            links: chain
                .links()
                .iter()
                .map(|l| LinkRecord::from_link(cluster, l))
                .collect(),
        }
    }
}

/// Everything one chaining run produced for a cluster.
#[derive(Debug, Clone)]
pub struct ChainingOutcome {
    pub cluster_id: u32,
    pub chains: Vec<SvChain>,
    pub is_valid: bool,
    pub failure: Option<ChainingError>,
    /// The search ran out of candidates rather than stagnating or failing.
    pub converged: bool,
    pub stagnated: bool,
    pub iterations: usize,
    pub links_added: usize,
    /// Final copy-number ledger, one entry per chained SV.
    pub sv_states: Vec<SvChainState>,
    pub diagnostics: ChainDiagnosticsRecord,
}

impl ChainingOutcome {
    pub fn chain_records(&self, cluster: &SvCluster) -> Vec<ChainRecord> {
        self.chains
            .iter()
            .map(|c| ChainRecord::from_chain(cluster, c))
            .collect()
    }

    pub fn sv_state(&self, sv: usize) -> Option<&SvChainState> {
        self.sv_states.iter().find(|s| s.sv == sv)
    }
}
