use std::collections::BTreeMap;

use fxhash::FxHashSet;
use log::debug;

use svchain_core::models::{BreakendId, LinkedPair, SvCluster};

use crate::chain::{ChainCounters, SvChain, reconcile_chains};
use crate::chain_state::SvChainState;
use crate::config::ChainingConfig;

const LINE_LINK_REASON: &str = "LINE";

///
/// Chains a LINE insertion cluster by pairing nearby facing breakends.
///
/// Copy number plays no part in choosing links: each breakend takes at most
/// one link, shortest candidates first, and every chain carries the lowest
/// JCN of the SVs it runs through.
///
#[derive(Debug)]
pub struct LineChainer<'a> {
    cluster: &'a SvCluster,
    config: &'a ChainingConfig,
    counters: ChainCounters,
    chains: Vec<SvChain>,
    sv_states: BTreeMap<usize, SvChainState>,
    link_index: usize,
}

impl<'a> LineChainer<'a> {
    pub fn new(cluster: &'a SvCluster, config: &'a ChainingConfig) -> Self {
        let sv_states = cluster
            .svs()
            .iter()
            .enumerate()
            .map(|(i, sv)| {
                (
                    i,
                    SvChainState::new(i, sv.jcn, sv.jcn_uncertainty, sv.is_single_ended()),
                )
            })
            .collect();

        Self {
            cluster,
            config,
            counters: ChainCounters::new(),
            chains: Vec::new(),
            sv_states,
            link_index: 0,
        }
    }

    /// Facing pairs from different SVs within the LINE link distance,
    /// shortest first.
    pub fn candidate_links(&self) -> Vec<LinkedPair> {
        let mut links = Vec::new();

        for breakends in self.cluster.chr_breakend_map().values() {
            for (i, &lower) in breakends.iter().enumerate() {
                let Some(lower_be) = self.cluster.breakend(lower) else {
                    continue;
                };
                if lower_be.orientation != -1 {
                    continue;
                }

                for &upper in &breakends[i + 1..] {
                    let Some(upper_be) = self.cluster.breakend(upper) else {
                        continue;
                    };
                    if upper_be.position - lower_be.position > self.config.line_max_link_distance {
                        break;
                    }
                    if upper_be.orientation != 1 || upper.sv == lower.sv {
                        continue;
                    }
                    if let Some(link) = self.cluster.form_link(lower, upper) {
                        links.push(link);
                    }
                }
            }
        }

        links.sort_by_key(|l| (l.length, l.key()));
        links
    }

    pub fn form_chains(&mut self) -> usize {
        let mut used: FxHashSet<BreakendId> = FxHashSet::default();

        for mut link in self.candidate_links() {
            if used.contains(&link.first) || used.contains(&link.second) {
                continue;
            }

            link.link_reason = LINE_LINK_REASON.to_string();
            link.link_index = Some(self.link_index);
            if !self.add_link(&link) {
                continue;
            }

            used.insert(link.first);
            used.insert(link.second);
            for (breakend, other) in [(link.first, link.second), (link.second, link.first)] {
                if let Some(state) = self.sv_states.get_mut(&breakend.sv) {
                    let jcn = state.jcn;
                    state.add(breakend.is_start, other, jcn);
                }
            }
            self.link_index += 1;
        }

        reconcile_chains(
            &mut self.chains,
            self.cluster,
            &mut self.counters,
            self.config.max_reconcile_chains,
        );

        for chain in self.chains.iter_mut() {
            let jcn = chain
                .sv_indices()
                .iter()
                .map(|&sv| self.cluster.sv(sv).jcn)
                .fold(f64::INFINITY, f64::min);
            if jcn.is_finite() {
                chain.set_jcn(jcn, chain.jcn_uncertainty());
            }
            chain.assign_link_instances(&mut self.counters);
        }

        debug!(
            "cluster({}) LINE chaining formed {} chains from {} links",
            self.cluster.id,
            self.chains.len(),
            self.link_index
        );
        self.link_index
    }

    /// Extend or join chains open at the link's breakends, or start a new one.
    fn add_link(&mut self, link: &LinkedPair) -> bool {
        let open_at = |breakend: BreakendId| {
            self.chains
                .iter()
                .position(|c| c.open_count_at(self.cluster, breakend) > 0)
        };

        match (open_at(link.first), open_at(link.second)) {
            (None, None) => {
                let mut chain = SvChain::new(self.counters.next_chain_id()).with_jcn(1.0, 0.0);
                chain.add_link(self.cluster, link, false);
                self.chains.push(chain);
                true
            }
            (Some(i), Some(j)) if i == j => false,
            (Some(i), Some(j)) => {
                let other = self.chains[j].clone();
                if !self.chains[i].add_chain(self.cluster, link, &other) {
                    return false;
                }
                self.chains.remove(j);
                true
            }
            (Some(i), None) | (None, Some(i)) => {
                let breakend = if open_at(link.first).is_some() {
                    link.first
                } else {
                    link.second
                };
                let to_start = self.chains[i].open_breakend(self.cluster, false) != Some(breakend);
                self.chains[i].add_link(self.cluster, link, to_start)
            }
        }
    }

    pub fn chains(&self) -> &[SvChain] {
        &self.chains
    }

    pub fn take_chains(&mut self) -> Vec<SvChain> {
        std::mem::take(&mut self.chains)
    }

    pub fn sv_states(&self) -> impl Iterator<Item = &SvChainState> {
        self.sv_states.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use svchain_core::models::{Breakend, ResolvedType, SvType, SvVarData};

    fn bnd(id: u32, s: (&str, i64, i8), e: (&str, i64, i8), jcn: f64) -> SvVarData {
        SvVarData::new(
            id,
            SvType::Bnd,
            Breakend::new(s.0, s.1, s.2),
            Some(Breakend::new(e.0, e.1, e.2)),
            jcn,
        )
        .with_line_element()
    }

    /// A and B face each other on chr1; C sits too far along chr1 to pair.
    #[fixture]
    fn cluster() -> SvCluster {
        let svs = vec![
            bnd(1, ("1", 1000, -1), ("2", 5000, 1), 2.0),
            bnd(2, ("1", 1800, 1), ("2", 5020, -1), 1.5),
            bnd(3, ("1", 7000, 1), ("3", 90000, -1), 1.0),
        ];
        SvCluster::new(7, "S1", svs).with_resolved_type(ResolvedType::Line)
    }

    #[rstest]
    fn test_candidate_links_respect_distance(cluster: SvCluster) {
        let config = ChainingConfig::default();
        let chainer = LineChainer::new(&cluster, &config);
        let links = chainer.candidate_links();

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].key(), (BreakendId::start(0), BreakendId::start(1)));
        assert_eq!(links[0].length, 800);
    }

    #[rstest]
    fn test_line_chain_takes_lowest_jcn(cluster: SvCluster) {
        let config = ChainingConfig::default();
        let mut chainer = LineChainer::new(&cluster, &config);
        assert_eq!(chainer.form_chains(), 1);

        let chains = chainer.chains();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].jcn(), 1.5);
        assert_eq!(chains[0].links()[0].link_reason, "LINE");
        assert!(chains[0].links()[0].instance.is_some());
        assert!(chains[0].is_consistent(&cluster).is_ok());

        let unlinked: Vec<usize> = chainer
            .sv_states()
            .filter(|s| s.linked(true) == 0.0 && s.linked(false) == 0.0)
            .map(|s| s.sv)
            .collect();
        assert_eq!(unlinked, vec![2]);
    }
}
