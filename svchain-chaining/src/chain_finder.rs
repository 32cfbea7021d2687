use std::collections::BTreeSet;

use log::{debug, info, warn};

use svchain_core::models::{LinkedPair, SvCluster};

use crate::allocator::LinkAllocator;
use crate::catalog::analyse_multi_connection_breakends;
use crate::chain::SvChain;
use crate::chain_state::SvChainState;
use crate::config::ChainingConfig;
use crate::diagnostics::{ChainDiagnosticsRecord, RunCounts};
use crate::jcn_limits::ChainJcnLimits;
use crate::line_chainer::LineChainer;
use crate::observer::{ChainFinderState, ChainingEvent, ChainingObserver, LogObserver};
use crate::outcome::ChainingOutcome;
use crate::rules::RuleSelector;

///
/// Builds the chains of one cluster.
///
/// The finder owns the cluster's ledger and chain list for the whole run:
/// assembled links are chained first, then the rule cascade proposes links
/// until no candidates remain, the run stops making progress, or the ledger
/// is found inconsistent. LINE clusters are handed to [`LineChainer`]
/// instead.
///
/// # Example
/// ```rust
/// use svchain_chaining::{ChainFinder, ChainingConfig};
/// use svchain_core::models::{Breakend, SvCluster, SvType, SvVarData};
///
/// let svs = vec![
///     SvVarData::new(1, SvType::Del, Breakend::new("1", 1000, 1), Some(Breakend::new("1", 5000, -1)), 1.0),
///     SvVarData::new(2, SvType::Del, Breakend::new("1", 5500, 1), Some(Breakend::new("1", 9000, -1)), 1.0),
/// ];
/// let cluster = SvCluster::new(1, "SAMPLE", svs);
/// let config = ChainingConfig::default();
///
/// let outcome = ChainFinder::new(&cluster, &config).form_chains();
/// assert!(outcome.is_valid);
/// assert_eq!(outcome.chains.len(), 1);
/// ```
pub struct ChainFinder<'a> {
    cluster: &'a SvCluster,
    config: ChainingConfig,
    observer: Box<dyn ChainingObserver + 'a>,
    state: ChainFinderState,
    allocator: LinkAllocator,
    limits: ChainJcnLimits,
    iterations: usize,
    iterations_without_progress: usize,
    stagnated: bool,
    identical_removed: usize,
    warnings: Vec<String>,
}

impl<'a> ChainFinder<'a> {
    pub fn new(cluster: &'a SvCluster, config: &ChainingConfig) -> Self {
        Self {
            cluster,
            config: config.clone(),
            observer: Box::new(LogObserver::new(config.verbose)),
            state: ChainFinderState::Uninitialised,
            allocator: LinkAllocator::new(cluster, config),
            limits: ChainJcnLimits::new(cluster, config),
            iterations: 0,
            iterations_without_progress: 0,
            stagnated: false,
            identical_removed: 0,
            warnings: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl ChainingObserver + 'a) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn state(&self) -> ChainFinderState {
        self.state
    }

    pub fn allocator(&self) -> &LinkAllocator {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut LinkAllocator {
        &mut self.allocator
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn set_state(&mut self, state: ChainFinderState) {
        self.state = state;
        self.observer.on_event(&ChainingEvent::StateChanged {
            cluster_id: self.cluster.id,
            state,
        });
    }

    fn flush_events(&mut self) {
        for event in self.allocator.drain_events() {
            self.observer.on_event(&event);
        }
    }

    ///
    /// Seed the ledger and chain the assembled links. Spanning links around
    /// short DELs and DUPs are dropped first.
    ///
    pub fn initialise(&mut self) {
        let (assembled, removed) = analyse_multi_connection_breakends(
            self.cluster,
            &self.cluster.assembled_links,
            &self.config,
        );

        for link in &removed {
            self.observer.on_event(&ChainingEvent::diagnostic(
                "MULTI_CONN",
                &self.cluster.sample_id,
                self.cluster.id,
                self.cluster.sv_id(link.first.sv),
                format!("removed {}", link),
            ));
        }

        self.allocator.populate_sv_jcn_map(self.cluster);
        self.allocator.build_catalog(self.cluster, &self.limits);
        self.allocator
            .add_assembly_links_to_chains(self.cluster, &assembled);
        self.flush_events();

        self.set_state(ChainFinderState::Seeded);
    }

    ///
    /// Run the rule cascade until nothing is left to link. Every round either
    /// commits at least one link or counts towards the stagnation limit.
    ///
    pub fn search(&mut self) {
        if !self.allocator.is_valid() {
            self.set_state(ChainFinderState::Failed);
            return;
        }

        self.set_state(ChainFinderState::Searching);
        let max_idle = self.config.max_iterations_without_progress;

        while self.allocator.is_valid() && self.allocator.catalog().has_viable_links() {
            self.iterations += 1;
            let link_index = self.allocator.link_index();

            let proposals = RuleSelector::new(self.cluster, &self.allocator, &self.limits)
                .find_proposed_links();

            if !proposals.is_empty() {
                self.allocator
                    .process_proposed_links(self.cluster, proposals);
            }
            self.flush_events();

            if self.allocator.link_index() > link_index {
                self.iterations_without_progress = 0;
                continue;
            }

            self.iterations_without_progress += 1;
            if self.iterations_without_progress >= max_idle {
                self.stagnated = true;
                self.warnings.push("STAGNATED".to_string());
                self.observer.on_event(&ChainingEvent::Stagnated {
                    cluster_id: self.cluster.id,
                    iterations: self.iterations_without_progress,
                });
                break;
            }
        }

        if !self.allocator.is_valid() {
            self.set_state(ChainFinderState::Failed);
        }
    }

    ///
    /// Tidy the chain set: merge chains meeting at one SV, collapse
    /// duplicates and re-derive the ledger from them, close double-minute
    /// loops, then check the result.
    ///
    pub fn finalise(&mut self) {
        if self.allocator.is_valid() {
            let merges = self.allocator.reconcile(self.cluster);
            if merges > 0 {
                debug!("cluster({}) reconciled {} chain pairs", self.cluster.id, merges);
            }

            self.identical_removed = self.allocator.remove_identical_chains();
            if merges > 0 || self.identical_removed > 0 {
                self.allocator.resync_ledger();
            }
            self.close_double_minute_chains();
            self.flush_events();
        }

        if self.config.validate_chains && self.allocator.is_valid() {
            if let Err(e) = self.allocator.check_chains(self.cluster) {
                self.allocator.invalidate(e);
                self.flush_events();
            }
        }

        if !self.allocator.is_valid() {
            self.warnings.push("INVALID".to_string());
            if self.state != ChainFinderState::Failed {
                self.set_state(ChainFinderState::Failed);
            }
        } else {
            self.set_state(ChainFinderState::Converged);
        }
    }

    /// Close any open chain made up of exactly the cluster's double-minute SVs.
    fn close_double_minute_chains(&mut self) {
        if self.cluster.double_minute_svs.is_empty() {
            return;
        }

        let dm_svs: BTreeSet<usize> = self.cluster.double_minute_svs.iter().copied().collect();
        let candidates: Vec<(usize, LinkedPair)> = self
            .allocator
            .chains()
            .iter()
            .filter(|c| !c.is_closed() && c.sv_indices() == dm_svs)
            .filter_map(|c| {
                let (Some(start), Some(end)) = c.open_breakends(self.cluster) else {
                    return None;
                };
                self.cluster.form_link(end, start).map(|link| (c.id(), link))
            })
            .collect();

        for (chain_id, link) in candidates {
            if !self
                .allocator
                .close_double_minute_chain(self.cluster, chain_id, &link)
            {
                warn!(
                    "cluster({}) could not close double-minute chain({})",
                    self.cluster.id, chain_id
                );
            }
        }
    }

    /// Run the whole search and hand back its result.
    pub fn form_chains(mut self) -> ChainingOutcome {
        if self.cluster.is_line() {
            return self.form_line_chains();
        }

        self.initialise();
        self.search();
        self.finalise();

        let chains = self.allocator.chains().to_vec();
        let sv_states: Vec<SvChainState> = self.allocator.sv_states().cloned().collect();
        let is_valid = self.allocator.is_valid();

        let counts = RunCounts {
            repeated_chains: repeated_chain_count(&chains) + self.identical_removed,
            foldback_splits: self.allocator.foldback_splits(),
            comp_dup_splits: self.allocator.comp_dup_splits(),
            warnings: self.warnings.clone(),
        };
        let diagnostics =
            ChainDiagnosticsRecord::from_run(self.cluster, &chains, sv_states.iter(), &counts);

        info!(
            "cluster({}) {} SVs formed {} chains from {} links in {} iterations{}",
            self.cluster.id,
            self.cluster.sv_count(),
            chains.len(),
            self.allocator.link_index(),
            self.iterations,
            if is_valid { "" } else { " (invalid)" }
        );

        ChainingOutcome {
            cluster_id: self.cluster.id,
            chains,
            is_valid,
            failure: self.allocator.failure().cloned(),
            converged: is_valid && !self.stagnated,
            stagnated: self.stagnated,
            iterations: self.iterations,
            links_added: self.allocator.link_index(),
            sv_states,
            diagnostics,
        }
    }

    fn form_line_chains(mut self) -> ChainingOutcome {
        self.set_state(ChainFinderState::Searching);

        let mut chainer = LineChainer::new(self.cluster, &self.config);
        let links_added = chainer.form_chains();
        let chains = chainer.take_chains();
        let sv_states: Vec<SvChainState> = chainer.sv_states().cloned().collect();

        let counts = RunCounts {
            repeated_chains: repeated_chain_count(&chains),
            ..Default::default()
        };
        let diagnostics =
            ChainDiagnosticsRecord::from_run(self.cluster, &chains, sv_states.iter(), &counts);

        self.set_state(ChainFinderState::Converged);

        ChainingOutcome {
            cluster_id: self.cluster.id,
            chains,
            is_valid: true,
            failure: None,
            converged: true,
            stagnated: false,
            iterations: 1,
            links_added,
            sv_states,
            diagnostics,
        }
    }
}

/// Chains that pass through some section more than once.
fn repeated_chain_count(chains: &[SvChain]) -> usize {
    chains
        .iter()
        .filter(|c| c.links().iter().any(|l| l.is_duplicate))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use svchain_core::models::{Breakend, BreakendId, ResolvedType, SvType, SvVarData};

    use crate::observer::RecordingObserver;
    use crate::proposed::LinkSkipType;

    fn del(id: u32, start: i64, end: i64, jcn: f64) -> SvVarData {
        SvVarData::new(
            id,
            SvType::Del,
            Breakend::new("1", start, 1),
            Some(Breakend::new("1", end, -1)),
            jcn,
        )
    }

    /// Three DELs in a row on chr1, each facing the next.
    #[fixture]
    fn cluster() -> SvCluster {
        let svs = vec![
            del(1, 1000, 5000, 1.0),
            del(2, 5500, 9000, 1.0),
            del(3, 9400, 12000, 1.0),
        ];
        SvCluster::new(1, "S1", svs)
    }

    #[rstest]
    fn test_state_transitions(cluster: SvCluster) {
        let config = ChainingConfig::default();
        let mut recorder = RecordingObserver::new();
        let outcome = ChainFinder::new(&cluster, &config)
            .with_observer(&mut recorder)
            .form_chains();

        assert!(outcome.is_valid);
        assert!(outcome.converged);
        assert_eq!(
            recorder.states(),
            vec![
                ChainFinderState::Seeded,
                ChainFinderState::Searching,
                ChainFinderState::Converged,
            ]
        );
        assert_eq!(recorder.links_added(), 2);
    }

    #[rstest]
    fn test_three_dels_form_one_chain(cluster: SvCluster) {
        let config = ChainingConfig::default();
        let outcome = ChainFinder::new(&cluster, &config).form_chains();

        assert_eq!(outcome.chains.len(), 1);
        let chain = &outcome.chains[0];
        assert_eq!(chain.link_count(), 2);
        assert_eq!(
            chain.open_breakends(&cluster),
            (Some(BreakendId::start(0)), Some(BreakendId::end(2)))
        );
        assert_eq!(outcome.links_added, 2);
        assert_eq!(outcome.diagnostics.chains, 1);
        assert_eq!(outcome.diagnostics.unlinked_svs, 0);
        assert_eq!(outcome.diagnostics.unlinked_breakends, 2);
    }

    #[rstest]
    fn test_stagnation_on_skipped_candidates(cluster: SvCluster) {
        let config = ChainingConfig::default().with_max_iterations_without_progress(5);
        let mut finder = ChainFinder::new(&cluster, &config);
        finder.initialise();

        let links = finder.allocator().catalog().all_links();
        assert_eq!(links.len(), 3);
        for link in &links {
            finder
                .allocator_mut()
                .skip_link(&cluster, link, LinkSkipType::JcnMismatch);
        }

        finder.search();
        assert_eq!(finder.iterations(), 5);
        assert!(finder.allocator().is_valid());
        assert!(finder.allocator().chains().is_empty());
        assert_eq!(finder.state(), ChainFinderState::Searching);
    }

    #[rstest]
    fn test_line_cluster_uses_line_chainer() {
        let svs = vec![
            SvVarData::new(1, SvType::Bnd, Breakend::new("1", 1000, -1), Some(Breakend::new("2", 500, 1)), 2.0)
                .with_line_element(),
            SvVarData::new(2, SvType::Bnd, Breakend::new("1", 1200, 1), Some(Breakend::new("3", 500, 1)), 1.0),
        ];
        let cluster = SvCluster::new(2, "S1", svs).with_resolved_type(ResolvedType::Line);
        let outcome = ChainFinder::new(&cluster, &ChainingConfig::default()).form_chains();

        assert_eq!(outcome.chains.len(), 1);
        assert_eq!(outcome.chains[0].jcn(), 1.0);
        assert_eq!(outcome.chains[0].links()[0].link_reason, "LINE");
    }
}
