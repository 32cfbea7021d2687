use std::collections::BTreeMap;

use fxhash::{FxHashMap, FxHashSet};
use log::{debug, warn};

use svchain_core::models::{BreakendId, LinkId, LinkedPair, SvCluster};
use svchain_core::utils::{copy_numbers_equal, jcn_ranges_overlap};

use crate::catalog::{BreakendLinkCatalog, CatalogInputs};
use crate::chain::{ChainCounters, SvChain, reconcile_chains, remove_identical_chains};
use crate::chain_state::SvChainState;
use crate::config::ChainingConfig;
use crate::errors::ChainingError;
use crate::jcn_limits::ChainJcnLimits;
use crate::observer::ChainingEvent;
use crate::proposed::{
    ChainingRule, JcnMatchType, LinkSkipType, PairKey, ProposalKind, ProposedLinks, link_jcn,
};

/// A chain whose open end sits on a breakend, listed once per open end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenChainEnd {
    pub index: usize,
    pub chain_id: usize,
    pub jcn: f64,
    pub jcn_uncertainty: f64,
}

/// Where a breakend's JCN currently stands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BreakendJcnData {
    pub total: f64,
    pub uncertainty: f64,
    /// JCN not yet committed to any link.
    pub unlinked: f64,
    /// Unlinked JCN not already claimed by chains ending here.
    pub unchained: f64,
    pub open_chains: Vec<OpenChainEnd>,
    pub exhausted: bool,
}

impl BreakendJcnData {
    pub fn is_free(&self) -> bool {
        self.open_chains.is_empty()
    }

    /// More than one chain needs this breakend to continue.
    pub fn has_multiple_chains(&self) -> bool {
        self.open_chains.len() > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SideTarget {
    Chain(usize),
    Split(usize),
    Free,
    Mismatch,
}

impl SideTarget {
    fn chain_index(&self) -> Option<usize> {
        match self {
            SideTarget::Chain(i) | SideTarget::Split(i) => Some(*i),
            _ => None,
        }
    }
}

/// JCN committed to one breakend, towards the breakend at the link's other end.
type LedgerEntry = (BreakendId, BreakendId, f64);

/// The chains a proposal has touched so far, so a rejected proposal can be
/// undone without copying the whole chain list.
#[derive(Debug)]
struct ChainSnapshot {
    chain_count: usize,
    event_count: usize,
    saved: Vec<(usize, SvChain)>,
    removed: Vec<(usize, SvChain)>,
}

impl ChainSnapshot {
    fn save(&mut self, chains: &[SvChain], index: usize) {
        if index < self.chain_count && self.saved.iter().all(|(i, _)| *i != index) {
            self.saved.push((index, chains[index].clone()));
        }
    }
}

///
/// The copy-number ledger of one cluster and the chains built against it.
///
/// Every committed link is charged to both of its breakends. A breakend whose
/// JCN is used up is dropped from the candidate catalog, and an SV moves to
/// the completed set once all of its breakends are exhausted.
///
/// Attempted links that cannot be placed go to a skip table keyed by the pair.
/// Splitting any chain clears the table; otherwise only `Closing` entries are
/// dropped after each committed link.
///
#[derive(Debug)]
pub struct LinkAllocator {
    cluster_id: u32,
    sample_id: String,
    config: ChainingConfig,
    has_replication: bool,
    sv_connections: BTreeMap<usize, SvChainState>,
    completed_connections: BTreeMap<usize, SvChainState>,
    chains: Vec<SvChain>,
    catalog: BreakendLinkCatalog,
    unique_pairs: Vec<LinkedPair>,
    unique_keys: FxHashSet<PairKey>,
    skipped_pairs: FxHashMap<PairKey, LinkSkipType>,
    link_index: usize,
    counters: ChainCounters,
    is_valid: bool,
    failure: Option<ChainingError>,
    events: Vec<ChainingEvent>,
    last_commit_split: bool,
    foldback_splits: usize,
    comp_dup_splits: usize,
}

impl LinkAllocator {
    pub fn new(cluster: &SvCluster, config: &ChainingConfig) -> Self {
        Self {
            cluster_id: cluster.id,
            sample_id: cluster.sample_id.clone(),
            config: config.clone(),
            has_replication: cluster.requires_replication,
            sv_connections: BTreeMap::new(),
            completed_connections: BTreeMap::new(),
            chains: Vec::new(),
            catalog: BreakendLinkCatalog::default(),
            unique_pairs: Vec::new(),
            unique_keys: FxHashSet::default(),
            skipped_pairs: FxHashMap::default(),
            link_index: 0,
            counters: ChainCounters::new(),
            is_valid: true,
            failure: None,
            events: Vec::new(),
            last_commit_split: false,
            foldback_splits: 0,
            comp_dup_splits: 0,
        }
    }

    ///
    /// Seed one ledger entry per SV. SVs below the minimum JCN are left out
    /// of chaining; without replication every SV counts as a single copy.
    ///
    pub fn populate_sv_jcn_map(&mut self, cluster: &SvCluster) {
        self.sv_connections.clear();
        self.completed_connections.clear();

        for (index, sv) in cluster.svs().iter().enumerate() {
            if sv.jcn < self.config.min_sv_jcn {
                debug!(
                    "cluster({}) SV {} below min JCN, not chained",
                    self.cluster_id, sv.id
                );
                continue;
            }

            let (jcn, uncertainty) = if self.has_replication {
                (sv.jcn, sv.jcn_uncertainty)
            } else {
                (1.0, 0.0)
            };

            self.sv_connections.insert(
                index,
                SvChainState::new(index, jcn, uncertainty, sv.is_single_ended()),
            );
        }
    }

    ///
    /// Chain the assembly-supported links before any inferred ones.
    ///
    /// Links whose breakends have no other assembled option go first. Then
    /// links with one constrained side take that side's remaining JCN, which
    /// can leave further breakends with a single option. Whatever is left
    /// shares each breakend's JCN across its remaining options.
    ///
    pub fn add_assembly_links_to_chains(&mut self, cluster: &SvCluster, assembled: &[LinkedPair]) {
        let mut remaining: Vec<LinkedPair> = assembled
            .iter()
            .filter(|l| {
                self.sv_connections.contains_key(&l.first.sv)
                    && self.sv_connections.contains_key(&l.second.sv)
            })
            .cloned()
            .collect();

        if remaining.is_empty() {
            return;
        }

        let option_counts = |links: &[LinkedPair]| {
            let mut counts: FxHashMap<BreakendId, usize> = FxHashMap::default();
            for link in links {
                *counts.entry(link.first).or_default() += 1;
                *counts.entry(link.second).or_default() += 1;
            }
            counts
        };

        let counts = option_counts(&remaining);
        let (single, multiple): (Vec<LinkedPair>, Vec<LinkedPair>) =
            remaining.into_iter().partition(|l| {
                counts.get(&l.first) == Some(&1) && counts.get(&l.second) == Some(&1)
            });
        remaining = multiple;

        for link in &single {
            let (jcn, _, _) = self.proposal_jcn(link);
            self.add_assembled_link(cluster, link, jcn);
        }

        loop {
            if !self.is_valid {
                return;
            }
            let counts = option_counts(&remaining);
            let constrained = remaining.iter().position(|l| {
                counts.get(&l.first) == Some(&1) || counts.get(&l.second) == Some(&1)
            });
            let Some(index) = constrained else {
                break;
            };

            let link = remaining.remove(index);
            // the single-option side takes all it has left
            let (first_jcn, _) = self.available_jcn(link.first);
            let (second_jcn, _) = self.available_jcn(link.second);
            self.add_assembled_link(cluster, &link, first_jcn.min(second_jcn));
        }

        while !remaining.is_empty() && self.is_valid {
            let counts = option_counts(&remaining);
            let link = remaining.remove(0);
            let first_options = counts.get(&link.first).copied().unwrap_or(1).max(1) as f64;
            let second_options = counts.get(&link.second).copied().unwrap_or(1).max(1) as f64;
            let (first_jcn, _) = self.available_jcn(link.first);
            let (second_jcn, _) = self.available_jcn(link.second);
            let jcn = (first_jcn / first_options).min(second_jcn / second_options);
            self.add_assembled_link(cluster, &link, jcn);
        }
    }

    fn add_assembled_link(&mut self, cluster: &SvCluster, link: &LinkedPair, jcn: f64) -> bool {
        for breakend in [link.first, link.second] {
            if self.is_exhausted(breakend) {
                self.events.push(ChainingEvent::diagnostic(
                    "ASMB_SKIP",
                    &self.sample_id,
                    self.cluster_id,
                    cluster.sv_id(breakend.sv),
                    format!("breakend {} exhausted for {}", breakend, link),
                ));
                return false;
            }
        }

        if jcn <= 0.0 {
            return false;
        }

        let (_, first_unc) = self.available_jcn(link.first);
        let (_, second_unc) = self.available_jcn(link.second);
        let proposal = ProposedLinks::single(
            link.clone(),
            jcn,
            first_unc.max(second_unc),
            JcnMatchType::Matched,
            ChainingRule::Assembly,
        );
        self.add_links(cluster, &proposal)
    }

    /// Rebuild the candidate catalog from the current ledger.
    pub fn build_catalog(&mut self, cluster: &SvCluster, limits: &ChainJcnLimits) {
        let sv_jcn: BTreeMap<usize, f64> = self
            .sv_connections
            .iter()
            .map(|(&sv, state)| (sv, state.jcn))
            .collect();
        let exhausted = self.exhausted_breakends();
        let inputs = CatalogInputs {
            sv_jcn: &sv_jcn,
            exhausted: &exhausted,
            used_pairs: &self.unique_keys,
            has_replication: self.has_replication,
        };
        self.catalog = BreakendLinkCatalog::build(cluster, &self.config, limits, &inputs);
    }

    pub fn catalog(&self) -> &BreakendLinkCatalog {
        &self.catalog
    }

    pub fn exhausted_breakends(&self) -> FxHashSet<BreakendId> {
        self.sv_connections
            .values()
            .flat_map(|state| {
                [true, false]
                    .into_iter()
                    .filter(move |&side| state.breakend_exhausted(side))
                    .map(move |side| BreakendId::new(state.sv, side))
            })
            .collect()
    }

    pub fn is_exhausted(&self, breakend: BreakendId) -> bool {
        match self.sv_connections.get(&breakend.sv) {
            Some(state) => state.breakend_exhausted(breakend.is_start),
            None => true,
        }
    }

    /// Unlinked JCN of a breakend and its uncertainty, zero once exhausted.
    pub fn available_jcn(&self, breakend: BreakendId) -> (f64, f64) {
        match self.sv_connections.get(&breakend.sv) {
            Some(state) if !state.breakend_exhausted(breakend.is_start) => {
                (state.unlinked(breakend.is_start), state.jcn_uncertainty)
            }
            Some(state) => (0.0, state.jcn_uncertainty),
            None => (0.0, 0.0),
        }
    }

    /// JCN a new link between the pair's breakends would carry.
    pub fn proposal_jcn(&self, link: &LinkedPair) -> (f64, f64, JcnMatchType) {
        let (first_jcn, first_unc) = self.available_jcn(link.first);
        let (second_jcn, second_unc) = self.available_jcn(link.second);
        let (jcn, match_type) = link_jcn(first_jcn, first_unc, second_jcn, second_unc);
        (jcn, first_unc.max(second_unc), match_type)
    }

    pub fn breakend_jcn_data(&self, cluster: &SvCluster, breakend: BreakendId) -> BreakendJcnData {
        Self::jcn_data_for(&self.sv_connections, cluster, &self.chains, breakend)
    }

    fn jcn_data_for(
        states: &BTreeMap<usize, SvChainState>,
        cluster: &SvCluster,
        chains: &[SvChain],
        breakend: BreakendId,
    ) -> BreakendJcnData {
        let Some(state) = states.get(&breakend.sv) else {
            return BreakendJcnData {
                exhausted: true,
                ..Default::default()
            };
        };

        let mut open_chains = Vec::new();
        for (index, chain) in chains.iter().enumerate() {
            for _ in 0..chain.open_count_at(cluster, breakend) {
                open_chains.push(OpenChainEnd {
                    index,
                    chain_id: chain.id(),
                    jcn: chain.jcn(),
                    jcn_uncertainty: chain.jcn_uncertainty(),
                });
            }
        }

        let unlinked = state.unlinked(breakend.is_start);
        let claimed: f64 = open_chains.iter().map(|c| c.jcn).sum();

        BreakendJcnData {
            total: state.jcn,
            uncertainty: state.jcn_uncertainty,
            unlinked,
            unchained: (unlinked - claimed).max(0.0),
            open_chains,
            exhausted: state.breakend_exhausted(breakend.is_start),
        }
    }

    ///
    /// Pick what one side of a link attaches to: a chain already open here
    /// whose JCN agrees with the link, the breakend's unchained JCN, or a
    /// larger chain to split. Double-minute links may be absorbed by any open
    /// chain when DM splits are allowed.
    ///
    fn resolve_side(
        &self,
        data: &BreakendJcnData,
        jcn: f64,
        uncertainty: f64,
        double_minute: bool,
        free_on_mismatch: bool,
    ) -> SideTarget {
        let chains = &data.open_chains;

        if let Some(c) = chains.iter().find(|c| copy_numbers_equal(c.jcn, jcn)) {
            return SideTarget::Chain(c.index);
        }
        if let Some(c) = chains
            .iter()
            .find(|c| jcn_ranges_overlap(c.jcn, c.jcn_uncertainty, jcn, uncertainty))
        {
            return SideTarget::Chain(c.index);
        }

        if data.unchained > 0.0 && (data.unchained >= jcn || copy_numbers_equal(data.unchained, jcn)) {
            return SideTarget::Free;
        }

        if let Some(c) = chains
            .iter()
            .filter(|c| c.jcn > jcn)
            .max_by(|a, b| a.jcn.total_cmp(&b.jcn))
        {
            return SideTarget::Split(c.index);
        }

        if double_minute && self.config.allow_dm_chain_splits {
            if let Some(c) = chains.first() {
                return SideTarget::Chain(c.index);
            }
        }

        if free_on_mismatch {
            return SideTarget::Free;
        }

        SideTarget::Mismatch
    }

    /// Split `jcn` off a chain, returning the new chain's index.
    fn split_chain(&mut self, snapshot: &mut ChainSnapshot, index: usize, jcn: f64) -> usize {
        snapshot.save(&self.chains, index);
        let new_id = self.counters.next_chain_id();
        let part = self.chains[index].split(new_id, jcn);
        self.events.push(ChainingEvent::ChainSplit {
            cluster_id: self.cluster_id,
            chain_id: self.chains[index].id(),
            new_chain_id: new_id,
            jcn,
        });
        self.chains.push(part);
        self.chains.len() - 1
    }

    fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain_count: self.chains.len(),
            event_count: self.events.len(),
            saved: Vec::new(),
            removed: Vec::new(),
        }
    }

    fn remove_chain(&mut self, snapshot: &mut ChainSnapshot, index: usize) -> SvChain {
        let chain = self.chains.remove(index);
        snapshot.removed.push((index, chain.clone()));
        chain
    }

    /// Put back every chain a rejected proposal changed, dropping the chains
    /// and events it added.
    fn rollback(&mut self, snapshot: ChainSnapshot) {
        for (index, chain) in snapshot.removed.into_iter().rev() {
            self.chains.insert(index, chain);
        }
        self.chains.truncate(snapshot.chain_count);
        self.events.truncate(snapshot.event_count);
        for (index, chain) in snapshot.saved {
            self.chains[index] = chain;
        }
    }

    fn stamp(&self, link: &LinkedPair, proposal: &ProposedLinks, offset: usize) -> LinkedPair {
        let mut link = link.clone();
        link.link_reason = proposal.reason();
        link.link_index = Some(self.link_index + offset);
        link.instance = None;
        link
    }

    ///
    /// Commit a proposal to the chain graph and the ledger. Returns false
    /// when the proposal was skipped or the cluster became invalid.
    ///
    pub fn add_links(&mut self, cluster: &SvCluster, proposal: &ProposedLinks) -> bool {
        if !self.is_valid || proposal.links.is_empty() {
            return false;
        }

        let touched: Vec<LedgerEntry> = proposal
            .links
            .iter()
            .flat_map(|l| [(l.first, l.second, 0.0), (l.second, l.first, 0.0)])
            .collect();
        if let Err(e) = self.validate_ledger(cluster, &touched) {
            self.invalidate(e);
            return false;
        }

        self.last_commit_split = false;

        match proposal.kind {
            ProposalKind::Single => self.add_single_link(cluster, proposal),
            ProposalKind::FoldbackSplit {
                split_breakend,
                foldback_chain,
            } => self.add_foldback_split(cluster, proposal, split_breakend, foldback_chain),
            ProposalKind::ComplexDupSplit {
                dup_sv,
                target_chain,
                target_sv,
            } => self.add_complex_dup_split(cluster, proposal, dup_sv, target_chain, target_sv),
        }
    }

    fn add_single_link(&mut self, cluster: &SvCluster, proposal: &ProposedLinks) -> bool {
        let link = &proposal.links[0];
        let (b1, b2) = (link.first, link.second);
        let (jcn, uncertainty) = (proposal.jcn, proposal.jcn_uncertainty);

        let data1 = self.breakend_jcn_data(cluster, b1);
        let data2 = self.breakend_jcn_data(cluster, b2);

        let double_minute = cluster.is_double_minute_sv(b1.sv) && cluster.is_double_minute_sv(b2.sv);
        let assembly = proposal.has_rule(ChainingRule::Assembly);

        let side1 = self.resolve_side(&data1, jcn, uncertainty, double_minute, assembly);
        let side2 = self.resolve_side(&data2, jcn, uncertainty, double_minute, assembly);

        if side1 == SideTarget::Mismatch || side2 == SideTarget::Mismatch {
            self.skip_link(cluster, link, LinkSkipType::JcnMismatch);
            return false;
        }

        let stamped = self.stamp(link, proposal, 0);

        if let (Some(i), Some(j)) = (side1.chain_index(), side2.chain_index()) {
            if i == j {
                return self.close_on_link(cluster, i, side1, &stamped, jcn);
            }
        }

        let mut snapshot = self.snapshot();
        let mut split = false;
        let mut targets = [None, None];
        for (target, side) in targets.iter_mut().zip([side1, side2]) {
            *target = match side {
                SideTarget::Chain(i) => Some(i),
                SideTarget::Split(i) => {
                    split = true;
                    Some(self.split_chain(&mut snapshot, i, jcn))
                }
                _ => None,
            };
        }
        let [target1, target2] = targets;

        let mut merged = false;
        let (chain_id, amount) = match (target1, target2) {
            (None, None) => {
                let id = self.counters.next_chain_id();
                let mut chain = SvChain::new(id).with_jcn(jcn, uncertainty);
                chain.add_link(cluster, &stamped, false);
                self.chains.push(chain);
                (id, jcn)
            }
            (Some(i), None) | (None, Some(i)) => {
                let breakend = if target1.is_some() { b1 } else { b2 };
                snapshot.save(&self.chains, i);
                let to_start = self.chains[i].open_breakend(cluster, false) != Some(breakend);
                if !self.chains[i].add_link(cluster, &stamped, to_start) {
                    self.rollback(snapshot);
                    self.skip_link(cluster, link, LinkSkipType::JcnMismatch);
                    return false;
                }
                (self.chains[i].id(), self.chains[i].jcn())
            }
            (Some(i), Some(j)) => {
                snapshot.save(&self.chains, i);
                let other = self.chains[j].clone();
                if !self.chains[i].add_chain(cluster, &stamped, &other) {
                    self.rollback(snapshot);
                    self.skip_link(cluster, link, LinkSkipType::JcnMismatch);
                    return false;
                }
                let merged_jcn = (self.chains[i].jcn() + other.jcn()) / 2.0;
                let merged_unc = self.chains[i].jcn_uncertainty().max(other.jcn_uncertainty());
                self.chains[i].set_jcn(merged_jcn, merged_unc);
                let id = self.chains[i].id();
                self.remove_chain(&mut snapshot, j);
                self.events.push(ChainingEvent::ChainsMerged {
                    cluster_id: self.cluster_id,
                    chain_id: id,
                    merged_chain_id: other.id(),
                });
                merged = true;
                (id, merged_jcn)
            }
        };

        let entries = [(b1, b2, amount), (b2, b1, amount)];
        let committed = self.commit(cluster, snapshot, &entries, &[(chain_id, stamped)], split);

        // both halves of the merged chain now carry its averaged JCN
        if committed && merged {
            self.resync_ledger();
        }
        committed
    }

    /// Handle a link joining the two open ends of one chain.
    fn close_on_link(
        &mut self,
        cluster: &SvCluster,
        index: usize,
        side: SideTarget,
        link: &LinkedPair,
        jcn: f64,
    ) -> bool {
        let only_option =
            self.catalog.option_count(link.first) <= 1 && self.catalog.option_count(link.second) <= 1;
        let double_minute = self.chains[index]
            .sv_indices()
            .iter()
            .all(|&sv| cluster.is_double_minute_sv(sv));

        if !only_option && !double_minute {
            self.skip_link(cluster, link, LinkSkipType::Closing);
            return false;
        }

        let mut snapshot = self.snapshot();
        let (index, split) = match side {
            SideTarget::Split(i) => (self.split_chain(&mut snapshot, i, jcn), true),
            _ => (index, false),
        };

        snapshot.save(&self.chains, index);
        if !self.chains[index].close_chain(cluster, link) {
            self.rollback(snapshot);
            self.skip_link(cluster, link, LinkSkipType::Closing);
            return false;
        }
        if double_minute {
            self.chains[index].set_double_minute(true);
        }

        let (chain_id, amount) = (self.chains[index].id(), self.chains[index].jcn());
        self.events.push(ChainingEvent::ChainClosed {
            cluster_id: self.cluster_id,
            chain_id,
        });
        let entries = [(link.first, link.second, amount), (link.second, link.first, amount)];
        self.commit(cluster, snapshot, &entries, &[(chain_id, link.clone())], split)
    }

    ///
    /// Splice a foldback onto the breakend both links share. The chain at the
    /// split breakend must carry twice the foldback's JCN, and carries the
    /// foldback's JCN afterwards since it now runs through that breakend twice.
    ///
    fn add_foldback_split(
        &mut self,
        cluster: &SvCluster,
        proposal: &ProposedLinks,
        split_breakend: BreakendId,
        foldback_chain: Option<usize>,
    ) -> bool {
        let (link1, link2) = (&proposal.links[0], &proposal.links[1]);
        let (Some(fa), Some(fb)) = (
            link1.other_breakend(split_breakend),
            link2.other_breakend(split_breakend),
        ) else {
            warn!(
                "cluster({}) foldback links {} and {} do not meet at {}",
                self.cluster_id, link1, link2, split_breakend
            );
            return false;
        };

        let foldback_index = match foldback_chain {
            Some(id) => match self.chains.iter().position(|c| c.id() == id) {
                Some(index) => Some(index),
                None => {
                    self.invalidate(ChainingError::MissingChain(id));
                    return false;
                }
            },
            None => None,
        };

        let (jcn, uncertainty) = (proposal.jcn, proposal.jcn_uncertainty);
        let required = jcn * 2.0;

        let data = self.breakend_jcn_data(cluster, split_breakend);
        let open: Vec<&OpenChainEnd> = data
            .open_chains
            .iter()
            .filter(|c| Some(c.index) != foldback_index)
            .collect();

        let mut snapshot = self.snapshot();
        let mut split = false;
        let target = if let Some(c) = open.iter().find(|c| copy_numbers_equal(c.jcn, required)) {
            Some(c.index)
        } else if let Some(c) = open
            .iter()
            .find(|c| jcn_ranges_overlap(c.jcn, c.jcn_uncertainty, required, uncertainty))
        {
            Some(c.index)
        } else if let Some(c) = open.iter().find(|c| c.jcn > required) {
            split = true;
            Some(self.split_chain(&mut snapshot, c.index, required))
        } else if data.unchained >= required || copy_numbers_equal(data.unchained, required) {
            None
        } else {
            self.skip_link(cluster, link1, LinkSkipType::JcnMismatch);
            self.skip_link(cluster, link2, LinkSkipType::JcnMismatch);
            return false;
        };

        let index = match target {
            Some(index) => index,
            None => {
                self.chains.push(SvChain::new(self.counters.next_chain_id()));
                self.chains.len() - 1
            }
        };

        let stamped1 = self.stamp(link1, proposal, 0);
        let stamped2 = self.stamp(link2, proposal, 1);
        let foldback = foldback_index.map(|i| self.chains[i].clone());

        let mut updated = self.chains[index].clone();
        updated.set_jcn(jcn, uncertainty.max(updated.jcn_uncertainty()));
        if !updated.foldback_chain_on_chain(cluster, foldback.as_ref(), &stamped1, &stamped2) {
            self.rollback(snapshot);
            self.skip_link(cluster, link1, LinkSkipType::JcnMismatch);
            self.skip_link(cluster, link2, LinkSkipType::JcnMismatch);
            return false;
        }

        let chain_id = updated.id();
        snapshot.save(&self.chains, index);
        self.chains[index] = updated;
        if let Some(i) = foldback_index {
            let removed = self.remove_chain(&mut snapshot, i);
            self.events.push(ChainingEvent::ChainsMerged {
                cluster_id: self.cluster_id,
                chain_id,
                merged_chain_id: removed.id(),
            });
        }

        self.foldback_splits += 1;
        let entries = [
            (split_breakend, fa, jcn),
            (fa, split_breakend, jcn),
            (split_breakend, fb, jcn),
            (fb, split_breakend, jcn),
        ];
        self.commit(
            cluster,
            snapshot,
            &entries,
            &[(chain_id, stamped1), (chain_id, stamped2)],
            split,
        )
    }

    ///
    /// Duplicate a chain, or an unchained SV, around an SV whose breakends
    /// link to both of its ends. The target must carry twice the duplicating
    /// SV's JCN.
    ///
    fn add_complex_dup_split(
        &mut self,
        cluster: &SvCluster,
        proposal: &ProposedLinks,
        dup_sv: usize,
        target_chain: Option<usize>,
        target_sv: Option<usize>,
    ) -> bool {
        let (link1, link2) = (&proposal.links[0], &proposal.links[1]);
        let (jcn, uncertainty) = (proposal.jcn, proposal.jcn_uncertainty);
        let required = jcn * 2.0;

        let stamped1 = self.stamp(link1, proposal, 0);
        let stamped2 = self.stamp(link2, proposal, 1);
        let mut snapshot = self.snapshot();
        let mut split = false;

        let skip_both = |this: &mut Self| {
            this.skip_link(cluster, link1, LinkSkipType::JcnMismatch);
            this.skip_link(cluster, link2, LinkSkipType::JcnMismatch);
            false
        };

        let chain_id = if let Some(id) = target_chain {
            let Some(mut index) = self.chains.iter().position(|c| c.id() == id) else {
                self.invalidate(ChainingError::MissingChain(id));
                return false;
            };

            let (Some(start), Some(end)) = self.chains[index].open_breakends(cluster) else {
                return skip_both(self);
            };
            let (pair_end, pair_start) = if link1.has_breakend(end) && link2.has_breakend(start) {
                (&stamped1, &stamped2)
            } else if link2.has_breakend(end) && link1.has_breakend(start) {
                (&stamped2, &stamped1)
            } else {
                return skip_both(self);
            };

            let chain = &self.chains[index];
            let matched = copy_numbers_equal(chain.jcn(), required)
                || jcn_ranges_overlap(chain.jcn(), chain.jcn_uncertainty(), required, uncertainty);
            if !matched {
                if chain.jcn() <= required {
                    return skip_both(self);
                }
                split = true;
                index = self.split_chain(&mut snapshot, index, required);
            }

            let mut updated = self.chains[index].clone();
            updated.set_jcn(jcn, uncertainty.max(updated.jcn_uncertainty()));
            if !updated.duplicate_chain_on_link(cluster, pair_end, pair_start) {
                self.rollback(snapshot);
                return skip_both(self);
            }
            snapshot.save(&self.chains, index);
            self.chains[index] = updated;
            self.chains[index].id()
        } else if let Some(sv) = target_sv {
            let (start_jcn, _) = self.available_jcn(BreakendId::start(sv));
            let (end_jcn, _) = self.available_jcn(BreakendId::end(sv));
            let enough = |available: f64| available >= required || copy_numbers_equal(available, required);
            if !enough(start_jcn) || !enough(end_jcn) {
                return skip_both(self);
            }

            let (pair_end, pair_start) = if link1.has_breakend(BreakendId::end(sv)) {
                (&stamped1, &stamped2)
            } else {
                (&stamped2, &stamped1)
            };

            let mut chain = SvChain::new(self.counters.next_chain_id()).with_jcn(jcn, uncertainty);
            if !chain.duplicate_sv_on_links(sv, pair_end, pair_start) {
                return skip_both(self);
            }
            let id = chain.id();
            self.chains.push(chain);
            id
        } else {
            return skip_both(self);
        };

        debug!(
            "cluster({}) SV {} duplicates chain({})",
            self.cluster_id,
            cluster.sv_id(dup_sv),
            chain_id
        );

        self.comp_dup_splits += 1;
        let entries: Vec<LedgerEntry> = [link1, link2]
            .iter()
            .flat_map(|l| [(l.first, l.second, jcn), (l.second, l.first, jcn)])
            .collect();
        self.commit(
            cluster,
            snapshot,
            &entries,
            &[(chain_id, stamped1), (chain_id, stamped2)],
            split,
        )
    }

    fn validate_ledger(&self, cluster: &SvCluster, entries: &[LedgerEntry]) -> Result<(), ChainingError> {
        for &(breakend, _, _) in entries {
            match self.sv_connections.get(&breakend.sv) {
                Some(state) if !state.breakend_exhausted(breakend.is_start) => {}
                Some(_) => {
                    return Err(ChainingError::BreakendExhausted {
                        sv_id: cluster.sv_id(breakend.sv),
                        breakend,
                    });
                }
                None if self.completed_connections.contains_key(&breakend.sv) => {
                    return Err(ChainingError::BreakendExhausted {
                        sv_id: cluster.sv_id(breakend.sv),
                        breakend,
                    });
                }
                None => return Err(ChainingError::MissingChainState(cluster.sv_id(breakend.sv))),
            }
        }
        Ok(())
    }

    fn commit(
        &mut self,
        cluster: &SvCluster,
        snapshot: ChainSnapshot,
        entries: &[LedgerEntry],
        added: &[(usize, LinkedPair)],
        split: bool,
    ) -> bool {
        if let Err(e) = self.validate_ledger(cluster, entries) {
            self.rollback(snapshot);
            self.invalidate(e);
            return false;
        }

        for &(breakend, other, jcn) in entries {
            if let Some(state) = self.sv_connections.get_mut(&breakend.sv) {
                state.add(breakend.is_start, other, jcn);
            }
        }

        for chain in self.chains.iter_mut() {
            chain.assign_link_instances(&mut self.counters);
        }

        for &(breakend, _, _) in entries {
            if self.is_exhausted(breakend) {
                self.catalog.remove_breakend(breakend);
            }
        }
        for &(breakend, _, _) in entries {
            self.check_sv_complete(breakend.sv);
        }

        if split {
            self.skipped_pairs.clear();
        } else {
            self.skipped_pairs.retain(|_, t| *t != LinkSkipType::Closing);
        }
        self.last_commit_split = split;

        for (chain_id, link) in added {
            let key = link.key();
            if !self.has_replication {
                self.catalog.remove_link(key);
            }
            if self.unique_keys.insert(key) {
                self.unique_pairs.push(link.clone());
            }

            let jcn = self
                .chains
                .iter()
                .find(|c| c.id() == *chain_id)
                .map(|c| c.jcn())
                .unwrap_or(0.0);
            self.events.push(ChainingEvent::LinkAdded {
                cluster_id: self.cluster_id,
                chain_id: *chain_id,
                link: link.to_string(),
                jcn,
                reason: link.link_reason.clone(),
                link_index: self.link_index,
            });
            self.link_index += 1;
        }

        true
    }

    /// Move an SV to the completed set once every breakend is exhausted.
    pub fn check_sv_complete(&mut self, sv: usize) {
        if self.sv_connections.get(&sv).is_some_and(|s| s.is_complete()) {
            if let Some(state) = self.sv_connections.remove(&sv) {
                self.completed_connections.insert(sv, state);
            }
        }
    }

    ///
    /// Work through a batch of proposals. Each is re-checked against the
    /// current ledger first; the batch stops after a split or when the
    /// cluster becomes invalid. Returns the number of links added.
    ///
    pub fn process_proposed_links(&mut self, cluster: &SvCluster, proposals: Vec<ProposedLinks>) -> usize {
        let mut added = 0;

        for mut proposal in proposals {
            if !self.is_valid {
                break;
            }

            if proposal.breakends().iter().any(|b| self.is_exhausted(*b))
                || proposal.keys().iter().any(|k| self.is_skipped(k))
            {
                continue;
            }

            if !proposal.is_split() {
                let (jcn, uncertainty, match_type) = self.proposal_jcn(&proposal.links[0]);
                if jcn <= 0.0 {
                    continue;
                }
                proposal.jcn = jcn;
                proposal.jcn_uncertainty = uncertainty;
                proposal.match_type = match_type;
            }

            if self.add_links(cluster, &proposal) {
                added += proposal.links.len();
                if proposal.is_split() || self.last_commit_split {
                    break;
                }
            }
        }

        added
    }

    ///
    /// Close a chain whose SVs form a double minute with the link joining its
    /// open ends. Leaves everything untouched when the ledger has no room.
    ///
    pub fn close_double_minute_chain(&mut self, cluster: &SvCluster, chain_id: usize, link: &LinkedPair) -> bool {
        let Some(index) = self.chains.iter().position(|c| c.id() == chain_id) else {
            return false;
        };

        let jcn = self.chains[index].jcn();
        let entries = [(link.first, link.second, jcn), (link.second, link.first, jcn)];
        if let Err(e) = self.validate_ledger(cluster, &entries) {
            warn!(
                "cluster({}) cannot close DM chain({}): {}",
                self.cluster_id, chain_id, e
            );
            return false;
        }

        let mut stamped = link.clone();
        stamped.link_reason = "DM_CLOSE".to_string();
        stamped.link_index = Some(self.link_index);
        let mut snapshot = self.snapshot();
        snapshot.save(&self.chains, index);
        if !self.chains[index].close_chain(cluster, &stamped) {
            return false;
        }
        self.chains[index].set_double_minute(true);

        self.events.push(ChainingEvent::ChainClosed {
            cluster_id: self.cluster_id,
            chain_id,
        });
        self.commit(cluster, snapshot, &entries, &[(chain_id, stamped)], false)
    }

    /// Record a link that cannot be placed until the chain graph changes.
    pub fn skip_link(&mut self, cluster: &SvCluster, link: &LinkedPair, skip_type: LinkSkipType) {
        self.skipped_pairs.insert(link.key(), skip_type);
        self.events.push(ChainingEvent::LinkSkipped {
            cluster_id: self.cluster_id,
            link: link.to_string(),
            skip_type,
        });
        self.events.push(ChainingEvent::diagnostic(
            &skip_type.to_string(),
            &self.sample_id,
            self.cluster_id,
            cluster.sv_id(link.first.sv),
            format!("other={} len={}", cluster.sv_id(link.second.sv), link.length),
        ));
    }

    pub fn is_skipped(&self, key: &PairKey) -> bool {
        self.skipped_pairs.contains_key(key)
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped_pairs.len()
    }

    /// Mark the cluster as failed; the first failure is kept.
    pub fn invalidate(&mut self, error: ChainingError) {
        if self.failure.is_none() {
            self.events.push(ChainingEvent::Invalid {
                cluster_id: self.cluster_id,
                reason: error.to_string(),
            });
            self.failure = Some(error);
        }
        self.is_valid = false;
    }

    /// Merge chains meeting at one SV. Replication clusters only.
    pub fn reconcile(&mut self, cluster: &SvCluster) -> usize {
        if !self.has_replication {
            return 0;
        }
        reconcile_chains(
            &mut self.chains,
            cluster,
            &mut self.counters,
            self.config.max_reconcile_chains,
        )
    }

    pub fn remove_identical_chains(&mut self) -> usize {
        remove_identical_chains(&mut self.chains)
    }

    ///
    /// Rebuild every SV's committed JCN from the links the chains hold now.
    /// Merging chains changes the JCN carried by links committed earlier, so
    /// the ledger is re-derived after any merge.
    ///
    pub fn resync_ledger(&mut self) {
        for state in self
            .sv_connections
            .values_mut()
            .chain(self.completed_connections.values_mut())
        {
            state.clear_links();
        }

        for chain in &self.chains {
            let jcn = chain.jcn();
            for link in chain.links() {
                for (breakend, other) in [(link.first, link.second), (link.second, link.first)] {
                    let state = match self.sv_connections.get_mut(&breakend.sv) {
                        Some(state) => Some(state),
                        None => self.completed_connections.get_mut(&breakend.sv),
                    };
                    if let Some(state) = state {
                        state.add(breakend.is_start, other, jcn);
                    }
                }
            }
        }

        let exhausted: Vec<BreakendId> = self
            .catalog
            .breakends()
            .filter(|&b| self.is_exhausted(b))
            .collect();
        for breakend in exhausted {
            self.catalog.remove_breakend(breakend);
        }

        let svs: Vec<usize> = self.sv_connections.keys().copied().collect();
        for sv in svs {
            self.check_sv_complete(sv);
        }
    }

    ///
    /// Confirm every chain is contiguous and that no link instance is owned
    /// by two chains.
    ///
    pub fn check_chains(&self, cluster: &SvCluster) -> Result<(), ChainingError> {
        let mut owners: FxHashMap<LinkId, usize> = FxHashMap::default();

        for chain in &self.chains {
            chain
                .is_consistent(cluster)
                .map_err(|reason| ChainingError::InconsistentChain(chain.id(), reason))?;

            for link in chain.links() {
                let Some(instance) = link.instance else {
                    continue;
                };
                if let Some(&owner) = owners.get(&instance) {
                    if owner != chain.id() {
                        return Err(ChainingError::SharedLink {
                            link: link.to_string(),
                            chain1: owner,
                            chain2: chain.id(),
                        });
                    }
                }
                owners.insert(instance, chain.id());
            }
        }

        Ok(())
    }

    pub fn sv_connections(&self) -> &BTreeMap<usize, SvChainState> {
        &self.sv_connections
    }

    pub fn completed_connections(&self) -> &BTreeMap<usize, SvChainState> {
        &self.completed_connections
    }

    pub fn sv_state(&self, sv: usize) -> Option<&SvChainState> {
        self.sv_connections
            .get(&sv)
            .or_else(|| self.completed_connections.get(&sv))
    }

    /// Ledger entries of every chained SV, active and completed, by SV index.
    pub fn sv_states(&self) -> impl Iterator<Item = &SvChainState> {
        let mut states: Vec<&SvChainState> = self
            .sv_connections
            .values()
            .chain(self.completed_connections.values())
            .collect();
        states.sort_by_key(|s| s.sv);
        states.into_iter()
    }

    pub fn chains(&self) -> &[SvChain] {
        &self.chains
    }

    pub fn chains_mut(&mut self) -> &mut Vec<SvChain> {
        &mut self.chains
    }

    pub fn take_chains(&mut self) -> Vec<SvChain> {
        std::mem::take(&mut self.chains)
    }

    pub fn counters_mut(&mut self) -> &mut ChainCounters {
        &mut self.counters
    }

    pub fn unique_pairs(&self) -> &[LinkedPair] {
        &self.unique_pairs
    }

    pub fn link_index(&self) -> usize {
        self.link_index
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn failure(&self) -> Option<&ChainingError> {
        self.failure.as_ref()
    }

    pub fn has_replication(&self) -> bool {
        self.has_replication
    }

    pub fn config(&self) -> &ChainingConfig {
        &self.config
    }

    pub fn foldback_splits(&self) -> usize {
        self.foldback_splits
    }

    pub fn comp_dup_splits(&self) -> usize {
        self.comp_dup_splits
    }

    pub fn drain_events(&mut self) -> Vec<ChainingEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use svchain_core::models::{Breakend, SvType, SvVarData};

    fn bnd(id: u32, s: (&str, i64, i8), e: (&str, i64, i8), jcn: f64) -> SvVarData {
        SvVarData::new(
            id,
            SvType::Bnd,
            Breakend::new(s.0, s.1, s.2),
            Some(Breakend::new(e.0, e.1, e.2)),
            jcn,
        )
    }

    fn allocator(cluster: &SvCluster) -> LinkAllocator {
        let config = ChainingConfig::default();
        let mut allocator = LinkAllocator::new(cluster, &config);
        allocator.populate_sv_jcn_map(cluster);
        allocator.build_catalog(cluster, &ChainJcnLimits::default());
        allocator
    }

    fn single(allocator: &LinkAllocator, link: LinkedPair, rule: ChainingRule) -> ProposedLinks {
        let (jcn, unc, match_type) = allocator.proposal_jcn(&link);
        ProposedLinks::single(link, jcn, unc, match_type, rule)
    }

    /// A(0) chr1 1000- .. B(1) chr1 1500+ / chr1 3000- .. C(2) chr1 4000+, JCNs 2, 1, 1
    #[fixture]
    fn cluster() -> SvCluster {
        let svs = vec![
            bnd(1, ("2", 100, 1), ("1", 1000, -1), 2.0),
            bnd(2, ("1", 1500, 1), ("1", 3000, -1), 1.0),
            bnd(3, ("1", 4000, 1), ("3", 100, -1), 1.0),
            SvVarData::new(4, SvType::Bnd, Breakend::new("4", 10, 1), Some(Breakend::new("5", 10, 1)), 0.1),
        ];
        SvCluster::new(1, "S1", svs).with_replication(true)
    }

    #[rstest]
    fn test_low_jcn_sv_not_chained(cluster: SvCluster) {
        let allocator = allocator(&cluster);
        assert_eq!(allocator.sv_connections().len(), 3);
        assert!(allocator.sv_state(3).is_none());
        assert!(allocator.is_exhausted(BreakendId::start(3)));
    }

    #[rstest]
    fn test_non_replication_normalises_jcn(cluster: SvCluster) {
        let cluster = cluster.with_replication(false);
        let allocator = allocator(&cluster);
        assert_eq!(allocator.available_jcn(BreakendId::end(0)), (1.0, 0.0));
    }

    #[rstest]
    fn test_new_chain_then_attach(cluster: SvCluster) {
        let mut allocator = allocator(&cluster);
        let ab = cluster.form_link(BreakendId::end(0), BreakendId::start(1)).unwrap();
        let proposal = single(&allocator, ab, ChainingRule::Nearest);
        assert_eq!(proposal.jcn, 1.0);
        assert!(allocator.add_links(&cluster, &proposal));

        assert_eq!(allocator.chains().len(), 1);
        assert_eq!(allocator.available_jcn(BreakendId::end(0)), (1.0, 0.0));
        assert!(allocator.is_exhausted(BreakendId::start(1)));
        assert_eq!(allocator.link_index(), 1);

        let data = allocator.breakend_jcn_data(&cluster, BreakendId::end(1));
        assert_eq!(data.open_chains.len(), 1);
        assert_eq!(data.unchained, 0.0);

        let bc = cluster.form_link(BreakendId::end(1), BreakendId::start(2)).unwrap();
        let proposal = single(&allocator, bc, ChainingRule::Only);
        assert!(allocator.add_links(&cluster, &proposal));

        assert_eq!(allocator.chains().len(), 1);
        assert_eq!(allocator.chains()[0].link_count(), 2);
        assert!(allocator.sv_state(1).is_some_and(|s| s.is_complete()));
        assert!(allocator.completed_connections().contains_key(&1));
        assert_eq!(allocator.chains()[0].links()[1].link_reason, "ONLY");
        assert!(allocator.check_chains(&cluster).is_ok());
    }

    #[rstest]
    fn test_exhausted_breakend_invalidates(cluster: SvCluster) {
        let mut allocator = allocator(&cluster);
        let ab = cluster.form_link(BreakendId::end(0), BreakendId::start(1)).unwrap();
        let proposal = single(&allocator, ab.clone(), ChainingRule::Nearest);
        assert!(allocator.add_links(&cluster, &proposal));

        assert!(!allocator.add_links(&cluster, &proposal));
        assert!(!allocator.is_valid());
        assert!(matches!(
            allocator.failure(),
            Some(ChainingError::BreakendExhausted { sv_id: 2, .. })
        ));
        assert_eq!(allocator.chains().len(), 1);
    }

    #[rstest]
    fn test_mismatch_is_skipped(cluster: SvCluster) {
        let mut allocator = allocator(&cluster);
        let ab = cluster.form_link(BreakendId::end(0), BreakendId::start(1)).unwrap();
        let mut proposal = single(&allocator, ab.clone(), ChainingRule::JcnMax);
        proposal.jcn = 4.0;

        assert!(!allocator.add_links(&cluster, &proposal));
        assert!(allocator.is_valid());
        assert!(allocator.is_skipped(&ab.key()));
        assert!(allocator.chains().is_empty());

        let events = allocator.drain_events();
        assert!(events.iter().any(|e| e
            .diag_line()
            .is_some_and(|l| l.starts_with("CHAIN_DIAG: JCN_MISMATCH,S1,1,1,"))));
    }

    #[rstest]
    fn test_assembly_links_seed_chains(cluster: SvCluster) {
        let cluster = cluster
            .with_assembled_link(BreakendId::end(0), BreakendId::start(1))
            .with_assembled_link(BreakendId::end(1), BreakendId::start(2));
        let mut allocator = allocator(&cluster);
        let assembled = cluster.assembled_links.clone();
        allocator.add_assembly_links_to_chains(&cluster, &assembled);

        assert_eq!(allocator.chains().len(), 1);
        assert_eq!(allocator.chains()[0].link_count(), 2);
        assert!(allocator.chains()[0].links().iter().all(|l| l.link_reason == "ASSEMBLY"));
        assert_eq!(allocator.unique_pairs().len(), 2);
    }

    #[rstest]
    fn test_larger_chain_is_split(cluster: SvCluster) {
        let mut allocator = allocator(&cluster);
        let ac = cluster.form_link(BreakendId::end(0), BreakendId::start(2)).unwrap();
        let mut chain = SvChain::new(7).with_jcn(2.0, 0.0);
        assert!(chain.add_link(&cluster, &ac, false));
        allocator.chains = vec![chain];

        // chain(7) carries 2 at A.s, a link there only needs 1
        let data = allocator.breakend_jcn_data(&cluster, BreakendId::start(0));
        assert_eq!(data.open_chains.len(), 1);
        assert_eq!(data.unchained, 0.0);
        assert_eq!(
            allocator.resolve_side(&data, 1.0, 0.0, false, false),
            SideTarget::Split(0)
        );

        allocator.drain_events();
        let before = allocator.chains.clone();
        let mut snapshot = allocator.snapshot();
        let index = allocator.split_chain(&mut snapshot, 0, 1.0);
        assert_eq!(index, 1);
        let chains = allocator.chains();
        assert_eq!(chains[0].jcn(), 1.0);
        assert_eq!(chains[1].jcn(), 1.0);
        assert_eq!(chains[1].links(), chains[0].links());
        assert_eq!(snapshot.saved.len(), 1);

        // an abandoned split leaves the original chain and no split event
        allocator.rollback(snapshot);
        assert_eq!(allocator.chains(), before.as_slice());
        assert!(allocator.drain_events().is_empty());
    }

    #[rstest]
    fn test_rejected_merge_restores_chains(cluster: SvCluster) {
        let mut allocator = allocator(&cluster);
        let ab = cluster.form_link(BreakendId::end(0), BreakendId::start(1)).unwrap();
        let bc = cluster.form_link(BreakendId::end(1), BreakendId::start(2)).unwrap();
        let mut first = SvChain::new(3).with_jcn(1.0, 0.0);
        assert!(first.add_link(&cluster, &ab, false));
        let mut second = SvChain::new(4).with_jcn(1.0, 0.0);
        assert!(second.add_link(&cluster, &bc, false));
        allocator.chains = vec![first, second];
        let before = allocator.chains.clone();

        let mut snapshot = allocator.snapshot();
        snapshot.save(&allocator.chains, 0);
        allocator.chains[0].set_jcn(5.0, 0.0);
        let removed = allocator.remove_chain(&mut snapshot, 1);
        assert_eq!(removed.id(), 4);
        assert_eq!(allocator.chains().len(), 1);

        allocator.rollback(snapshot);
        assert_eq!(allocator.chains(), before.as_slice());
    }

    #[rstest]
    fn test_skip_table_cleared_by_commit(cluster: SvCluster) {
        let mut allocator = allocator(&cluster);
        let ab = cluster.form_link(BreakendId::end(0), BreakendId::start(1)).unwrap();
        let bc = cluster.form_link(BreakendId::end(1), BreakendId::start(2)).unwrap();
        allocator.skip_link(&cluster, &bc, LinkSkipType::Closing);
        allocator.skip_link(&cluster, &ab, LinkSkipType::JcnMismatch);
        assert_eq!(allocator.skipped_count(), 2);

        let ac = cluster.form_link(BreakendId::end(0), BreakendId::start(2)).unwrap();
        let proposal = single(&allocator, ac, ChainingRule::Nearest);
        assert!(allocator.add_links(&cluster, &proposal));

        assert!(!allocator.is_skipped(&bc.key()));
        assert!(allocator.is_skipped(&ab.key()));
    }
}
