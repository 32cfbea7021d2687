use std::collections::BTreeSet;
use std::fmt::{self, Display};

use log::{debug, error, warn};

use svchain_core::models::{BreakendId, LinkId, LinkedPair, SvCluster};
use svchain_core::utils::{combine_jcn, copy_numbers_equal, format_jcn};

/// Hands out chain ids and link instance ids within one cluster.
#[derive(Debug, Clone, Default)]
pub struct ChainCounters {
    next_chain_id: usize,
    next_link_id: u32,
}

impl ChainCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_chain_id(&mut self) -> usize {
        let id = self.next_chain_id;
        self.next_chain_id += 1;
        id
    }

    pub fn next_link_id(&mut self) -> LinkId {
        let id = LinkId(self.next_link_id);
        self.next_link_id += 1;
        id
    }
}

///
/// An ordered path of templated insertions through the cluster's SVs.
///
/// Consecutive links meet at one SV, entering on one side and leaving on the
/// other: `links[i].second` and `links[i + 1].first` are the two breakends of
/// the same SV. The open breakend at each end is the unlinked side of the
/// terminal SV.
///
/// A chain only becomes closed through a link joining its two open ends; a
/// chain that starts and finishes on the same SV stays open at both sides.
///
#[derive(Debug, Clone, PartialEq)]
pub struct SvChain {
    id: usize,
    links: Vec<LinkedPair>,
    jcn: f64,
    jcn_uncertainty: f64,
    is_closed: bool,
    is_double_minute: bool,
}

impl SvChain {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            links: Vec::new(),
            jcn: 0.0,
            jcn_uncertainty: 0.0,
            is_closed: false,
            is_double_minute: false,
        }
    }

    pub fn with_jcn(mut self, jcn: f64, jcn_uncertainty: f64) -> Self {
        self.set_jcn(jcn, jcn_uncertainty);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn links(&self) -> &[LinkedPair] {
        &self.links
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn first_link(&self) -> Option<&LinkedPair> {
        self.links.first()
    }

    pub fn last_link(&self) -> Option<&LinkedPair> {
        self.links.last()
    }

    pub fn jcn(&self) -> f64 {
        self.jcn
    }

    pub fn jcn_uncertainty(&self) -> f64 {
        self.jcn_uncertainty
    }

    pub fn set_jcn(&mut self, jcn: f64, jcn_uncertainty: f64) {
        self.jcn = jcn;
        self.jcn_uncertainty = jcn_uncertainty;
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    pub fn is_double_minute(&self) -> bool {
        self.is_double_minute
    }

    pub fn set_double_minute(&mut self, is_double_minute: bool) {
        self.is_double_minute = is_double_minute;
    }

    /// Total templated-insertion length.
    pub fn length(&self) -> i64 {
        self.links.iter().map(|l| l.length.max(0)).sum()
    }

    pub fn sv_indices(&self) -> BTreeSet<usize> {
        self.links
            .iter()
            .flat_map(|l| [l.first.sv, l.second.sv])
            .collect()
    }

    pub fn has_sv(&self, sv: usize) -> bool {
        self.links.iter().any(|l| l.has_sv(sv))
    }

    ///
    /// The unlinked breakend at the start or end of the chain.
    ///
    /// `None` when the chain is empty or closed, or when the terminal SV is
    /// single-ended.
    ///
    pub fn open_breakend(&self, cluster: &SvCluster, is_start: bool) -> Option<BreakendId> {
        if self.is_closed {
            return None;
        }

        let open = if is_start {
            self.links.first()?.first.other()
        } else {
            self.links.last()?.second.other()
        };

        cluster.breakend(open).map(|_| open)
    }

    pub fn open_breakends(&self, cluster: &SvCluster) -> (Option<BreakendId>, Option<BreakendId>) {
        (
            self.open_breakend(cluster, true),
            self.open_breakend(cluster, false),
        )
    }

    /// How many of the chain's ends are open at `breakend`.
    pub fn open_count_at(&self, cluster: &SvCluster, breakend: BreakendId) -> usize {
        let (start, end) = self.open_breakends(cluster);
        [start, end]
            .iter()
            .filter(|b| **b == Some(breakend))
            .count()
    }

    fn orient_for_end(
        &self,
        cluster: &SvCluster,
        pair: &LinkedPair,
        to_start: bool,
    ) -> Option<LinkedPair> {
        let open = self.open_breakend(cluster, to_start)?;

        if to_start {
            if pair.second == open {
                Some(pair.clone())
            } else if pair.first == open {
                Some(pair.reversed())
            } else {
                None
            }
        } else if pair.first == open {
            Some(pair.clone())
        } else if pair.second == open {
            Some(pair.reversed())
        } else {
            None
        }
    }

    pub fn can_add_link(&self, cluster: &SvCluster, pair: &LinkedPair, to_start: bool) -> bool {
        if self.is_closed {
            return false;
        }
        self.links.is_empty() || self.orient_for_end(cluster, pair, to_start).is_some()
    }

    /// Whether the link would join the chain's two open ends.
    pub fn link_would_close_chain(&self, cluster: &SvCluster, pair: &LinkedPair) -> bool {
        match self.open_breakends(cluster) {
            (Some(start), Some(end)) => pair.other_breakend(end) == Some(start),
            _ => false,
        }
    }

    ///
    /// Append or prepend a link, orienting it to the chain's traversal
    /// direction. A link that does not meet the chosen open end is rejected
    /// and the chain is left untouched.
    ///
    pub fn add_link(&mut self, cluster: &SvCluster, pair: &LinkedPair, to_start: bool) -> bool {
        if self.is_closed {
            error!("chain({}) is closed, cannot add link {}", self.id, pair);
            return false;
        }

        if self.links.is_empty() {
            self.links.push(pair.clone());
            return true;
        }

        match self.orient_for_end(cluster, pair, to_start) {
            Some(oriented) => {
                if to_start {
                    self.links.insert(0, oriented);
                } else {
                    self.links.push(oriented);
                }
                true
            }
            None => {
                error!(
                    "chain({}) cannot add link {} at {}: open breakends {:?}",
                    self.id,
                    pair,
                    if to_start { "start" } else { "end" },
                    self.open_breakends(cluster)
                );
                false
            }
        }
    }

    /// Close the chain into a loop with a link joining its two open ends.
    pub fn close_chain(&mut self, cluster: &SvCluster, pair: &LinkedPair) -> bool {
        let (Some(start), Some(end)) = self.open_breakends(cluster) else {
            error!("chain({}) has no open ends to close", self.id);
            return false;
        };

        if pair.other_breakend(end) != Some(start) {
            error!(
                "chain({}) link {} does not join open ends {} and {}",
                self.id, pair, end, start
            );
            return false;
        }

        let mut oriented = pair.clone();
        oriented.first = end;
        oriented.second = start;
        self.links.push(oriented);
        self.is_closed = true;
        true
    }

    ///
    /// Join another chain onto this one through a link between an open end of
    /// each. Either chain is reversed as needed so the result runs
    /// `self -> pair -> other`.
    ///
    pub fn add_chain(&mut self, cluster: &SvCluster, pair: &LinkedPair, other: &SvChain) -> bool {
        if self.is_closed || other.is_closed {
            error!(
                "chain({}) cannot merge closed chain({})",
                self.id, other.id
            );
            return false;
        }

        let (start, end) = self.open_breakends(cluster);
        let (own, reverse_self) = if let Some(b) = end.filter(|b| pair.has_breakend(*b)) {
            (b, false)
        } else if let Some(b) = start.filter(|b| pair.has_breakend(*b)) {
            (b, true)
        } else {
            error!(
                "chain({}) has no open end on link {} to merge chain({})",
                self.id, pair, other.id
            );
            return false;
        };

        let Some(target) = pair.other_breakend(own) else {
            return false;
        };

        let mut other = other.clone();
        let (other_start, other_end) = other.open_breakends(cluster);
        if other_start != Some(target) {
            if other_end != Some(target) {
                error!(
                    "chain({}) is not open at {} to merge into chain({})",
                    other.id, target, self.id
                );
                return false;
            }
            other.reverse();
        }

        if reverse_self {
            self.reverse();
        }

        let mut oriented = pair.clone();
        oriented.first = own;
        oriented.second = target;

        self.links.push(oriented);
        self.links.extend(other.links);
        true
    }

    ///
    /// Join another chain directly through the SV at this chain's end, where
    /// this chain is open at one side of the SV and `other` at the opposite side.
    ///
    pub fn append_through_sv(&mut self, cluster: &SvCluster, other: &SvChain) -> bool {
        match (
            self.open_breakend(cluster, false),
            other.open_breakend(cluster, true),
        ) {
            (Some(end), Some(start)) if end == start.other() => {
                self.links.extend(other.links.iter().cloned());
                true
            }
            _ => {
                error!(
                    "chain({}) and chain({}) do not meet at one SV",
                    self.id, other.id
                );
                false
            }
        }
    }

    pub fn reverse(&mut self) {
        self.links.reverse();
        for link in self.links.iter_mut() {
            std::mem::swap(&mut link.first, &mut link.second);
        }
    }

    ///
    /// Replicate the whole chain around a duplicating SV whose two breakends
    /// link to the chain's two open ends.
    ///
    /// The chain becomes: original links, `pair_end` leaving the open end,
    /// `pair_start` returning to the open start, then the original links again.
    ///
    pub fn duplicate_chain_on_link(
        &mut self,
        cluster: &SvCluster,
        pair_end: &LinkedPair,
        pair_start: &LinkedPair,
    ) -> bool {
        let (Some(start), Some(end)) = self.open_breakends(cluster) else {
            error!("chain({}) has no open ends to duplicate on", self.id);
            return false;
        };

        let end_link = if pair_end.first == end {
            pair_end.clone()
        } else if pair_end.second == end {
            pair_end.reversed()
        } else {
            error!(
                "chain({}) dup link {} does not meet open end {}",
                self.id, pair_end, end
            );
            return false;
        };

        let start_link = if pair_start.second == start {
            pair_start.clone()
        } else if pair_start.first == start {
            pair_start.reversed()
        } else {
            error!(
                "chain({}) dup link {} does not meet open start {}",
                self.id, pair_start, start
            );
            return false;
        };

        if end_link.second.other() != start_link.first {
            error!(
                "chain({}) dup links {} and {} are not joined by one SV",
                self.id, end_link, start_link
            );
            return false;
        }

        let copies: Vec<LinkedPair> = self.links.iter().map(|l| l.duplicate()).collect();
        self.links.push(end_link);
        self.links.push(start_link);
        self.links.extend(copies);
        true
    }

    ///
    /// Start a chain on an unchained SV duplicated by another: the SV's end
    /// links out to the duplicating SV, which links back to the SV's start.
    /// Both of the SV's breakends stay open.
    ///
    pub fn duplicate_sv_on_links(
        &mut self,
        sv: usize,
        pair_end: &LinkedPair,
        pair_start: &LinkedPair,
    ) -> bool {
        if !self.links.is_empty() {
            error!("chain({}) must be empty to start an SV duplication", self.id);
            return false;
        }

        let (start, end) = (BreakendId::start(sv), BreakendId::end(sv));

        let end_link = if pair_end.first == end {
            pair_end.clone()
        } else if pair_end.second == end {
            pair_end.reversed()
        } else {
            error!("dup link {} does not meet breakend {}", pair_end, end);
            return false;
        };

        let start_link = if pair_start.second == start {
            pair_start.clone()
        } else if pair_start.first == start {
            pair_start.reversed()
        } else {
            error!("dup link {} does not meet breakend {}", pair_start, start);
            return false;
        };

        if end_link.second.other() != start_link.first {
            error!(
                "dup links {} and {} are not joined by one SV",
                end_link, start_link
            );
            return false;
        }

        self.links.push(end_link);
        self.links.push(start_link);
        true
    }

    /// Splice a single-SV foldback onto the open breakend both links share.
    pub fn foldback_chain_on_link(
        &mut self,
        cluster: &SvCluster,
        pair1: &LinkedPair,
        pair2: &LinkedPair,
    ) -> bool {
        self.foldback_chain_on_chain(cluster, None, pair1, pair2)
    }

    ///
    /// Splice a foldback onto the breakend `x` shared by both links.
    ///
    /// The result runs: this chain up to `x`, `x -> fa`, the foldback section,
    /// `fb -> x`, then this chain mirrored back to its start. The foldback
    /// section is empty for a single-SV foldback, or the links of
    /// `foldback_chain` whose open ends are `fa` and `fb`. An empty chain just
    /// takes the foldback unit.
    ///
    pub fn foldback_chain_on_chain(
        &mut self,
        cluster: &SvCluster,
        foldback_chain: Option<&SvChain>,
        pair1: &LinkedPair,
        pair2: &LinkedPair,
    ) -> bool {
        let shared = if pair2.has_breakend(pair1.first) {
            pair1.first
        } else if pair2.has_breakend(pair1.second) {
            pair1.second
        } else {
            error!(
                "chain({}) foldback links {} and {} share no breakend",
                self.id, pair1, pair2
            );
            return false;
        };

        let (Some(fa), Some(fb)) = (pair1.other_breakend(shared), pair2.other_breakend(shared))
        else {
            return false;
        };

        let middle: Vec<LinkedPair> = match foldback_chain {
            None => {
                if fa.other() != fb {
                    error!(
                        "chain({}) foldback breakends {} and {} are not one SV",
                        self.id, fa, fb
                    );
                    return false;
                }
                Vec::new()
            }
            Some(fc) => {
                let mut fc = fc.clone();
                match fc.open_breakends(cluster) {
                    (Some(s), Some(e)) if s == fa && e == fb => {}
                    (Some(s), Some(e)) if s == fb && e == fa => fc.reverse(),
                    ends => {
                        error!(
                            "foldback chain({}) open ends {:?} do not match {} and {}",
                            fc.id, ends, fa, fb
                        );
                        return false;
                    }
                }
                fc.links
            }
        };

        let mut link_in = pair1.clone();
        link_in.first = shared;
        link_in.second = fa;

        let mut link_out = pair2.clone();
        link_out.first = fb;
        link_out.second = shared;

        if self.links.is_empty() {
            self.links.push(link_in);
            self.links.extend(middle);
            self.links.push(link_out);
            return true;
        }

        let (start, end) = self.open_breakends(cluster);
        if end != Some(shared) {
            if start != Some(shared) {
                error!(
                    "chain({}) is not open at foldback breakend {}",
                    self.id, shared
                );
                return false;
            }
            self.reverse();
        }

        let mirror: Vec<LinkedPair> = self
            .links
            .iter()
            .rev()
            .map(|l| l.reversed().duplicate())
            .collect();

        self.links.push(link_in);
        self.links.extend(middle);
        self.links.push(link_out);
        self.links.extend(mirror);
        true
    }

    ///
    /// Reverse the section that leaves `breakend` and later returns to it,
    /// which undoes a traversal through a reciprocal inversion in the wrong
    /// direction. Returns false when no such section exists.
    ///
    pub fn reverse_section_on_breakend(&mut self, breakend: BreakendId) -> bool {
        let Some(start) = self.links.iter().position(|l| l.first == breakend) else {
            return false;
        };

        let Some(end) = (start..self.links.len())
            .rev()
            .find(|&i| self.links[i].second == breakend)
        else {
            return false;
        };

        let section = &mut self.links[start..=end];
        section.reverse();
        for link in section.iter_mut() {
            std::mem::swap(&mut link.first, &mut link.second);
        }
        true
    }

    ///
    /// Whether both chains run through the same links, in either direction.
    /// With `allow_subsets`, the shorter chain only has to appear as a
    /// contiguous run inside the longer one.
    ///
    pub fn identical_chain(&self, other: &SvChain, allow_subsets: bool) -> bool {
        let keys: Vec<_> = self.links.iter().map(|l| l.key()).collect();
        let other_keys: Vec<_> = other.links.iter().map(|l| l.key()).collect();
        let reversed: Vec<_> = other_keys.iter().rev().copied().collect();

        if !allow_subsets {
            return keys == other_keys || keys == reversed;
        }

        let (longer, shorter, shorter_rev) = if keys.len() >= other_keys.len() {
            (&keys, &other_keys, reversed)
        } else {
            let rev: Vec<_> = keys.iter().rev().copied().collect();
            (&other_keys, &keys, rev)
        };

        if shorter.is_empty() {
            return false;
        }

        longer
            .windows(shorter.len())
            .any(|w| w == shorter.as_slice() || w == shorter_rev.as_slice())
    }

    /// Check contiguity, breakend existence and closure.
    pub fn is_consistent(&self, cluster: &SvCluster) -> Result<(), String> {
        for link in &self.links {
            if cluster.breakend(link.first).is_none() || cluster.breakend(link.second).is_none() {
                return Err(format!("link {} refers to a missing breakend", link));
            }
        }

        for pair in self.links.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.second.other() != next.first {
                return Err(format!("links {} and {} are not contiguous", prev, next));
            }
        }

        if self.is_closed {
            let closed = match (self.links.first(), self.links.last()) {
                (Some(first), Some(last)) => last.second == first.first.other(),
                _ => false,
            };
            if !closed {
                return Err("marked closed but its ends do not meet".to_string());
            }
        }

        Ok(())
    }

    ///
    /// Carve `jcn` off this chain into a new chain over the same links.
    /// The copied links are unowned until instances are assigned.
    ///
    pub fn split(&mut self, new_id: usize, jcn: f64) -> SvChain {
        let links = self
            .links
            .iter()
            .map(|l| {
                let mut link = l.clone();
                link.instance = None;
                link
            })
            .collect();

        self.jcn = (self.jcn - jcn).max(0.0);

        SvChain {
            id: new_id,
            links,
            jcn,
            jcn_uncertainty: self.jcn_uncertainty,
            is_closed: self.is_closed,
            is_double_minute: self.is_double_minute,
        }
    }

    /// Give every unowned link a fresh instance id.
    pub fn assign_link_instances(&mut self, counters: &mut ChainCounters) {
        for link in self.links.iter_mut().filter(|l| l.instance.is_none()) {
            link.instance = Some(counters.next_link_id());
        }
    }
}

impl Display for SvChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chain({}) jcn={} links={}{}",
            self.id,
            format_jcn(self.jcn),
            self.links.len(),
            if self.is_closed { " closed" } else { "" }
        )
    }
}

/// Find two open chains meeting at opposite sides of one SV, returning their
/// indices and whether each must be reversed so the first runs into the second.
fn find_reconcile_pair(
    chains: &[SvChain],
    cluster: &SvCluster,
) -> Option<(usize, usize, bool, bool)> {
    for i in 0..chains.len() {
        if chains[i].is_closed() || chains[i].is_empty() {
            continue;
        }
        let (start_i, end_i) = chains[i].open_breakends(cluster);

        for j in (i + 1)..chains.len() {
            if chains[j].is_closed() || chains[j].is_empty() {
                continue;
            }
            let (start_j, end_j) = chains[j].open_breakends(cluster);

            for (reverse_i, reverse_j) in [(false, false), (false, true), (true, false), (true, true)]
            {
                let left_end = if reverse_i { start_i } else { end_i };
                let right_start = if reverse_j { end_j } else { start_j };

                if let (Some(a), Some(b)) = (left_end, right_start) {
                    if a == b.other() {
                        return Some((i, j, reverse_i, reverse_j));
                    }
                }
            }
        }
    }
    None
}

///
/// Merge chains whose open ends are the two breakends of one SV until no
/// such pair remains.
///
/// When the JCNs differ the higher chain is split first, so the merged chain
/// carries the lower JCN and the remainder stays behind as its own chain.
/// Returns the number of merges; clusters with more than `max_chains` chains
/// are left untouched.
///
pub fn reconcile_chains(
    chains: &mut Vec<SvChain>,
    cluster: &SvCluster,
    counters: &mut ChainCounters,
    max_chains: usize,
) -> usize {
    if chains.len() > max_chains {
        warn!(
            "cluster({}) skipping reconciliation of {} chains",
            cluster.id,
            chains.len()
        );
        return 0;
    }

    let max_merges = max_chains.max(chains.len()) * 2;
    let mut merges = 0;

    while merges < max_merges {
        let Some((i, j, reverse_i, reverse_j)) = find_reconcile_pair(chains, cluster) else {
            break;
        };

        let jcn_i = chains[i].jcn();
        let jcn_j = chains[j].jcn();
        let uncertainty = chains[i].jcn_uncertainty().max(chains[j].jcn_uncertainty());

        debug!(
            "cluster({}) reconciling {} with {}",
            cluster.id, chains[i], chains[j]
        );

        let mut right = chains[j].clone();
        if reverse_j {
            right.reverse();
        }

        if copy_numbers_equal(jcn_i, jcn_j) {
            let mut left = chains[i].clone();
            if reverse_i {
                left.reverse();
            }
            if !left.append_through_sv(cluster, &right) {
                break;
            }
            let (jcn, combined) = combine_jcn(
                jcn_i,
                chains[i].jcn_uncertainty(),
                jcn_j,
                chains[j].jcn_uncertainty(),
            );
            left.set_jcn(jcn, combined);
            chains[i] = left;
            chains.remove(j);
        } else if jcn_i > jcn_j {
            let mut left = chains[i].split(counters.next_chain_id(), jcn_j);
            left.assign_link_instances(counters);
            if reverse_i {
                left.reverse();
            }
            if !left.append_through_sv(cluster, &right) {
                let restored = chains[i].jcn() + jcn_j;
                let restored_uncertainty = chains[i].jcn_uncertainty();
                chains[i].set_jcn(restored, restored_uncertainty);
                break;
            }
            left.id = chains[j].id;
            left.set_jcn(jcn_j, uncertainty);
            chains[j] = left;
        } else {
            let mut left = chains[i].clone();
            if reverse_i {
                left.reverse();
            }
            let mut part = chains[j].split(counters.next_chain_id(), jcn_i);
            part.assign_link_instances(counters);
            if reverse_j {
                part.reverse();
            }
            if !left.append_through_sv(cluster, &part) {
                let restored = chains[j].jcn() + jcn_i;
                let restored_uncertainty = chains[j].jcn_uncertainty();
                chains[j].set_jcn(restored, restored_uncertainty);
                break;
            }
            left.set_jcn(jcn_i, uncertainty);
            chains[i] = left;
        }

        merges += 1;
    }

    merges
}

/// Collapse chains that run through identical links, or whose links appear
/// as a run inside a longer chain, summing their JCN into the longer one.
/// Returns how many chains were removed.
pub fn remove_identical_chains(chains: &mut Vec<SvChain>) -> usize {
    let mut removed = 0;
    let mut i = 0;

    while i < chains.len() {
        let mut j = i + 1;
        while j < chains.len() {
            if chains[i].identical_chain(&chains[j], true) {
                if chains[j].link_count() > chains[i].link_count() {
                    chains.swap(i, j);
                }
                let duplicate = chains.remove(j);
                let jcn = chains[i].jcn() + duplicate.jcn();
                let uncertainty = chains[i].jcn_uncertainty().max(duplicate.jcn_uncertainty());
                debug!("removing chain({}) identical to {}", duplicate.id, chains[i]);
                chains[i].set_jcn(jcn, uncertainty);
                removed += 1;
            } else {
                j += 1;
            }
        }
        i += 1;
    }

    removed
}
