use std::cmp::Reverse;

use fxhash::{FxHashMap, FxHashSet};
use log::debug;

use svchain_core::models::{BreakendId, LinkedPair, SvCluster};
use svchain_core::utils::{copy_numbers_equal, jcn_ranges_overlap};

use crate::allocator::LinkAllocator;
use crate::foldback::{FoldbackBreakendPair, collect_foldbacks};
use crate::jcn_limits::ChainJcnLimits;
use crate::proposed::{ChainingRule, JcnMatchType, PairKey, ProposalKind, ProposedLinks};

pub const REPLICATION_RULES: &[ChainingRule] = &[
    ChainingRule::FoldbackSplit,
    ChainingRule::CompDupSplit,
    ChainingRule::Only,
    ChainingRule::JcnMatch,
    ChainingRule::Adjacent,
    ChainingRule::JcnMax,
    ChainingRule::Nearest,
];

pub const NON_REPLICATION_RULES: &[ChainingRule] = &[
    ChainingRule::Only,
    ChainingRule::AdjacentMatch,
    ChainingRule::Nearest,
];

/// Precedence among the ways a foldback can be placed, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FoldbackPriority {
    /// The split breakend carries more than twice the foldback's JCN.
    InexactSplit,
    /// The split breakend is on a larger foldback, which gets split.
    SplitsLargerFoldback,
    /// A foldback breakend has a JCN-matched link to a non-foldback breakend.
    MatchedLink,
    /// The split breakend carries exactly twice the foldback's JCN.
    ExactSplit,
}

///
/// Runs the ordered rule cascade against the allocator's current state and
/// returns the links to try next.
///
/// Each rule narrows the proposals left by the previous one, or generates
/// its own when there are none. A rule that matches nothing passes its input
/// through. The cascade stops early once a single proposal remains whose
/// JCN fits the allele copy number it spans.
///
pub struct RuleSelector<'a> {
    cluster: &'a SvCluster,
    allocator: &'a LinkAllocator,
    limits: &'a ChainJcnLimits,
    rules: &'static [ChainingRule],
}

impl<'a> RuleSelector<'a> {
    pub fn new(cluster: &'a SvCluster, allocator: &'a LinkAllocator, limits: &'a ChainJcnLimits) -> Self {
        let rules = if allocator.has_replication() {
            REPLICATION_RULES
        } else {
            NON_REPLICATION_RULES
        };

        Self {
            cluster,
            allocator,
            limits,
            rules,
        }
    }

    pub fn rules(&self) -> &[ChainingRule] {
        self.rules
    }

    pub fn find_proposed_links(&self) -> Vec<ProposedLinks> {
        let mut proposals: Vec<ProposedLinks> = Vec::new();

        for &rule in self.rules {
            proposals = self.apply_rule(rule, proposals);

            if proposals.len() == 1 && self.is_supported(&proposals[0]) {
                debug!(
                    "cluster({}) rule {} selected {}",
                    self.cluster.id, rule, proposals[0]
                );
                return proposals;
            }
        }

        let supported: Vec<ProposedLinks> = proposals
            .iter()
            .filter(|p| self.is_supported(p))
            .cloned()
            .collect();

        if supported.is_empty() { proposals } else { supported }
    }

    /// Apply one rule to the proposals left by the rules before it. Proposals
    /// the rule matched are tagged with it.
    pub fn apply_rule(&self, rule: ChainingRule, input: Vec<ProposedLinks>) -> Vec<ProposedLinks> {
        let (mut output, matched) = match rule {
            ChainingRule::FoldbackSplit | ChainingRule::CompDupSplit if !input.is_empty() => {
                (input, false)
            }
            ChainingRule::FoldbackSplit => (self.foldback_split_proposals(), true),
            ChainingRule::CompDupSplit => (self.complex_dup_proposals(), true),
            ChainingRule::Only => {
                let counts = self.viable_option_counts();
                let single_option = |b: &BreakendId| counts.get(b) == Some(&1);
                self.narrow(input, rule, |p| {
                    p.links
                        .iter()
                        .any(|l| single_option(&l.first) || single_option(&l.second))
                })
            }
            ChainingRule::JcnMatch => {
                self.narrow(input, rule, |p| p.match_type == JcnMatchType::Matched)
            }
            ChainingRule::Adjacent => {
                let keys = Self::key_set(self.allocator.catalog().adjacent_pairs());
                self.narrow(input, rule, |p| p.keys().iter().all(|k| keys.contains(k)))
            }
            ChainingRule::AdjacentMatch => {
                let keys = Self::key_set(self.allocator.catalog().adjacent_matching_pairs());
                self.narrow(input, rule, |p| p.keys().iter().all(|k| keys.contains(k)))
            }
            ChainingRule::JcnMax => (self.max_jcn(input), true),
            ChainingRule::Nearest => (self.nearest(input), true),
            ChainingRule::Assembly => (input, false),
        };

        if matched {
            for proposal in output.iter_mut() {
                proposal.add_rule(rule);
            }
        }
        output
    }

    /// Whether every link of a proposal fits under the allele copy number it spans.
    pub fn is_supported(&self, proposal: &ProposedLinks) -> bool {
        proposal
            .links
            .iter()
            .all(|l| self.limits.link_supported(self.cluster, l, proposal.jcn))
    }

    /// Candidate links neither skipped nor touching an exhausted breakend.
    fn viable_links(&self) -> Vec<LinkedPair> {
        self.allocator
            .catalog()
            .all_links()
            .into_iter()
            .filter(|l| self.is_viable(l))
            .collect()
    }

    fn is_viable(&self, link: &LinkedPair) -> bool {
        !self.allocator.is_skipped(&link.key())
            && !self.allocator.is_exhausted(link.first)
            && !self.allocator.is_exhausted(link.second)
    }

    fn viable_link(&self, breakend1: BreakendId, breakend2: BreakendId) -> Option<LinkedPair> {
        self.allocator
            .catalog()
            .links_for(breakend1)
            .iter()
            .find(|l| l.has_breakend(breakend2) && self.is_viable(l))
            .cloned()
    }

    fn viable_option_counts(&self) -> FxHashMap<BreakendId, usize> {
        let mut counts: FxHashMap<BreakendId, usize> = FxHashMap::default();
        for link in self.viable_links() {
            *counts.entry(link.first).or_default() += 1;
            *counts.entry(link.second).or_default() += 1;
        }
        counts
    }

    fn key_set(links: &[LinkedPair]) -> FxHashSet<PairKey> {
        links.iter().map(|l| l.key()).collect()
    }

    fn single_proposal(&self, link: LinkedPair, rule: ChainingRule) -> Option<ProposedLinks> {
        let (jcn, uncertainty, match_type) = self.allocator.proposal_jcn(&link);
        (jcn > 0.0).then(|| ProposedLinks::single(link, jcn, uncertainty, match_type, rule))
    }

    fn all_single_proposals(&self, rule: ChainingRule) -> Vec<ProposedLinks> {
        self.viable_links()
            .into_iter()
            .filter_map(|l| self.single_proposal(l, rule))
            .collect()
    }

    /// Better JCN agreement first, then shorter links.
    fn rank(proposals: &mut [ProposedLinks]) {
        proposals.sort_by(|a, b| {
            Reverse(a.match_type)
                .cmp(&Reverse(b.match_type))
                .then_with(|| a.min_length().cmp(&b.min_length()))
                .then_with(|| a.keys().cmp(&b.keys()))
        });
    }

    /// Keep the proposals matching `keep`, generating them from every viable
    /// link when there is no input. Returns the input unchanged, flagged as
    /// unmatched, when nothing matches.
    fn narrow<F>(&self, input: Vec<ProposedLinks>, rule: ChainingRule, keep: F) -> (Vec<ProposedLinks>, bool)
    where
        F: Fn(&ProposedLinks) -> bool,
    {
        if input.is_empty() {
            let mut found: Vec<ProposedLinks> = self
                .all_single_proposals(rule)
                .into_iter()
                .filter(|p| keep(p))
                .collect();
            Self::rank(&mut found);
            return (found, true);
        }

        let found: Vec<ProposedLinks> = input.iter().filter(|p| keep(p)).cloned().collect();
        if found.is_empty() {
            (input, false)
        } else {
            (found, true)
        }
    }

    fn max_jcn(&self, input: Vec<ProposedLinks>) -> Vec<ProposedLinks> {
        let candidates = if input.is_empty() {
            self.all_single_proposals(ChainingRule::JcnMax)
        } else {
            input
        };

        let max = candidates.iter().map(|p| p.jcn).fold(0.0, f64::max);
        let mut found: Vec<ProposedLinks> = candidates
            .into_iter()
            .filter(|p| copy_numbers_equal(p.jcn, max))
            .collect();
        Self::rank(&mut found);
        found
    }

    /// Shortest proposals first, dropping any that share a breakend with one
    /// already kept.
    fn nearest(&self, input: Vec<ProposedLinks>) -> Vec<ProposedLinks> {
        let mut candidates = if input.is_empty() {
            self.all_single_proposals(ChainingRule::Nearest)
        } else {
            input
        };
        candidates.sort_by(|a, b| {
            a.min_length()
                .cmp(&b.min_length())
                .then_with(|| a.keys().cmp(&b.keys()))
        });

        let mut kept: Vec<ProposedLinks> = Vec::new();
        for proposal in candidates {
            if !kept.iter().any(|k| k.clashes(&proposal)) {
                kept.push(proposal);
            }
        }
        kept
    }

    ///
    /// Foldbacks are placed by splitting a breakend that both foldback ends
    /// link to. Only proposals of the best priority found are kept, so a
    /// foldback with a clean JCN-matched link elsewhere is not forced into an
    /// inexact split.
    ///
    fn foldback_split_proposals(&self) -> Vec<ProposedLinks> {
        let foldbacks = collect_foldbacks(
            self.cluster,
            self.allocator.sv_connections(),
            self.allocator.chains(),
        );

        let mut best: Option<FoldbackPriority> = None;
        let mut found: Vec<(FoldbackPriority, ProposedLinks)> = Vec::new();

        for foldback in &foldbacks {
            if foldback.breakends().iter().any(|b| self.allocator.is_exhausted(*b)) {
                continue;
            }

            for (priority, proposal) in self
                .foldback_splits(foldback)
                .into_iter()
                .chain(self.foldback_matched_links(foldback))
            {
                if best.is_some_and(|b| priority < b) {
                    continue;
                }
                best = best.max(Some(priority));
                found.push((priority, proposal));
            }
        }

        let Some(best) = best else {
            return Vec::new();
        };

        found
            .into_iter()
            .filter(|(p, _)| *p == best)
            .map(|(_, proposal)| proposal)
            .collect()
    }

    fn foldback_uncertainty(&self, foldback: &FoldbackBreakendPair) -> f64 {
        match foldback.chain {
            Some(id) => self
                .allocator
                .chains()
                .iter()
                .find(|c| c.id() == id)
                .map(|c| c.jcn_uncertainty())
                .unwrap_or(0.0),
            None => self.allocator.available_jcn(foldback.breakend1).1,
        }
    }

    fn foldback_splits(&self, foldback: &FoldbackBreakendPair) -> Vec<(FoldbackPriority, ProposedLinks)> {
        let (b1, b2) = (foldback.breakend1, foldback.breakend2);
        let jcn = foldback.jcn;
        let uncertainty = self.foldback_uncertainty(foldback);
        let required = jcn * 2.0;

        let mut splits = Vec::new();

        for link1 in self.allocator.catalog().links_for(b1) {
            let Some(split_breakend) = link1.other_breakend(b1) else {
                continue;
            };
            if foldback.has_breakend(split_breakend) || !self.is_viable(link1) {
                continue;
            }
            let Some(link2) = self.viable_link(b2, split_breakend) else {
                continue;
            };

            let data = self.allocator.breakend_jcn_data(self.cluster, split_breakend);
            let chains: Vec<(f64, f64)> = data
                .open_chains
                .iter()
                .filter(|c| Some(c.chain_id) != foldback.chain)
                .map(|c| (c.jcn, c.jcn_uncertainty))
                .collect();

            let exact = copy_numbers_equal(data.unchained, required)
                || chains.iter().any(|&(c, u)| {
                    copy_numbers_equal(c, required) || jcn_ranges_overlap(c, u, required, uncertainty)
                });
            let larger = data.unchained > required || chains.iter().any(|&(c, _)| c > required);

            let priority = if exact {
                FoldbackPriority::ExactSplit
            } else if !larger {
                continue;
            } else if self.cluster.is_foldback_breakend(split_breakend) {
                FoldbackPriority::SplitsLargerFoldback
            } else {
                FoldbackPriority::InexactSplit
            };

            let kind = ProposalKind::FoldbackSplit {
                split_breakend,
                foldback_chain: foldback.chain,
            };
            splits.push((
                priority,
                ProposedLinks::split(
                    link1.clone(),
                    link2,
                    jcn,
                    uncertainty,
                    ChainingRule::FoldbackSplit,
                    kind,
                ),
            ));
        }

        splits
    }

    fn foldback_matched_links(&self, foldback: &FoldbackBreakendPair) -> Vec<(FoldbackPriority, ProposedLinks)> {
        let mut links = Vec::new();

        for breakend in foldback.breakends() {
            for link in self.allocator.catalog().links_for(breakend) {
                let Some(other) = link.other_breakend(breakend) else {
                    continue;
                };
                if self.cluster.is_foldback_breakend(other) || !self.is_viable(link) {
                    continue;
                }

                let (jcn, uncertainty, match_type) = self.allocator.proposal_jcn(link);
                if match_type != JcnMatchType::Matched {
                    continue;
                }

                links.push((
                    FoldbackPriority::MatchedLink,
                    ProposedLinks::single(
                        link.clone(),
                        jcn,
                        uncertainty,
                        match_type,
                        ChainingRule::FoldbackSplit,
                    ),
                ));
            }
        }

        links
    }

    ///
    /// Duplications of a chain, or of an unchained SV, by an SV linking to
    /// both of its ends. Targets carrying exactly twice the duplicating SV's
    /// JCN are preferred over larger ones that would need splitting.
    ///
    fn complex_dup_proposals(&self) -> Vec<ProposedLinks> {
        let mut exact = Vec::new();
        let mut inexact = Vec::new();

        for (&dup, targets) in self.allocator.catalog().complex_dup_candidates() {
            let (dup_start, dup_end) = (BreakendId::start(dup), BreakendId::end(dup));
            if self.allocator.is_exhausted(dup_start) || self.allocator.is_exhausted(dup_end) {
                continue;
            }

            let (start_jcn, uncertainty) = self.allocator.available_jcn(dup_start);
            let (end_jcn, _) = self.allocator.available_jcn(dup_end);
            let jcn = start_jcn.min(end_jcn);
            if jcn <= 0.0 {
                continue;
            }
            let required = jcn * 2.0;

            for chain in self.allocator.chains() {
                if chain.is_closed() || chain.has_sv(dup) {
                    continue;
                }
                let (Some(start), Some(end)) = chain.open_breakends(self.cluster) else {
                    continue;
                };
                let Some((pair_end, pair_start)) = self.dup_links(dup, start, end) else {
                    continue;
                };

                let matched = copy_numbers_equal(chain.jcn(), required)
                    || jcn_ranges_overlap(chain.jcn(), chain.jcn_uncertainty(), required, uncertainty);
                if !matched && chain.jcn() <= required {
                    continue;
                }

                let kind = ProposalKind::ComplexDupSplit {
                    dup_sv: dup,
                    target_chain: Some(chain.id()),
                    target_sv: None,
                };
                let proposal = ProposedLinks::split(
                    pair_end,
                    pair_start,
                    jcn,
                    uncertainty,
                    ChainingRule::CompDupSplit,
                    kind,
                );
                if matched {
                    exact.push(proposal);
                } else {
                    inexact.push(proposal);
                }
            }

            for &target in targets {
                let (start, end) = (BreakendId::start(target), BreakendId::end(target));
                let start_data = self.allocator.breakend_jcn_data(self.cluster, start);
                let end_data = self.allocator.breakend_jcn_data(self.cluster, end);
                if !start_data.is_free() || !end_data.is_free() {
                    continue;
                }

                let matched = copy_numbers_equal(start_data.unchained, required)
                    && copy_numbers_equal(end_data.unchained, required);
                let enough = |available: f64| {
                    available >= required || copy_numbers_equal(available, required)
                };
                if !enough(start_data.unchained) || !enough(end_data.unchained) {
                    continue;
                }

                let Some((pair_end, pair_start)) = self.dup_links(dup, start, end) else {
                    continue;
                };

                let kind = ProposalKind::ComplexDupSplit {
                    dup_sv: dup,
                    target_chain: None,
                    target_sv: Some(target),
                };
                let proposal = ProposedLinks::split(
                    pair_end,
                    pair_start,
                    jcn,
                    uncertainty,
                    ChainingRule::CompDupSplit,
                    kind,
                );
                if matched {
                    exact.push(proposal);
                } else {
                    inexact.push(proposal);
                }
            }
        }

        if exact.is_empty() { inexact } else { exact }
    }

    /// The two links taking a path out of `end`, through the duplicating SV,
    /// and back into `start`.
    fn dup_links(&self, dup: usize, start: BreakendId, end: BreakendId) -> Option<(LinkedPair, LinkedPair)> {
        [BreakendId::start(dup), BreakendId::end(dup)]
            .into_iter()
            .find_map(|entry| {
                let pair_end = self.viable_link(end, entry)?;
                let pair_start = self.viable_link(entry.other(), start)?;
                Some((pair_end, pair_start))
            })
    }
}
