use std::collections::BTreeMap;

use fxhash::FxHashSet;
use log::debug;

use svchain_core::models::{BreakendId, LinkedPair, SvCluster, SvType};
use svchain_core::utils::copy_numbers_equal;

use crate::config::ChainingConfig;
use crate::jcn_limits::ChainJcnLimits;
use crate::proposed::PairKey;

///
/// Candidate templated insertions for every breakend still available to the
/// chainer, each list sorted shortest-first.
///
/// Adjacent pairs and complex-duplication candidates are recorded alongside
/// for the rules that prefer them.
///
#[derive(Debug, Clone, Default)]
pub struct BreakendLinkCatalog {
    links: BTreeMap<BreakendId, Vec<LinkedPair>>,
    adjacent_pairs: Vec<LinkedPair>,
    adjacent_matching_pairs: Vec<LinkedPair>,
    complex_dup_candidates: BTreeMap<usize, Vec<usize>>,
}

/// What the catalog needs to know about the current ledger.
pub struct CatalogInputs<'a> {
    /// Chaining JCN of every SV still in play.
    pub sv_jcn: &'a BTreeMap<usize, f64>,
    pub exhausted: &'a FxHashSet<BreakendId>,
    /// Pairs already committed to a chain.
    pub used_pairs: &'a FxHashSet<PairKey>,
    pub has_replication: bool,
}

impl BreakendLinkCatalog {
    pub fn build(
        cluster: &SvCluster,
        config: &ChainingConfig,
        limits: &ChainJcnLimits,
        inputs: &CatalogInputs,
    ) -> Self {
        let mut catalog = Self::default();

        let available = |id: BreakendId| {
            inputs.sv_jcn.contains_key(&id.sv) && !inputs.exhausted.contains(&id)
        };

        for (chromosome, breakends) in cluster.chr_breakend_map() {
            for (i, &lower) in breakends.iter().enumerate() {
                let Some(lower_be) = cluster.breakend(lower) else {
                    continue;
                };
                if lower_be.orientation != -1 || !available(lower) {
                    continue;
                }

                for (j, &upper) in breakends.iter().enumerate().skip(i + 1) {
                    let Some(upper_be) = cluster.breakend(upper) else {
                        continue;
                    };

                    if limits.blocks_extension(chromosome, lower_be.position, upper_be.position) {
                        break;
                    }

                    if upper_be.orientation != 1 || upper.sv == lower.sv || !available(upper) {
                        continue;
                    }

                    let min_length = config
                        .min_templated_insertion_length
                        .max(lower_be.min_templated_insertion_length())
                        .max(upper_be.min_templated_insertion_length());

                    if upper_be.position - lower_be.position < min_length {
                        continue;
                    }

                    let Some(pair) = cluster.form_link(lower, upper) else {
                        continue;
                    };

                    if !inputs.has_replication && inputs.used_pairs.contains(&pair.key()) {
                        continue;
                    }

                    if Self::is_adjacent(cluster, breakends, i, j) {
                        let matching = match (
                            inputs.sv_jcn.get(&lower.sv),
                            inputs.sv_jcn.get(&upper.sv),
                        ) {
                            (Some(&j1), Some(&j2)) => copy_numbers_equal(j1, j2),
                            _ => false,
                        };
                        if matching {
                            catalog.adjacent_matching_pairs.push(pair.clone());
                        }
                        catalog.adjacent_pairs.push(pair.clone());
                    }

                    catalog.links.entry(lower).or_default().push(pair.clone());
                    catalog.links.entry(upper).or_default().push(pair);
                }
            }
        }

        for list in catalog.links.values_mut() {
            list.sort_by_key(|p| (p.length, p.key()));
        }

        catalog.find_complex_dup_candidates(cluster, inputs.sv_jcn);

        debug!(
            "cluster({}) catalog: {} breakends with links, {} adjacent, {} comp-dup candidates",
            cluster.id,
            catalog.links.len(),
            catalog.adjacent_pairs.len(),
            catalog.complex_dup_candidates.len()
        );

        catalog
    }

    /// Neighbouring breakends, or breakends separated by one breakend that
    /// forms a deletion bridge with either of them.
    fn is_adjacent(cluster: &SvCluster, breakends: &[BreakendId], i: usize, j: usize) -> bool {
        if j == i + 1 {
            return true;
        }
        if j != i + 2 {
            return false;
        }

        let (lower, middle, upper) = (breakends[i], breakends[i + 1], breakends[j]);
        cluster
            .breakend(middle)
            .and_then(|be| be.db_link)
            .is_some_and(|db| db.other == lower || db.other == upper)
    }

    /// SVs whose breakends both reach the two breakends of another SV with
    /// roughly double their JCN, keyed by the duplicating SV.
    fn find_complex_dup_candidates(&mut self, cluster: &SvCluster, sv_jcn: &BTreeMap<usize, f64>) {
        for (&dup, &dup_jcn) in sv_jcn {
            if cluster.sv(dup).is_single_ended() {
                continue;
            }

            let (dup_start, dup_end) = (BreakendId::start(dup), BreakendId::end(dup));

            for (&target, &target_jcn) in sv_jcn {
                if target == dup
                    || cluster.sv(target).is_single_ended()
                    || !copy_numbers_equal(target_jcn, dup_jcn * 2.0)
                {
                    continue;
                }

                let (target_start, target_end) = (BreakendId::start(target), BreakendId::end(target));
                let straight = self.has_link(dup_start, target_start) && self.has_link(dup_end, target_end);
                let crossed = self.has_link(dup_start, target_end) && self.has_link(dup_end, target_start);

                if straight || crossed {
                    self.complex_dup_candidates.entry(dup).or_default().push(target);
                }
            }
        }
    }

    pub fn has_link(&self, breakend1: BreakendId, breakend2: BreakendId) -> bool {
        self.links
            .get(&breakend1)
            .is_some_and(|list| list.iter().any(|p| p.has_breakend(breakend2)))
    }

    pub fn links_for(&self, breakend: BreakendId) -> &[LinkedPair] {
        self.links.get(&breakend).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn option_count(&self, breakend: BreakendId) -> usize {
        self.links_for(breakend).len()
    }

    pub fn breakends(&self) -> impl Iterator<Item = BreakendId> + '_ {
        self.links.keys().copied()
    }

    /// Every candidate once, shortest first.
    pub fn all_links(&self) -> Vec<LinkedPair> {
        let mut seen: FxHashSet<PairKey> = FxHashSet::default();
        let mut links: Vec<LinkedPair> = self
            .links
            .values()
            .flatten()
            .filter(|p| seen.insert(p.key()))
            .cloned()
            .collect();
        links.sort_by_key(|p| (p.length, p.key()));
        links
    }

    /// Whether any candidate link remains, skipped or not.
    pub fn has_viable_links(&self) -> bool {
        self.links.values().any(|l| !l.is_empty())
    }

    pub fn adjacent_pairs(&self) -> &[LinkedPair] {
        &self.adjacent_pairs
    }

    pub fn adjacent_matching_pairs(&self) -> &[LinkedPair] {
        &self.adjacent_matching_pairs
    }

    pub fn complex_dup_candidates(&self) -> &BTreeMap<usize, Vec<usize>> {
        &self.complex_dup_candidates
    }

    /// Drop a breakend that can take no further links, with every candidate
    /// that uses it.
    pub fn remove_breakend(&mut self, breakend: BreakendId) {
        let Some(removed) = self.links.remove(&breakend) else {
            return;
        };

        for pair in &removed {
            if let Some(other) = pair.other_breakend(breakend) {
                if let Some(list) = self.links.get_mut(&other) {
                    list.retain(|p| !p.has_breakend(breakend));
                    if list.is_empty() {
                        self.links.remove(&other);
                    }
                }
            }
        }

        self.adjacent_pairs.retain(|p| !p.has_breakend(breakend));
        self.adjacent_matching_pairs.retain(|p| !p.has_breakend(breakend));
    }

    /// Drop one candidate, used once a non-replicating pair is committed.
    pub fn remove_link(&mut self, key: PairKey) {
        for breakend in [key.0, key.1] {
            if let Some(list) = self.links.get_mut(&breakend) {
                list.retain(|p| p.key() != key);
                if list.is_empty() {
                    self.links.remove(&breakend);
                }
            }
        }
        self.adjacent_pairs.retain(|p| p.key() != key);
        self.adjacent_matching_pairs.retain(|p| p.key() != key);
    }
}

///
/// Remove assembled links that span a short DEL or DUP whose two breakends
/// are themselves assembled to the spanning link's breakends: the direct
/// pairings through the short SV explain both breakends, so the outer link is
/// an artefact.
///
/// Returns the kept and the removed links.
///
pub fn analyse_multi_connection_breakends(
    cluster: &SvCluster,
    assembled: &[LinkedPair],
    config: &ChainingConfig,
) -> (Vec<LinkedPair>, Vec<LinkedPair>) {
    let mut kept = Vec::new();
    let mut removed = Vec::new();

    for (index, link) in assembled.iter().enumerate() {
        let others: Vec<&LinkedPair> = assembled
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, l)| l)
            .collect();

        let partners = |breakend: BreakendId| -> Vec<BreakendId> {
            others
                .iter()
                .filter_map(|l| l.other_breakend(breakend))
                .collect()
        };

        let first_partners = partners(link.first);
        let second_partners = partners(link.second);

        let spans_short_sv = first_partners.iter().any(|p1| {
            second_partners.iter().any(|p2| {
                if p1.sv != p2.sv || *p1 != p2.other() {
                    return false;
                }
                let sv = cluster.sv(p1.sv);
                matches!(sv.sv_type, SvType::Del | SvType::Dup)
                    && sv.length() <= config.multi_connection_max_sv_length
            })
        });

        if spans_short_sv {
            debug!(
                "cluster({}) removing assembled link {} spanning a short SV",
                cluster.id, link
            );
            removed.push(link.clone());
        } else {
            kept.push(link.clone());
        }
    }

    (kept, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use svchain_core::models::{Breakend, SvVarData};

    fn sv(id: u32, sv_type: SvType, s: (&str, i64, i8), e: (&str, i64, i8), jcn: f64) -> SvVarData {
        SvVarData::new(
            id,
            sv_type,
            Breakend::new(s.0, s.1, s.2),
            Some(Breakend::new(e.0, e.1, e.2)),
            jcn,
        )
    }

    fn build(cluster: &SvCluster, config: &ChainingConfig) -> BreakendLinkCatalog {
        let sv_jcn: BTreeMap<usize, f64> =
            (0..cluster.sv_count()).map(|i| (i, cluster.sv(i).jcn)).collect();
        let exhausted = FxHashSet::default();
        let used = FxHashSet::default();
        let inputs = CatalogInputs {
            sv_jcn: &sv_jcn,
            exhausted: &exhausted,
            used_pairs: &used,
            has_replication: cluster.requires_replication,
        };
        BreakendLinkCatalog::build(cluster, config, &ChainJcnLimits::default(), &inputs)
    }

    /// A(0) BND end chr1 1000-, B(1) BND start chr1 1500+, C(2) BND start chr1 3000+
    #[fixture]
    fn cluster() -> SvCluster {
        let svs = vec![
            sv(1, SvType::Bnd, ("2", 100, 1), ("1", 1000, -1), 1.0),
            sv(2, SvType::Bnd, ("1", 1500, 1), ("3", 100, -1), 1.0),
            sv(3, SvType::Bnd, ("1", 3000, 1), ("4", 100, -1), 2.0),
        ];
        SvCluster::new(1, "S1", svs)
    }

    #[rstest]
    fn test_links_sorted_shortest_first(cluster: SvCluster) {
        let catalog = build(&cluster, &ChainingConfig::default());
        let links = catalog.links_for(BreakendId::end(0));

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].second, BreakendId::start(1));
        assert_eq!(links[0].length, 500);
        assert_eq!(links[1].second, BreakendId::start(2));
        assert_eq!(catalog.option_count(BreakendId::start(1)), 1);
        assert_eq!(catalog.all_links().len(), 2);
    }

    #[rstest]
    fn test_adjacent_pairs(cluster: SvCluster) {
        let catalog = build(&cluster, &ChainingConfig::default());
        assert_eq!(catalog.adjacent_pairs().len(), 1);
        assert_eq!(catalog.adjacent_pairs()[0].key(), (BreakendId::end(0), BreakendId::start(1)));
        assert_eq!(catalog.adjacent_matching_pairs().len(), 1);
    }

    #[rstest]
    fn test_min_templated_insertion_length(cluster: SvCluster) {
        let config = ChainingConfig::default().with_min_templated_insertion_length(1000);
        let catalog = build(&cluster, &config);
        assert_eq!(catalog.option_count(BreakendId::end(0)), 1);
        assert!(!catalog.has_link(BreakendId::end(0), BreakendId::start(1)));
    }

    #[rstest]
    fn test_remove_breakend(cluster: SvCluster) {
        let mut catalog = build(&cluster, &ChainingConfig::default());
        catalog.remove_breakend(BreakendId::start(1));

        assert_eq!(catalog.option_count(BreakendId::start(1)), 0);
        assert_eq!(catalog.option_count(BreakendId::end(0)), 1);
        assert!(catalog.adjacent_pairs().is_empty());
        assert!(catalog.has_viable_links());

        catalog.remove_breakend(BreakendId::end(0));
        assert!(!catalog.has_viable_links());
    }

    #[rstest]
    fn test_complex_dup_candidate() {
        // D(0) DUP-like pair of breakends facing both ends of T(1) with twice its JCN
        let svs = vec![
            sv(10, SvType::Bnd, ("1", 5000, 1), ("1", 1000, -1), 1.0),
            sv(11, SvType::Bnd, ("1", 2000, -1), ("1", 4000, 1), 2.0),
        ];
        let cluster = SvCluster::new(2, "S1", svs).with_replication(true);
        let catalog = build(&cluster, &ChainingConfig::default());

        assert_eq!(catalog.complex_dup_candidates().get(&0), Some(&vec![1]));
        assert!(catalog.complex_dup_candidates().get(&1).is_none());
    }

    #[rstest]
    fn test_spanning_assembled_link_removed() {
        let svs = vec![
            sv(1, SvType::Bnd, ("2", 100, 1), ("1", 100, -1), 1.0),
            sv(2, SvType::Del, ("1", 500, 1), ("1", 700, -1), 1.0),
            sv(3, SvType::Bnd, ("1", 1100, 1), ("3", 100, -1), 1.0),
        ];
        let cluster = SvCluster::new(3, "S1", svs)
            .with_assembled_link(BreakendId::end(0), BreakendId::start(2))
            .with_assembled_link(BreakendId::end(0), BreakendId::start(1))
            .with_assembled_link(BreakendId::end(1), BreakendId::start(2));

        let (kept, removed) = analyse_multi_connection_breakends(
            &cluster,
            &cluster.assembled_links,
            &ChainingConfig::default(),
        );

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].key(), (BreakendId::end(0), BreakendId::start(2)));
        assert_eq!(kept.len(), 2);
    }
}
