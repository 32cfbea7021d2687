use std::collections::BTreeMap;

use svchain_core::models::{BreakendId, SvCluster};

use crate::chain::SvChain;
use crate::chain_state::SvChainState;

/// Two breakends acting as one foldback unit, either the two sides of a
/// foldback SV or the two open ends of a chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldbackBreakendPair {
    pub breakend1: BreakendId,
    pub breakend2: BreakendId,
    pub jcn: f64,
    /// Id of the chain whose open ends form the foldback.
    pub chain: Option<usize>,
}

impl FoldbackBreakendPair {
    pub fn has_breakend(&self, breakend: BreakendId) -> bool {
        self.breakend1 == breakend || self.breakend2 == breakend
    }

    pub fn other_breakend(&self, breakend: BreakendId) -> Option<BreakendId> {
        if self.breakend1 == breakend {
            Some(self.breakend2)
        } else if self.breakend2 == breakend {
            Some(self.breakend1)
        } else {
            None
        }
    }

    pub fn breakends(&self) -> [BreakendId; 2] {
        [self.breakend1, self.breakend2]
    }
}

///
/// Re-derive the foldbacks available for splitting, highest JCN first.
///
/// A single-SV foldback qualifies while the SV has no committed links. A
/// chained foldback qualifies while one open chain ends at both of its
/// breakends.
///
pub fn collect_foldbacks(
    cluster: &SvCluster,
    sv_states: &BTreeMap<usize, SvChainState>,
    chains: &[SvChain],
) -> Vec<FoldbackBreakendPair> {
    let mut foldbacks = Vec::new();

    for fb in &cluster.foldbacks {
        if !fb.is_chained() {
            let Some(state) = sv_states.get(&fb.breakend1.sv) else {
                continue;
            };
            if state.linked(true) > 0.0 || state.linked(false) > 0.0 {
                continue;
            }
            foldbacks.push(FoldbackBreakendPair {
                breakend1: fb.breakend1,
                breakend2: fb.breakend2,
                jcn: state.jcn,
                chain: None,
            });
            continue;
        }

        let owning = chains.iter().find(|c| {
            let (start, end) = c.open_breakends(cluster);
            (start == Some(fb.breakend1) && end == Some(fb.breakend2))
                || (start == Some(fb.breakend2) && end == Some(fb.breakend1))
        });

        if let Some(chain) = owning {
            foldbacks.push(FoldbackBreakendPair {
                breakend1: fb.breakend1,
                breakend2: fb.breakend2,
                jcn: chain.jcn(),
                chain: Some(chain.id()),
            });
        }
    }

    foldbacks.sort_by(|a, b| {
        b.jcn
            .total_cmp(&a.jcn)
            .then_with(|| a.breakend1.cmp(&b.breakend1))
    });
    foldbacks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use svchain_core::models::{Breakend, SvType, SvVarData};

    #[fixture]
    fn cluster() -> SvCluster {
        let svs = vec![
            SvVarData::new(
                1,
                SvType::Inv,
                Breakend::new("1", 2000, 1),
                Some(Breakend::new("1", 2300, 1)),
                1.0,
            )
            .with_foldback(),
            SvVarData::new(
                2,
                SvType::Inv,
                Breakend::new("3", 100, -1),
                Some(Breakend::new("3", 400, -1)),
                3.0,
            )
            .with_foldback(),
        ];
        SvCluster::new(1, "S1", svs)
            .with_replication(true)
            .with_foldback(BreakendId::start(0), BreakendId::end(0))
            .with_foldback(BreakendId::start(1), BreakendId::end(1))
    }

    fn states(cluster: &SvCluster) -> BTreeMap<usize, SvChainState> {
        (0..cluster.sv_count())
            .map(|i| (i, SvChainState::new(i, cluster.sv(i).jcn, 0.0, false)))
            .collect()
    }

    #[rstest]
    fn test_foldbacks_ordered_by_jcn(cluster: SvCluster) {
        let foldbacks = collect_foldbacks(&cluster, &states(&cluster), &[]);
        assert_eq!(foldbacks.len(), 2);
        assert_eq!(foldbacks[0].breakend1, BreakendId::start(1));
        assert_eq!(foldbacks[0].jcn, 3.0);
        assert_eq!(foldbacks[1].other_breakend(BreakendId::end(0)), Some(BreakendId::start(0)));
    }

    #[rstest]
    fn test_linked_foldback_is_dropped(cluster: SvCluster) {
        let mut states = states(&cluster);
        if let Some(state) = states.get_mut(&1) {
            state.add(true, BreakendId::end(0), 1.0);
        }
        let foldbacks = collect_foldbacks(&cluster, &states, &[]);
        assert_eq!(foldbacks.len(), 1);
        assert!(foldbacks[0].has_breakend(BreakendId::start(0)));
    }
}
