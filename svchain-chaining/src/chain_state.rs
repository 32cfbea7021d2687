use svchain_core::models::BreakendId;

use crate::consts::EXHAUSTED_JCN_FLOOR;

/// A link committed against one side of an SV.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakendConnection {
    pub other: BreakendId,
    pub jcn: f64,
}

///
/// Per-SV copy-number ledger: how much of each breakend's JCN has been
/// committed to links and which breakends it was linked to.
///
#[derive(Debug, Clone, PartialEq)]
pub struct SvChainState {
    pub sv: usize,
    pub jcn: f64,
    pub jcn_uncertainty: f64,
    single_ended: bool,
    linked: [f64; 2],
    connections: [Vec<BreakendConnection>; 2],
    exhausted: [bool; 2],
}

impl SvChainState {
    pub fn new(sv: usize, jcn: f64, jcn_uncertainty: f64, single_ended: bool) -> Self {
        Self {
            sv,
            jcn,
            jcn_uncertainty,
            single_ended,
            linked: [0.0; 2],
            connections: [Vec::new(), Vec::new()],
            exhausted: [false, single_ended],
        }
    }

    pub fn is_single_ended(&self) -> bool {
        self.single_ended
    }

    pub fn linked(&self, is_start: bool) -> f64 {
        self.linked[Self::index(is_start)]
    }

    /// JCN not yet committed to any link, never negative.
    pub fn unlinked(&self, is_start: bool) -> f64 {
        (self.jcn - self.linked(is_start)).max(0.0)
    }

    pub fn connections(&self, is_start: bool) -> &[BreakendConnection] {
        &self.connections[Self::index(is_start)]
    }

    /// Number of distinct breakends this side has been linked to.
    pub fn unique_connections(&self, is_start: bool) -> usize {
        let mut others: Vec<BreakendId> =
            self.connections(is_start).iter().map(|c| c.other).collect();
        others.sort();
        others.dedup();
        others.len()
    }

    pub fn add(&mut self, is_start: bool, other: BreakendId, jcn: f64) {
        let i = Self::index(is_start);
        self.linked[i] += jcn;
        self.connections[i].push(BreakendConnection { other, jcn });

        let remaining = self.jcn - self.linked[i];
        let threshold = (EXHAUSTED_JCN_FLOOR.max(self.jcn_uncertainty * 0.5)).min(self.jcn * 0.5);
        if remaining <= 0.0 || remaining <= threshold {
            self.exhausted[i] = true;
        }
    }

    /// Forget every committed link. Exhaustion stays set.
    pub fn clear_links(&mut self) {
        self.linked = [0.0; 2];
        self.connections = [Vec::new(), Vec::new()];
    }

    pub fn breakend_exhausted(&self, is_start: bool) -> bool {
        self.exhausted[Self::index(is_start)]
    }

    pub fn is_complete(&self) -> bool {
        self.exhausted[0] && (self.single_ended || self.exhausted[1])
    }

    /// Committed JCN exceeds the estimate by more than its uncertainty allows.
    pub fn is_over_committed(&self, is_start: bool) -> bool {
        let linked = self.linked(is_start);
        linked > self.jcn + self.jcn_uncertainty
            && !svchain_core::utils::copy_numbers_equal(linked, self.jcn)
    }

    fn index(is_start: bool) -> usize {
        if is_start { 0 } else { 1 }
    }
}
