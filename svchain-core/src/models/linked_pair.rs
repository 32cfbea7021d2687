use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::models::breakend::BreakendId;

/// Cluster-scoped identity of a link instance owned by a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkLocation {
    /// Other cluster breakends lie on both sides of the insertion.
    #[default]
    Internal,
    /// Other cluster breakends lie on one side only.
    External,
    /// No other cluster breakend shares the chromosome.
    Remote,
}

///
/// A templated insertion joining two breakends.
///
/// Candidate pairs are built lower-breakend first. Once a chain takes
/// ownership of a pair it stores an oriented copy, so `first` and `second`
/// follow the chain's traversal direction, and assigns it an `instance`.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedPair {
    pub first: BreakendId,
    pub second: BreakendId,
    pub length: i64,
    pub location: LinkLocation,
    pub is_assembled: bool,
    pub link_reason: String,
    pub link_index: Option<usize>,
    /// Set on the extra copies a replicated chain carries.
    pub is_duplicate: bool,
    pub instance: Option<LinkId>,
}

impl LinkedPair {
    pub fn new(first: BreakendId, second: BreakendId, length: i64) -> Self {
        Self {
            first,
            second,
            length,
            location: LinkLocation::default(),
            is_assembled: false,
            link_reason: String::new(),
            link_index: None,
            is_duplicate: false,
            instance: None,
        }
    }

    pub fn with_location(mut self, location: LinkLocation) -> Self {
        self.location = location;
        self
    }

    pub fn assembled(mut self) -> Self {
        self.is_assembled = true;
        self
    }

    pub fn breakend(&self, is_first: bool) -> BreakendId {
        if is_first { self.first } else { self.second }
    }

    pub fn has_breakend(&self, breakend: BreakendId) -> bool {
        self.first == breakend || self.second == breakend
    }

    pub fn has_sv(&self, sv: usize) -> bool {
        self.first.sv == sv || self.second.sv == sv
    }

    /// The breakend at the other end of the link, if `breakend` is part of it.
    pub fn other_breakend(&self, breakend: BreakendId) -> Option<BreakendId> {
        if self.first == breakend {
            Some(self.second)
        } else if self.second == breakend {
            Some(self.first)
        } else {
            None
        }
    }

    /// Order-independent key identifying the pair of breakends.
    pub fn key(&self) -> (BreakendId, BreakendId) {
        if self.first <= self.second {
            (self.first, self.second)
        } else {
            (self.second, self.first)
        }
    }

    /// Whether both pairs join the same two breakends, in either direction.
    pub fn same_variants(&self, other: &LinkedPair) -> bool {
        self.key() == other.key()
    }

    /// Whether the two pairs share at least one breakend.
    pub fn clashes(&self, other: &LinkedPair) -> bool {
        self.has_breakend(other.first) || self.has_breakend(other.second)
    }

    /// Copy with the traversal direction swapped.
    pub fn reversed(&self) -> LinkedPair {
        let mut pair = self.clone();
        std::mem::swap(&mut pair.first, &mut pair.second);
        pair
    }

    /// Fresh, not-yet-owned copy used when a chain section is replicated.
    pub fn duplicate(&self) -> LinkedPair {
        let mut pair = self.clone();
        pair.is_duplicate = true;
        pair.instance = None;
        pair
    }
}

impl Display for LinkedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} len={}", self.first, self.second, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn pair() -> LinkedPair {
        LinkedPair::new(BreakendId::end(0), BreakendId::start(1), 500)
    }

    #[rstest]
    fn test_pair_key_ignores_direction(pair: LinkedPair) {
        let rev = pair.reversed();
        assert_eq!(rev.first, BreakendId::start(1));
        assert_eq!(pair.key(), rev.key());
        assert!(pair.same_variants(&rev));
    }

    #[rstest]
    fn test_other_breakend(pair: LinkedPair) {
        assert_eq!(pair.other_breakend(BreakendId::end(0)), Some(BreakendId::start(1)));
        assert_eq!(pair.other_breakend(BreakendId::start(0)), None);
        assert!(pair.has_sv(1));
        assert!(!pair.has_sv(2));
    }

    #[rstest]
    fn test_clashing_pairs(pair: LinkedPair) {
        let other = LinkedPair::new(BreakendId::start(1), BreakendId::end(2), 80);
        let unrelated = LinkedPair::new(BreakendId::start(3), BreakendId::end(2), 80);
        assert!(pair.clashes(&other));
        assert!(!pair.clashes(&unrelated));
    }

    #[rstest]
    fn test_duplicate_drops_instance(mut pair: LinkedPair) {
        pair.instance = Some(LinkId(4));
        let dup = pair.duplicate();
        assert!(dup.is_duplicate);
        assert_eq!(dup.instance, None);
        assert!(dup.same_variants(&pair));
    }
}
