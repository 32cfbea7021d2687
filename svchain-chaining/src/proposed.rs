use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use svchain_core::models::{BreakendId, LinkedPair};
use svchain_core::utils::{copy_numbers_equal, format_jcn, jcn_ranges_overlap};

/// Order-independent identity of a breakend pair.
pub type PairKey = (BreakendId, BreakendId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainingRule {
    Assembly,
    FoldbackSplit,
    CompDupSplit,
    Only,
    JcnMatch,
    Adjacent,
    AdjacentMatch,
    JcnMax,
    Nearest,
}

impl ChainingRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainingRule::Assembly => "ASSEMBLY",
            ChainingRule::FoldbackSplit => "FOLDBACK_SPLIT",
            ChainingRule::CompDupSplit => "COMP_DUP_SPLIT",
            ChainingRule::Only => "ONLY",
            ChainingRule::JcnMatch => "JCN_MATCH",
            ChainingRule::Adjacent => "ADJACENT",
            ChainingRule::AdjacentMatch => "ADJACENT_MATCH",
            ChainingRule::JcnMax => "JCN_MAX",
            ChainingRule::Nearest => "NEAREST",
        }
    }
}

impl Display for ChainingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How closely the available JCN of a link's two breakends agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JcnMatchType {
    NoMatch,
    Overlap,
    Matched,
}

impl JcnMatchType {
    pub fn classify(jcn1: f64, uncertainty1: f64, jcn2: f64, uncertainty2: f64) -> Self {
        if copy_numbers_equal(jcn1, jcn2) {
            JcnMatchType::Matched
        } else if jcn_ranges_overlap(jcn1, uncertainty1, jcn2, uncertainty2) {
            JcnMatchType::Overlap
        } else {
            JcnMatchType::NoMatch
        }
    }
}

/// JCN and match type for a link between two breakends with the given
/// available copy number: the mean when they match, otherwise the lower.
pub fn link_jcn(
    available1: f64,
    uncertainty1: f64,
    available2: f64,
    uncertainty2: f64,
) -> (f64, JcnMatchType) {
    let match_type = JcnMatchType::classify(available1, uncertainty1, available2, uncertainty2);
    let jcn = if match_type == JcnMatchType::Matched {
        (available1 + available2) / 2.0
    } else {
        available1.min(available2)
    };
    (jcn, match_type)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkSkipType {
    /// The link would close its chain while other options remain.
    Closing,
    JcnMismatch,
}

impl Display for LinkSkipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkSkipType::Closing => write!(f, "CLOSING"),
            LinkSkipType::JcnMismatch => write!(f, "JCN_MISMATCH"),
        }
    }
}

/// What committing a proposal does to the chain graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalKind {
    Single,
    /// Both links join `split_breakend` to the two ends of a foldback, which
    /// is either a single SV or the open ends of `foldback_chain`.
    FoldbackSplit {
        split_breakend: BreakendId,
        foldback_chain: Option<usize>,
    },
    /// The duplicating SV's two breakends link to both ends of a target chain,
    /// or of a target SV that is not yet chained.
    ComplexDupSplit {
        dup_sv: usize,
        target_chain: Option<usize>,
        target_sv: Option<usize>,
    },
}

///
/// One atomic addition to the chain graph: a single link, or the two links
/// of a foldback or complex-duplication split.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedLinks {
    pub links: Vec<LinkedPair>,
    pub jcn: f64,
    pub jcn_uncertainty: f64,
    pub match_type: JcnMatchType,
    pub rules: Vec<ChainingRule>,
    pub kind: ProposalKind,
}

impl ProposedLinks {
    pub fn single(
        link: LinkedPair,
        jcn: f64,
        jcn_uncertainty: f64,
        match_type: JcnMatchType,
        rule: ChainingRule,
    ) -> Self {
        Self {
            links: vec![link],
            jcn,
            jcn_uncertainty,
            match_type,
            rules: vec![rule],
            kind: ProposalKind::Single,
        }
    }

    pub fn split(
        link1: LinkedPair,
        link2: LinkedPair,
        jcn: f64,
        jcn_uncertainty: f64,
        rule: ChainingRule,
        kind: ProposalKind,
    ) -> Self {
        Self {
            links: vec![link1, link2],
            jcn,
            jcn_uncertainty,
            match_type: JcnMatchType::Matched,
            rules: vec![rule],
            kind,
        }
    }

    pub fn add_rule(&mut self, rule: ChainingRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    pub fn has_rule(&self, rule: ChainingRule) -> bool {
        self.rules.contains(&rule)
    }

    pub fn primary_rule(&self) -> Option<ChainingRule> {
        self.rules.first().copied()
    }

    pub fn is_split(&self) -> bool {
        !matches!(self.kind, ProposalKind::Single)
    }

    pub fn keys(&self) -> Vec<PairKey> {
        self.links.iter().map(|l| l.key()).collect()
    }

    pub fn breakends(&self) -> Vec<BreakendId> {
        let mut breakends: Vec<BreakendId> =
            self.links.iter().flat_map(|l| [l.first, l.second]).collect();
        breakends.sort();
        breakends.dedup();
        breakends
    }

    /// Shortest link length, used to rank proposals by proximity.
    pub fn min_length(&self) -> i64 {
        self.links.iter().map(|l| l.length).min().unwrap_or(i64::MAX)
    }

    pub fn clashes(&self, other: &ProposedLinks) -> bool {
        self.links
            .iter()
            .any(|l| other.links.iter().any(|o| l.clashes(o)))
    }

    /// Rule names joined for the link-reason field.
    pub fn reason(&self) -> String {
        self.rules
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl Display for ProposedLinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let links: Vec<String> = self.links.iter().map(|l| l.to_string()).collect();
        write!(
            f,
            "{} jcn={} rules={}",
            links.join(" & "),
            format_jcn(self.jcn),
            self.reason()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case(2.0, 0.0, 2.2, 0.0, 2.1, JcnMatchType::Matched)]
    #[case(1.0, 0.6, 2.0, 0.6, 1.0, JcnMatchType::Overlap)]
    #[case(1.0, 0.1, 3.0, 0.1, 1.0, JcnMatchType::NoMatch)]
    fn test_link_jcn(
        #[case] a1: f64,
        #[case] u1: f64,
        #[case] a2: f64,
        #[case] u2: f64,
        #[case] expected_jcn: f64,
        #[case] expected_type: JcnMatchType,
    ) {
        let (jcn, match_type) = link_jcn(a1, u1, a2, u2);
        assert!((jcn - expected_jcn).abs() < 1e-9);
        assert_eq!(match_type, expected_type);
    }

    #[rstest]
    fn test_proposal_reason_and_clashes() {
        let l1 = LinkedPair::new(BreakendId::end(0), BreakendId::start(1), 100);
        let l2 = LinkedPair::new(BreakendId::end(0), BreakendId::end(1), 200);
        let l3 = LinkedPair::new(BreakendId::end(2), BreakendId::start(3), 50);

        let mut p1 = ProposedLinks::single(l1, 1.0, 0.0, JcnMatchType::Matched, ChainingRule::Only);
        p1.add_rule(ChainingRule::Nearest);
        p1.add_rule(ChainingRule::Only);
        assert_eq!(p1.reason(), "ONLY;NEAREST");
        assert_eq!(p1.primary_rule(), Some(ChainingRule::Only));

        let p2 = ProposedLinks::single(l2, 1.0, 0.0, JcnMatchType::Matched, ChainingRule::Nearest);
        let p3 = ProposedLinks::single(l3, 1.0, 0.0, JcnMatchType::Matched, ChainingRule::Nearest);
        assert!(p1.clashes(&p2));
        assert!(!p1.clashes(&p3));
        assert_eq!(p3.min_length(), 50);
        assert!(!p3.is_split());
    }
}
