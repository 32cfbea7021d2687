use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Index-addressed identity of one side of a structural variant.
///
/// `sv` is the index of the variant inside its [`SvCluster`](crate::models::SvCluster)
/// arena, not the external variant id. Two breakends are the same breakend
/// exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BreakendId {
    pub sv: usize,
    pub is_start: bool,
}

impl BreakendId {
    pub fn new(sv: usize, is_start: bool) -> Self {
        Self { sv, is_start }
    }

    pub fn start(sv: usize) -> Self {
        Self::new(sv, true)
    }

    pub fn end(sv: usize) -> Self {
        Self::new(sv, false)
    }

    /// The breakend on the opposite side of the same variant.
    pub fn other(&self) -> Self {
        Self::new(self.sv, !self.is_start)
    }

    /// 0 for the start breakend, 1 for the end breakend.
    pub fn se_index(&self) -> usize {
        if self.is_start { 0 } else { 1 }
    }
}

impl Display for BreakendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sv, if self.is_start { "s" } else { "e" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChromosomeArm {
    #[serde(rename = "P")]
    P,
    #[default]
    #[serde(rename = "Q")]
    Q,
}

impl Display for ChromosomeArm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChromosomeArm::P => write!(f, "P"),
            ChromosomeArm::Q => write!(f, "Q"),
        }
    }
}

/// A short deleted or overlapping stretch of reference between this breakend
/// and a neighbouring breakend facing away from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionBridge {
    pub other: BreakendId,
    pub length: i64,
}

///
/// One end of a structural variant: a genomic position plus the direction the
/// retained sequence lies in.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakend {
    pub chromosome: String,
    pub arm: ChromosomeArm,
    pub position: i64,
    /// +1 when the retained sequence lies below the position, -1 when above.
    pub orientation: i8,
    pub homology_length: u32,
    pub anchor_distance: u32,
    pub db_link: Option<DeletionBridge>,
}

impl Breakend {
    pub fn new(chromosome: &str, position: i64, orientation: i8) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            arm: ChromosomeArm::default(),
            position,
            orientation,
            homology_length: 0,
            anchor_distance: 0,
            db_link: None,
        }
    }

    pub fn with_arm(mut self, arm: ChromosomeArm) -> Self {
        self.arm = arm;
        self
    }

    pub fn with_homology(mut self, homology_length: u32) -> Self {
        self.homology_length = homology_length;
        self
    }

    pub fn with_anchor_distance(mut self, anchor_distance: u32) -> Self {
        self.anchor_distance = anchor_distance;
        self
    }

    pub fn with_db_link(mut self, other: BreakendId, length: i64) -> Self {
        self.db_link = Some(DeletionBridge { other, length });
        self
    }

    /// Whether this breakend (lower) and `upper` face each other so that the
    /// reference between them could be a templated insertion.
    pub fn faces(&self, upper: &Breakend) -> bool {
        self.chromosome == upper.chromosome
            && self.orientation == -1
            && upper.orientation == 1
            && self.position <= upper.position
    }

    /// Shortest templated insertion this breakend can take part in once its
    /// homology is discounted from the assembly anchor.
    pub fn min_templated_insertion_length(&self) -> i64 {
        (self.anchor_distance as i64 - self.homology_length as i64).max(0)
    }
}

impl Display for Breakend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}:{}",
            self.chromosome,
            self.arm,
            self.position,
            if self.orientation > 0 { "+" } else { "-" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_breakend_id_other() {
        let id = BreakendId::start(3);
        assert_eq!(id.other(), BreakendId::end(3));
        assert_eq!(id.other().other(), id);
        assert_eq!(id.se_index(), 0);
        assert_eq!(id.other().se_index(), 1);
    }

    #[rstest]
    #[case(-1, 1, 100, 200, true)]
    #[case(1, -1, 100, 200, false)]
    #[case(-1, 1, 300, 200, false)]
    #[case(-1, -1, 100, 200, false)]
    fn test_breakends_facing(
        #[case] lower_orient: i8,
        #[case] upper_orient: i8,
        #[case] lower_pos: i64,
        #[case] upper_pos: i64,
        #[case] expected: bool,
    ) {
        let lower = Breakend::new("1", lower_pos, lower_orient);
        let upper = Breakend::new("1", upper_pos, upper_orient);
        assert_eq!(lower.faces(&upper), expected);
    }

    #[rstest]
    fn test_breakends_on_other_chromosome_never_face() {
        let lower = Breakend::new("1", 100, -1);
        let upper = Breakend::new("2", 200, 1);
        assert!(!lower.faces(&upper));
    }

    #[rstest]
    fn test_min_ti_length_discounts_homology() {
        let be = Breakend::new("1", 100, 1)
            .with_anchor_distance(60)
            .with_homology(15);
        assert_eq!(be.min_templated_insertion_length(), 45);

        let be = Breakend::new("1", 100, 1).with_homology(15);
        assert_eq!(be.min_templated_insertion_length(), 0);
    }

    #[rstest]
    fn test_breakend_display() {
        let be = Breakend::new("7", 1500, -1).with_arm(ChromosomeArm::P);
        assert_eq!(be.to_string(), "7P:1500:-");
    }
}
