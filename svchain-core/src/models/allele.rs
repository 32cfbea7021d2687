use serde::{Deserialize, Serialize};

/// Allele-specific copy number of one reference segment.
///
/// `start` and `end` are inclusive positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlleleJcnSegment {
    pub start: i64,
    pub end: i64,
    pub major_allele_jcn: f64,
    pub minor_allele_jcn: f64,
}

impl AlleleJcnSegment {
    pub fn new(start: i64, end: i64, major_allele_jcn: f64, minor_allele_jcn: f64) -> Self {
        Self {
            start,
            end,
            major_allele_jcn,
            minor_allele_jcn,
        }
    }

    /// Whether any part of `[start, end]` falls inside this segment.
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.start <= end && self.end >= start
    }

    pub fn contains(&self, position: i64) -> bool {
        self.start <= position && position <= self.end
    }
}
