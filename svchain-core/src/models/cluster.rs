use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::allele::AlleleJcnSegment;
use crate::models::breakend::{Breakend, BreakendId};
use crate::models::linked_pair::{LinkLocation, LinkedPair};
use crate::models::variant::SvVarData;

/// Upstream classification of a cluster; only `Line` changes how it is chained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolvedType {
    #[default]
    Complex,
    Simple,
    Line,
}

/// Two breakends facing the same way that fold back on each other.
///
/// Both breakends belong to one variant for a simple foldback, or to two
/// different variants when the foldback is formed through a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldbackPair {
    pub breakend1: BreakendId,
    pub breakend2: BreakendId,
}

impl FoldbackPair {
    pub fn new(breakend1: BreakendId, breakend2: BreakendId) -> Self {
        Self {
            breakend1,
            breakend2,
        }
    }

    pub fn is_chained(&self) -> bool {
        self.breakend1.sv != self.breakend2.sv
    }

    pub fn has_breakend(&self, breakend: BreakendId) -> bool {
        self.breakend1 == breakend || self.breakend2 == breakend
    }
}

///
/// Arena holding every variant of one cluster plus the collections computed
/// for it upstream.
///
/// Variants are addressed by their index in [`SvCluster::svs`]; all other
/// structures refer to breakends through [`BreakendId`].
///
#[derive(Debug, Clone)]
pub struct SvCluster {
    pub id: u32,
    pub sample_id: String,
    svs: Vec<SvVarData>,
    pub foldbacks: Vec<FoldbackPair>,
    pub double_minute_svs: Vec<usize>,
    pub assembled_links: Vec<LinkedPair>,
    pub requires_replication: bool,
    pub resolved_type: ResolvedType,
    pub allele_jcn: BTreeMap<String, Vec<AlleleJcnSegment>>,
    chr_breakend_map: BTreeMap<String, Vec<BreakendId>>,
    chr_positions: FxHashMap<BreakendId, usize>,
}

impl SvCluster {
    pub fn new(id: u32, sample_id: &str, svs: Vec<SvVarData>) -> Self {
        let mut cluster = SvCluster {
            id,
            sample_id: sample_id.to_string(),
            svs,
            foldbacks: Vec::new(),
            double_minute_svs: Vec::new(),
            assembled_links: Vec::new(),
            requires_replication: false,
            resolved_type: ResolvedType::default(),
            allele_jcn: BTreeMap::new(),
            chr_breakend_map: BTreeMap::new(),
            chr_positions: FxHashMap::default(),
        };
        cluster.build_chr_breakend_map();
        cluster
    }

    pub fn with_replication(mut self, requires_replication: bool) -> Self {
        self.requires_replication = requires_replication;
        self
    }

    pub fn with_resolved_type(mut self, resolved_type: ResolvedType) -> Self {
        self.resolved_type = resolved_type;
        self
    }

    pub fn with_foldback(mut self, breakend1: BreakendId, breakend2: BreakendId) -> Self {
        self.foldbacks.push(FoldbackPair::new(breakend1, breakend2));
        self
    }

    pub fn with_double_minute(mut self, svs: Vec<usize>) -> Self {
        self.double_minute_svs = svs;
        self
    }

    /// Register an assembly-supported link. Pairs which cannot form a
    /// templated insertion are ignored.
    pub fn with_assembled_link(mut self, breakend1: BreakendId, breakend2: BreakendId) -> Self {
        if let Some(pair) = self.form_link(breakend1, breakend2) {
            self.assembled_links.push(pair.assembled());
        }
        self
    }

    pub fn with_allele_jcn(mut self, chromosome: &str, segments: Vec<AlleleJcnSegment>) -> Self {
        self.allele_jcn.insert(chromosome.to_string(), segments);
        self
    }

    pub fn svs(&self) -> &[SvVarData] {
        &self.svs
    }

    pub fn sv(&self, index: usize) -> &SvVarData {
        &self.svs[index]
    }

    pub fn sv_count(&self) -> usize {
        self.svs.len()
    }

    /// External id of the variant at `index`.
    pub fn sv_id(&self, index: usize) -> u32 {
        self.svs.get(index).map(|sv| sv.id).unwrap_or(u32::MAX)
    }

    pub fn breakend(&self, id: BreakendId) -> Option<&Breakend> {
        self.svs.get(id.sv).and_then(|sv| sv.breakend(id.is_start))
    }

    pub fn chr_breakend_map(&self) -> &BTreeMap<String, Vec<BreakendId>> {
        &self.chr_breakend_map
    }

    /// Every breakend in chromosome then position order.
    pub fn breakend_ids(&self) -> impl Iterator<Item = BreakendId> + '_ {
        self.chr_breakend_map.values().flat_map(|list| list.iter().copied())
    }

    /// Position of the breakend within its chromosome's sorted list.
    pub fn chr_index(&self, id: BreakendId) -> Option<usize> {
        self.chr_positions.get(&id).copied()
    }

    pub fn is_line(&self) -> bool {
        self.resolved_type == ResolvedType::Line
    }

    pub fn is_double_minute_sv(&self, index: usize) -> bool {
        self.double_minute_svs.contains(&index)
    }

    pub fn is_foldback_breakend(&self, id: BreakendId) -> bool {
        self.foldbacks.iter().any(|fb| fb.has_breakend(id))
    }

    ///
    /// Build the templated insertion joining two breakends, lower (-1) breakend
    /// first. Returns `None` unless both are on one chromosome with opposite
    /// orientations. The length may be negative for overlapping assembled
    /// breakends.
    ///
    pub fn form_link(&self, breakend1: BreakendId, breakend2: BreakendId) -> Option<LinkedPair> {
        if breakend1 == breakend2 {
            return None;
        }

        let be1 = self.breakend(breakend1)?;
        let be2 = self.breakend(breakend2)?;

        if be1.chromosome != be2.chromosome || be1.orientation == be2.orientation {
            return None;
        }

        let (lower, upper) = if be1.orientation == -1 {
            (breakend1, breakend2)
        } else {
            (breakend2, breakend1)
        };

        let lower_be = self.breakend(lower)?;
        let upper_be = self.breakend(upper)?;
        let length = upper_be.position - lower_be.position;

        Some(LinkedPair::new(lower, upper, length).with_location(self.link_location(lower, upper)))
    }

    /// Classify an insertion by where the cluster's other breakends lie on its chromosome.
    pub fn link_location(&self, lower: BreakendId, upper: BreakendId) -> LinkLocation {
        let (Some(lower_index), Some(upper_index)) = (self.chr_index(lower), self.chr_index(upper))
        else {
            return LinkLocation::Remote;
        };

        let Some(chr_list) = self
            .breakend(lower)
            .and_then(|be| self.chr_breakend_map.get(&be.chromosome))
        else {
            return LinkLocation::Remote;
        };

        let (low, high) = (lower_index.min(upper_index), lower_index.max(upper_index));
        let has_lower = low > 0;
        let has_upper = high + 1 < chr_list.len();

        match (has_lower, has_upper) {
            (true, true) => LinkLocation::Internal,
            (false, false) => LinkLocation::Remote,
            _ => LinkLocation::External,
        }
    }

    fn build_chr_breakend_map(&mut self) {
        let mut map: BTreeMap<String, Vec<BreakendId>> = BTreeMap::new();

        for (index, sv) in self.svs.iter().enumerate() {
            map.entry(sv.start.chromosome.clone())
                .or_default()
                .push(BreakendId::start(index));

            if let Some(end) = &sv.end {
                if !sv.sv_type.is_single_ended() {
                    map.entry(end.chromosome.clone())
                        .or_default()
                        .push(BreakendId::end(index));
                }
            }
        }

        for list in map.values_mut() {
            list.sort_by_key(|id| {
                let be = self.svs[id.sv]
                    .breakend(id.is_start)
                    .map(|be| (be.position, be.orientation))
                    .unwrap_or((i64::MAX, 0));
                (be.0, be.1, *id)
            });
        }

        self.chr_positions = map
            .values()
            .flat_map(|list| list.iter().enumerate().map(|(i, id)| (*id, i)))
            .collect();
        self.chr_breakend_map = map;
    }
}
