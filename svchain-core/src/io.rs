//! Serde records describing clusters as produced by upstream clustering, and
//! their conversion into the index-addressed [`SvCluster`] arena.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::ClusterError;
use crate::models::{
    AlleleJcnSegment, Breakend, BreakendId, ChromosomeArm, DeletionBridge, FoldbackPair,
    ResolvedType, SvCluster, SvType, SvVarData,
};
use crate::utils::open_reader;

/// Reference to a breakend by external SV id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakendRef {
    pub sv: u32,
    pub is_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionBridgeRecord {
    pub other: BreakendRef,
    pub length: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakendRecord {
    pub chromosome: String,
    #[serde(default)]
    pub arm: ChromosomeArm,
    pub position: i64,
    pub orientation: i8,
    #[serde(default)]
    pub homology_length: u32,
    #[serde(default)]
    pub anchor_distance: u32,
    #[serde(default)]
    pub db_link: Option<DeletionBridgeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvRecord {
    pub id: u32,
    pub sv_type: SvType,
    pub start: BreakendRecord,
    #[serde(default)]
    pub end: Option<BreakendRecord>,
    pub jcn: f64,
    #[serde(default)]
    pub jcn_uncertainty: f64,
    #[serde(default)]
    pub jcn_min: Option<f64>,
    #[serde(default)]
    pub jcn_max: Option<f64>,
    #[serde(default)]
    pub is_foldback: bool,
    #[serde(default)]
    pub is_complex_dup: bool,
    #[serde(default)]
    pub is_line_element: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakendPairRecord {
    pub breakend1: BreakendRef,
    pub breakend2: BreakendRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub sample_id: String,
    pub cluster_id: u32,
    #[serde(default)]
    pub requires_replication: bool,
    #[serde(default)]
    pub resolved_type: ResolvedType,
    pub svs: Vec<SvRecord>,
    #[serde(default)]
    pub foldbacks: Vec<BreakendPairRecord>,
    #[serde(default)]
    pub double_minute_svs: Vec<u32>,
    #[serde(default)]
    pub assembled_links: Vec<BreakendPairRecord>,
    #[serde(default)]
    pub allele_jcn: BTreeMap<String, Vec<AlleleJcnSegment>>,
}

struct IdResolver<'a> {
    cluster_id: u32,
    index: FxHashMap<u32, usize>,
    records: &'a [SvRecord],
}

impl IdResolver<'_> {
    fn sv_index(&self, sv_id: u32) -> Result<usize, ClusterError> {
        self.index
            .get(&sv_id)
            .copied()
            .ok_or(ClusterError::UnknownSvId(self.cluster_id, sv_id))
    }

    fn breakend(&self, reference: &BreakendRef) -> Result<BreakendId, ClusterError> {
        let index = self.sv_index(reference.sv)?;
        if !reference.is_start && self.records[index].sv_type.is_single_ended() {
            return Err(ClusterError::SingleEndedReference(reference.sv));
        }
        Ok(BreakendId::new(index, reference.is_start))
    }
}

fn convert_breakend(
    sv_id: u32,
    record: &BreakendRecord,
    resolver: &IdResolver,
) -> Result<Breakend, ClusterError> {
    if record.orientation != 1 && record.orientation != -1 {
        return Err(ClusterError::InvalidOrientation(sv_id, record.orientation));
    }

    let db_link = match &record.db_link {
        Some(db) => Some(DeletionBridge {
            other: resolver.breakend(&db.other)?,
            length: db.length,
        }),
        None => None,
    };

    Ok(Breakend {
        chromosome: record.chromosome.clone(),
        arm: record.arm,
        position: record.position,
        orientation: record.orientation,
        homology_length: record.homology_length,
        anchor_distance: record.anchor_distance,
        db_link,
    })
}

impl TryFrom<ClusterRecord> for SvCluster {
    type Error = ClusterError;

    fn try_from(record: ClusterRecord) -> Result<Self, ClusterError> {
        let mut index: FxHashMap<u32, usize> = FxHashMap::default();
        for (i, sv) in record.svs.iter().enumerate() {
            if index.insert(sv.id, i).is_some() {
                return Err(ClusterError::DuplicateSvId(record.cluster_id, sv.id));
            }
        }

        let resolver = IdResolver {
            cluster_id: record.cluster_id,
            index,
            records: &record.svs,
        };

        let mut svs: Vec<SvVarData> = Vec::with_capacity(record.svs.len());
        for sv in &record.svs {
            if !sv.jcn.is_finite() || sv.jcn < 0.0 {
                return Err(ClusterError::InvalidJcn(sv.id, sv.jcn));
            }

            let start = convert_breakend(sv.id, &sv.start, &resolver)?;
            let end = if sv.sv_type.is_single_ended() {
                None
            } else {
                match &sv.end {
                    Some(end) => Some(convert_breakend(sv.id, end, &resolver)?),
                    None => {
                        return Err(ClusterError::MissingEndBreakend(
                            sv.id,
                            sv.sv_type.to_string(),
                        ));
                    }
                }
            };

            let mut var = SvVarData::new(sv.id, sv.sv_type, start, end, sv.jcn)
                .with_jcn_uncertainty(sv.jcn_uncertainty);
            if let Some(min) = sv.jcn_min {
                var.jcn_min = min;
            }
            if let Some(max) = sv.jcn_max {
                var.jcn_max = max;
            }
            var.is_foldback = sv.is_foldback;
            var.is_complex_dup = sv.is_complex_dup;
            var.is_line_element = sv.is_line_element;
            svs.push(var);
        }

        let foldbacks = record
            .foldbacks
            .iter()
            .map(|fb| {
                Ok(FoldbackPair::new(
                    resolver.breakend(&fb.breakend1)?,
                    resolver.breakend(&fb.breakend2)?,
                ))
            })
            .collect::<Result<Vec<_>, ClusterError>>()?;

        let double_minute_svs = record
            .double_minute_svs
            .iter()
            .map(|id| resolver.sv_index(*id))
            .collect::<Result<Vec<_>, ClusterError>>()?;

        let assembled = record
            .assembled_links
            .iter()
            .map(|link| {
                Ok((
                    resolver.breakend(&link.breakend1)?,
                    resolver.breakend(&link.breakend2)?,
                ))
            })
            .collect::<Result<Vec<_>, ClusterError>>()?;

        let mut cluster = SvCluster::new(record.cluster_id, &record.sample_id, svs)
            .with_replication(record.requires_replication)
            .with_resolved_type(record.resolved_type)
            .with_double_minute(double_minute_svs);

        cluster.foldbacks = foldbacks;
        cluster.allele_jcn = record.allele_jcn;

        for (breakend1, breakend2) in assembled {
            cluster = cluster.with_assembled_link(breakend1, breakend2);
        }

        Ok(cluster)
    }
}

/// Read a JSON array of cluster records, gzip'd or not.
pub fn read_cluster_records(path: &Path) -> Result<Vec<ClusterRecord>> {
    let reader = open_reader(path)?;
    let records: Vec<ClusterRecord> = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse cluster records from {:?}", path))?;
    Ok(records)
}

/// Read and validate every cluster in a cluster file.
pub fn read_clusters(path: &Path) -> Result<Vec<SvCluster>> {
    read_cluster_records(path)?
        .into_iter()
        .map(|record| {
            let cluster_id = record.cluster_id;
            SvCluster::try_from(record)
                .with_context(|| format!("Invalid cluster {} in {:?}", cluster_id, path))
        })
        .collect()
}
