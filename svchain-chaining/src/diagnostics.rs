use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use svchain_core::models::SvCluster;

use crate::chain::SvChain;
use crate::chain_state::SvChainState;
use crate::errors::DiagnosticsError;

/// One summary row per chained cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDiagnosticsRecord {
    #[serde(rename = "SampleId")]
    pub sample_id: String,
    #[serde(rename = "ClusterId")]
    pub cluster_id: u32,
    #[serde(rename = "Replication")]
    pub replication: bool,
    #[serde(rename = "SvCount")]
    pub sv_count: usize,
    #[serde(rename = "JcnTotal")]
    pub jcn_total: f64,
    #[serde(rename = "Chains")]
    pub chains: usize,
    #[serde(rename = "RepeatedChains")]
    pub repeated_chains: usize,
    #[serde(rename = "SGLs")]
    pub sgls: usize,
    /// Semicolon-separated.
    #[serde(rename = "Warnings")]
    pub warnings: String,
    #[serde(rename = "MaxJcn")]
    pub max_jcn: f64,
    #[serde(rename = "UnlinksSVs")]
    pub unlinked_svs: usize,
    #[serde(rename = "UnlinkedBEs")]
    pub unlinked_breakends: usize,
    #[serde(rename = "InvalidBEs")]
    pub invalid_breakends: usize,
    #[serde(rename = "Foldbacks")]
    pub foldbacks: usize,
    #[serde(rename = "CompDups")]
    pub comp_dups: usize,
}

/// Counts gathered by the chain finder for the summary row.
#[derive(Debug, Clone, Default)]
pub struct RunCounts {
    pub repeated_chains: usize,
    pub foldback_splits: usize,
    pub comp_dup_splits: usize,
    pub warnings: Vec<String>,
}

impl ChainDiagnosticsRecord {
    pub fn from_run<'a>(
        cluster: &SvCluster,
        chains: &[SvChain],
        states: impl Iterator<Item = &'a SvChainState>,
        counts: &RunCounts,
    ) -> Self {
        let mut unlinked_svs = 0;
        let mut unlinked_breakends = 0;
        let mut invalid_breakends = 0;

        for state in states {
            let sides: &[bool] = if state.is_single_ended() {
                &[true]
            } else {
                &[true, false]
            };

            if sides.iter().all(|&s| state.linked(s) == 0.0) {
                unlinked_svs += 1;
            }
            for &side in sides {
                if !state.breakend_exhausted(side) {
                    unlinked_breakends += 1;
                }
                if state.is_over_committed(side) {
                    invalid_breakends += 1;
                }
            }
        }

        let svs = cluster.svs();
        Self {
            sample_id: cluster.sample_id.clone(),
            cluster_id: cluster.id,
            replication: cluster.requires_replication,
            sv_count: svs.len(),
            jcn_total: svs.iter().map(|sv| sv.jcn).sum(),
            chains: chains.len(),
            repeated_chains: counts.repeated_chains,
            sgls: svs.iter().filter(|sv| sv.is_single_ended()).count(),
            warnings: counts.warnings.join(";"),
            max_jcn: svs.iter().map(|sv| sv.jcn).fold(0.0, f64::max),
            unlinked_svs,
            unlinked_breakends,
            invalid_breakends,
            foldbacks: counts.foldback_splits,
            comp_dups: counts.comp_dup_splits,
        }
    }
}

/// Destination for per-cluster diagnostics rows.
pub trait DiagnosticsSink {
    fn write_record(&mut self, record: &ChainDiagnosticsRecord) -> Result<(), DiagnosticsError>;

    fn flush(&mut self) -> Result<(), DiagnosticsError> {
        Ok(())
    }
}

impl DiagnosticsSink for Vec<ChainDiagnosticsRecord> {
    fn write_record(&mut self, record: &ChainDiagnosticsRecord) -> Result<(), DiagnosticsError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Writes rows as CSV, header first.
pub struct CsvDiagnosticsSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvDiagnosticsSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
        }
    }
}

impl CsvDiagnosticsSink<std::fs::File> {
    pub fn from_path(path: &Path) -> Result<Self, DiagnosticsError> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }
}

impl<W: Write> DiagnosticsSink for CsvDiagnosticsSink<W> {
    fn write_record(&mut self, record: &ChainDiagnosticsRecord) -> Result<(), DiagnosticsError> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DiagnosticsError> {
        self.writer.flush()?;
        Ok(())
    }
}
