use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ArgMatches;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;

use svchain_chaining::consts::*;
use svchain_chaining::{
    ChainFinder, ChainRecord, ChainingConfig, ChainingOutcome, CsvDiagnosticsSink,
    DiagnosticsSink,
};
use svchain_core::models::SvCluster;
use svchain_core::read_clusters;

pub fn run_chain(matches: &ArgMatches) -> Result<()> {
    let clusters = matches
        .get_one::<String>("clusters")
        .context("A path to a cluster file is required.")?;

    let default_out = DEFAULT_OUT.to_string();
    let output = matches.get_one::<String>("output").unwrap_or(&default_out);

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ChainingConfig::from_file(Path::new(path))?,
        None => ChainingConfig::default(),
    };
    if matches.get_flag("verbose") {
        config = config.with_verbose(true);
    }

    if let Some(&threads) = matches.get_one::<usize>("threads") {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let clusters = read_clusters(Path::new(clusters))?;
    info!("Chaining {} clusters", clusters.len());

    let outcomes = chain_clusters(&clusters, &config)?;

    let mut records: Vec<ChainRecord> = Vec::new();
    for (cluster, outcome) in clusters.iter().zip(outcomes.iter()) {
        if !outcome.is_valid {
            let reason = outcome
                .failure
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            warn!("cluster({}) chaining invalid: {}", cluster.id, reason);
        }
        records.extend(outcome.chain_records(cluster));
    }

    let writer = BufWriter::new(File::create(output)?);
    serde_json::to_writer_pretty(writer, &records)?;
    info!("Wrote {} chains to {}", records.len(), output);

    if let Some(path) = matches.get_one::<String>("diagnostics") {
        let mut sink = CsvDiagnosticsSink::from_path(Path::new(path))?;
        for outcome in &outcomes {
            sink.write_record(&outcome.diagnostics)?;
        }
        sink.flush()?;
    }

    Ok(())
}

/// Clusters are independent, so each gets its own finder on the pool.
fn chain_clusters(clusters: &[SvCluster], config: &ChainingConfig) -> Result<Vec<ChainingOutcome>> {
    let pb = ProgressBar::new(clusters.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")?
            .progress_chars("##-"),
    );

    let outcomes = clusters
        .par_iter()
        .map(|cluster| {
            let outcome = ChainFinder::new(cluster, config).form_chains();
            pb.inc(1);
            outcome
        })
        .collect();

    pb.finish_with_message("done");
    Ok(outcomes)
}

pub fn run_default_config(matches: &ArgMatches) -> Result<()> {
    let config = ChainingConfig::default();

    match matches.get_one::<String>("output") {
        Some(path) => config.to_file(Path::new(path))?,
        None => print!("{}", config.to_toml_string()?),
    }

    Ok(())
}
