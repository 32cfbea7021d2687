use std::ffi::OsStr;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;

/// Absolute copy-number difference tolerated regardless of scale.
pub const JCN_DIFF_ABS: f64 = 0.5;

/// Relative copy-number difference tolerated regardless of the absolute gap.
pub const JCN_DIFF_PERC: f64 = 0.15;

/// Whether two copy-number estimates are close enough to be treated as equal.
///
/// They differ only when the gap exceeds both the absolute and the relative
/// tolerance.
pub fn copy_numbers_equal(jcn1: f64, jcn2: f64) -> bool {
    let diff = (jcn1 - jcn2).abs();
    let max_jcn = jcn1.abs().max(jcn2.abs());

    if diff <= JCN_DIFF_ABS {
        return true;
    }

    max_jcn > 0.0 && diff / max_jcn <= JCN_DIFF_PERC
}

/// Whether the ranges `jcn ± uncertainty` of the two estimates intersect.
pub fn jcn_ranges_overlap(jcn1: f64, uncertainty1: f64, jcn2: f64, uncertainty2: f64) -> bool {
    let (min1, max1) = (jcn1 - uncertainty1, jcn1 + uncertainty1);
    let (min2, max2) = (jcn2 - uncertainty2, jcn2 + uncertainty2);
    min1 <= max2 && min2 <= max1
}

/// Inverse-variance weighted combination of two estimates.
///
/// Falls back to the plain mean when either uncertainty is zero.
pub fn combine_jcn(jcn1: f64, uncertainty1: f64, jcn2: f64, uncertainty2: f64) -> (f64, f64) {
    if uncertainty1 <= 0.0 || uncertainty2 <= 0.0 {
        return ((jcn1 + jcn2) / 2.0, uncertainty1.max(uncertainty2));
    }

    let w1 = 1.0 / (uncertainty1 * uncertainty1);
    let w2 = 1.0 / (uncertainty2 * uncertainty2);
    let jcn = (jcn1 * w1 + jcn2 * w2) / (w1 + w2);
    let uncertainty = (1.0 / (w1 + w2)).sqrt();
    (jcn, uncertainty)
}

pub fn format_jcn(jcn: f64) -> String {
    format!("{:.1}", jcn)
}

/// Buffered reader over a cluster file. Files ending in `.gz` are decompressed
/// as they are read, including multi-member archives from bgzip.
pub fn open_reader(path: &Path) -> Result<BufReader<Box<dyn Read>>> {
    let file = File::open(path)
        .with_context(|| format!("could not open cluster file {}", path.display()))?;

    let inner: Box<dyn Read> = if path.extension() == Some(OsStr::new("gz")) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(BufReader::new(inner))
}
