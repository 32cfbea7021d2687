use std::collections::BTreeMap;

use svchain_core::models::{AlleleJcnSegment, LinkedPair, SvCluster};
use svchain_core::utils::copy_numbers_equal;

use crate::config::ChainingConfig;
use crate::consts::MIN_MAJOR_ALLELE_JCN;

///
/// Upper bounds on link JCN from the major-allele copy number of the
/// reference segments a templated insertion covers.
///
/// With no allele data, or with the limits disabled, every link is supported.
///
#[derive(Debug, Clone, Default)]
pub struct ChainJcnLimits {
    segments: BTreeMap<String, Vec<AlleleJcnSegment>>,
}

impl ChainJcnLimits {
    pub fn new(cluster: &SvCluster, config: &ChainingConfig) -> Self {
        if !config.use_allele_jcn_limits {
            return Self::default();
        }

        let mut segments = cluster.allele_jcn.clone();
        for list in segments.values_mut() {
            list.sort_by_key(|s| (s.start, s.end));
        }
        Self { segments }
    }

    pub fn is_enabled(&self) -> bool {
        !self.segments.is_empty()
    }

    fn span(cluster: &SvCluster, link: &LinkedPair) -> Option<(String, i64, i64)> {
        let lower = cluster.breakend(link.first)?;
        let upper = cluster.breakend(link.second)?;
        if lower.chromosome != upper.chromosome {
            return None;
        }
        let (start, end) = if lower.position <= upper.position {
            (lower.position, upper.position)
        } else {
            (upper.position, lower.position)
        };
        Some((lower.chromosome.clone(), start, end))
    }

    fn overlapping<'a>(
        &'a self,
        chromosome: &str,
        start: i64,
        end: i64,
    ) -> impl Iterator<Item = &'a AlleleJcnSegment> + 'a {
        self.segments
            .get(chromosome)
            .into_iter()
            .flat_map(move |list| list.iter().filter(move |s| s.overlaps(start, end)))
    }

    /// Lowest major-allele JCN across the segments the link covers.
    pub fn max_link_jcn(&self, cluster: &SvCluster, link: &LinkedPair) -> Option<f64> {
        let (chromosome, start, end) = Self::span(cluster, link)?;
        self.overlapping(&chromosome, start, end)
            .map(|s| s.major_allele_jcn)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Whether a link carrying `jcn` fits under the allele copy number it spans.
    pub fn link_supported(&self, cluster: &SvCluster, link: &LinkedPair, jcn: f64) -> bool {
        match self.max_link_jcn(cluster, link) {
            None => true,
            Some(limit) => jcn <= limit || copy_numbers_equal(jcn, limit),
        }
    }

    /// Whether a segment lacking a major allele lies between two positions,
    /// in which case no templated insertion can span them.
    pub fn blocks_extension(&self, chromosome: &str, from: i64, to: i64) -> bool {
        let (start, end) = if from <= to { (from, to) } else { (to, from) };
        self.overlapping(chromosome, start, end)
            .any(|s| s.major_allele_jcn < MIN_MAJOR_ALLELE_JCN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use svchain_core::models::{Breakend, BreakendId, SvType, SvVarData};

    #[fixture]
    fn cluster() -> SvCluster {
        let svs = vec![
            SvVarData::new(
                1,
                SvType::Bnd,
                Breakend::new("3", 100, 1),
                Some(Breakend::new("1", 1000, -1)),
                2.0,
            ),
            SvVarData::new(
                2,
                SvType::Bnd,
                Breakend::new("1", 2000, 1),
                Some(Breakend::new("4", 100, -1)),
                2.0,
            ),
        ];
        SvCluster::new(1, "S1", svs).with_allele_jcn(
            "1",
            vec![
                AlleleJcnSegment::new(1, 1499, 3.0, 1.0),
                AlleleJcnSegment::new(1500, 3000, 1.0, 1.0),
                AlleleJcnSegment::new(3001, 5000, 0.2, 0.0),
            ],
        )
    }

    #[rstest]
    fn test_link_limited_by_lowest_segment(cluster: SvCluster) {
        let limits = ChainJcnLimits::new(&cluster, &ChainingConfig::default());
        let link = cluster
            .form_link(BreakendId::end(0), BreakendId::start(1))
            .unwrap();

        assert_eq!(limits.max_link_jcn(&cluster, &link), Some(1.0));
        assert!(limits.link_supported(&cluster, &link, 1.0));
        assert!(limits.link_supported(&cluster, &link, 1.4));
        assert!(!limits.link_supported(&cluster, &link, 2.0));
    }

    #[rstest]
    fn test_disabled_limits_support_everything(cluster: SvCluster) {
        let config = ChainingConfig::default().with_allele_jcn_limits(false);
        let limits = ChainJcnLimits::new(&cluster, &config);
        let link = cluster
            .form_link(BreakendId::end(0), BreakendId::start(1))
            .unwrap();

        assert!(!limits.is_enabled());
        assert!(limits.link_supported(&cluster, &link, 5.0));
    }

    #[rstest]
    fn test_lost_major_allele_blocks_extension(cluster: SvCluster) {
        let limits = ChainJcnLimits::new(&cluster, &ChainingConfig::default());
        assert!(!limits.blocks_extension("1", 1000, 2000));
        assert!(limits.blocks_extension("1", 2000, 4000));
        assert!(!limits.blocks_extension("2", 2000, 4000));
    }
}
