//! The remote resolver capability and an in-memory implementation.
//!
//! Gene <-> range lookups live on the data server in a deployed viewer; the
//! core only sees this request/response interface. Range arguments use the
//! compact range text (`"1,3-5"`) and gene arguments are comma-joined names.

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use shared::config::{ConfigError, GeneEntry, ViewerConfig};
use shared::ranges::{self, RangeList};
use shared::units::Interval;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("resolver request failed: {0}")]
    Request(String),
    #[error("resolver returned malformed data: {0}")]
    Malformed(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneResponse {
    pub genes: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentResponse {
    pub segments: Vec<u64>,
}

/// Translates between genes and location/segment ranges.
///
/// Implementations own any retry policy; callers never retry on their own.
pub trait Resolver: Send + Sync {
    fn resolve_genes_for_locations(
        &self,
        locations: &str,
    ) -> BoxFuture<'static, Result<GeneResponse, ResolveError>>;

    fn resolve_genes_for_segments(
        &self,
        segments: &str,
    ) -> BoxFuture<'static, Result<GeneResponse, ResolveError>>;

    fn resolve_segments_for_genes(
        &self,
        genes: &str,
    ) -> BoxFuture<'static, Result<SegmentResponse, ResolveError>>;
}

/// Resolver over a gene annotation table held in memory.
///
/// A gene matches a location range when their inclusive spans overlap.
/// Results are sorted by gene name without duplicates.
#[derive(Debug, Clone)]
pub struct GeneTable {
    interval: Interval,
    genes: Vec<GeneEntry>,
}

impl GeneTable {
    pub fn new(interval: Interval, mut genes: Vec<GeneEntry>) -> Self {
        genes.sort_by(|a, b| a.name.cmp(&b.name).then(a.start.cmp(&b.start)));
        Self { interval, genes }
    }

    pub fn from_config(config: &ViewerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.project.interval()?, config.genes.clone()))
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn genes_overlapping(&self, locations: &RangeList) -> Vec<String> {
        self.genes
            .iter()
            .filter(|gene| {
                locations
                    .iter()
                    .any(|range| gene.start <= range.end && gene.end >= range.start)
            })
            .map(|gene| gene.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Segments touched by the named genes. Unknown names are skipped.
    pub fn segments_for(&self, names: &[String]) -> Vec<u64> {
        let mut segments = BTreeSet::new();
        for name in names {
            let Some(span) = self
                .genes
                .iter()
                .find(|gene| &gene.name == name)
                .and_then(GeneEntry::span)
            else {
                log::warn!("Gene table has no entry for gene '{}'", name);
                continue;
            };
            let covering = self.interval.segments_covering(span);
            segments.extend(covering.start..=covering.end);
        }
        segments.into_iter().collect()
    }

    fn genes_for_location_text(&self, text: &str) -> Result<GeneResponse, ResolveError> {
        let locations = ranges::parse(text).map_err(|e| ResolveError::Malformed(e.to_string()))?;
        Ok(GeneResponse {
            genes: self.genes_overlapping(&locations),
        })
    }

    fn genes_for_segment_text(&self, text: &str) -> Result<GeneResponse, ResolveError> {
        let segments = ranges::parse(text).map_err(|e| ResolveError::Malformed(e.to_string()))?;
        let locations = self
            .interval
            .segments_to_location_list(&segments)
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;
        Ok(GeneResponse {
            genes: self.genes_overlapping(&locations),
        })
    }
}

impl Resolver for GeneTable {
    fn resolve_genes_for_locations(
        &self,
        locations: &str,
    ) -> BoxFuture<'static, Result<GeneResponse, ResolveError>> {
        future::ready(self.genes_for_location_text(locations)).boxed()
    }

    fn resolve_genes_for_segments(
        &self,
        segments: &str,
    ) -> BoxFuture<'static, Result<GeneResponse, ResolveError>> {
        future::ready(self.genes_for_segment_text(segments)).boxed()
    }

    fn resolve_segments_for_genes(
        &self,
        genes: &str,
    ) -> BoxFuture<'static, Result<SegmentResponse, ResolveError>> {
        let segments = self.segments_for(&ranges::parse_gene_list(genes));
        future::ready(Ok(SegmentResponse { segments })).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gene(name: &str, start: u64, end: u64) -> GeneEntry {
        GeneEntry {
            name: name.to_string(),
            start,
            end,
        }
    }

    fn table() -> GeneTable {
        GeneTable::new(
            Interval::new(1000).unwrap(),
            vec![
                gene("Btbd35f24", 3_148_912, 3_150_852),
                gene("Btbd35f23", 3_076_875, 3_078_817),
                gene("Small", 2_500, 2_600),
            ],
        )
    }

    #[tokio::test]
    async fn test_genes_for_locations() {
        let response = table()
            .resolve_genes_for_locations("3078000-3149000")
            .await
            .unwrap();
        assert_eq!(response.genes, vec!["Btbd35f23", "Btbd35f24"]);

        let empty = table().resolve_genes_for_locations("10-20").await.unwrap();
        assert!(empty.genes.is_empty());
    }

    #[tokio::test]
    async fn test_overlap_is_inclusive() {
        let response = table().resolve_genes_for_locations("2600").await.unwrap();
        assert_eq!(response.genes, vec!["Small"]);
    }

    #[tokio::test]
    async fn test_genes_for_segments() {
        let response = table().resolve_genes_for_segments("3,3078").await.unwrap();
        assert_eq!(response.genes, vec!["Btbd35f23", "Small"]);
    }

    #[tokio::test]
    async fn test_segments_for_genes() {
        let response = table()
            .resolve_segments_for_genes("Btbd35f23, Small")
            .await
            .unwrap();
        assert_eq!(response.segments, vec![3, 3077, 3078, 3079]);
    }

    #[tokio::test]
    async fn test_unknown_gene_skipped() {
        let response = table().resolve_segments_for_genes("Nope").await.unwrap();
        assert!(response.segments.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_ranges_reported() {
        assert!(matches!(
            table().resolve_genes_for_locations("1-x").await,
            Err(ResolveError::Malformed(_))
        ));
        assert!(matches!(
            table().resolve_genes_for_segments("0").await,
            Err(ResolveError::Malformed(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = ViewerConfig::from_toml_str(
            "[project]\ninterval = 10\n[[genes]]\nname = \"a\"\nstart = 1\nend = 5\n",
        )
        .unwrap();
        let table = GeneTable::from_config(&config).unwrap();
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());
    }
}
