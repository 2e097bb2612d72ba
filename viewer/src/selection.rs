//! A chosen subset of the genome, readable in locations, segments or genes.
//!
//! A selection remembers the unit it was built from. The other range unit is
//! derived at construction; genes for a range-built selection are fetched
//! from the resolver on first request and memoized. Concurrent requests
//! share one in-flight resolver call.

use crate::resolver::{ResolveError, Resolver};
use futures::future::{BoxFuture, FutureExt, Shared};
use shared::ranges::{self, RangeList};
use shared::state::{SelectionData, Unit};
use shared::units::{ConversionError, Interval};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("selection has no {0} data yet")]
    NotResolved(Unit),
    #[error("gene resolution failed: {0}")]
    Resolution(#[from] ResolveError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Project-wide inputs every selection needs.
#[derive(Clone)]
pub struct SelectionContext {
    pub interval: Interval,
    pub resolver: Arc<dyn Resolver>,
}

impl SelectionContext {
    pub fn new(interval: Interval, resolver: Arc<dyn Resolver>) -> Self {
        Self { interval, resolver }
    }
}

impl fmt::Debug for SelectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionContext")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

type GeneRequest = Shared<BoxFuture<'static, Result<Vec<String>, ResolveError>>>;

struct SelectionInner {
    unit: Unit,
    resolver: Arc<dyn Resolver>,
    locations: Option<RangeList>,
    segments: Option<RangeList>,
    genes: OnceLock<Vec<String>>,
    gene_request: Mutex<Option<GeneRequest>>,
}

/// Shared handle to one immutable selection. Clones refer to the same
/// selection, including its memoized genes and in-flight request.
#[derive(Clone)]
pub struct Selection {
    inner: Arc<SelectionInner>,
}

impl Selection {
    fn build(
        context: &SelectionContext,
        unit: Unit,
        locations: Option<RangeList>,
        segments: Option<RangeList>,
        genes: Option<Vec<String>>,
    ) -> Self {
        let memo = OnceLock::new();
        if let Some(genes) = genes {
            let _ = memo.set(genes);
        }
        Self {
            inner: Arc::new(SelectionInner {
                unit,
                resolver: context.resolver.clone(),
                locations,
                segments,
                genes: memo,
                gene_request: Mutex::new(None),
            }),
        }
    }

    pub fn from_locations(context: &SelectionContext, locations: RangeList) -> Self {
        let locations = ranges::canonicalize(&locations);
        let segments = context.interval.locations_to_segment_list(&locations);
        Self::build(context, Unit::Location, Some(locations), Some(segments), None)
    }

    pub fn from_segments(
        context: &SelectionContext,
        segments: RangeList,
    ) -> Result<Self, ConversionError> {
        let segments = ranges::canonicalize(&segments);
        let locations = context.interval.segments_to_location_list(&segments)?;
        Ok(Self::build(
            context,
            Unit::Segment,
            Some(locations),
            Some(segments),
            None,
        ))
    }

    /// Resolves the genes' segments before returning, so the selection is
    /// never observed without range data.
    pub async fn from_genes(
        context: &SelectionContext,
        genes: Vec<String>,
    ) -> Result<Self, SelectionError> {
        if genes.is_empty() {
            return Ok(Self::build(
                context,
                Unit::Gene,
                Some(RangeList::new()),
                Some(RangeList::new()),
                Some(genes),
            ));
        }

        let response = context
            .resolver
            .resolve_segments_for_genes(&ranges::format_gene_list(&genes))
            .await?;

        let mut values = response.segments;
        values.sort_unstable();
        values.dedup();
        let segments = ranges::canonicalize(&ranges::compact(&values));
        let locations = context
            .interval
            .segments_to_location_list(&segments)
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;

        log::debug!(
            "Resolved {} gene(s) to segments {}",
            genes.len(),
            ranges::format(&segments)
        );
        Ok(Self::build(
            context,
            Unit::Gene,
            Some(locations),
            Some(segments),
            Some(genes),
        ))
    }

    /// Rebuilds a selection from snapshot data without contacting the
    /// resolver. Range data is re-derived from the origin unit.
    pub fn from_data(
        context: &SelectionContext,
        data: SelectionData,
    ) -> Result<Self, SelectionError> {
        let SelectionData {
            unit,
            locations,
            segments,
            genes,
        } = data;

        let selection = match unit {
            Unit::Location => {
                let locations = locations.ok_or(SelectionError::NotResolved(Unit::Location))?;
                let selection = Self::from_locations(context, locations);
                if let Some(genes) = genes {
                    let _ = selection.inner.genes.set(genes);
                }
                selection
            }
            Unit::Segment => {
                let segments = segments.ok_or(SelectionError::NotResolved(Unit::Segment))?;
                let selection = Self::from_segments(context, segments)?;
                if let Some(genes) = genes {
                    let _ = selection.inner.genes.set(genes);
                }
                selection
            }
            Unit::Gene => {
                let genes = genes.ok_or(SelectionError::NotResolved(Unit::Gene))?;
                let segments =
                    ranges::canonicalize(&segments.ok_or(SelectionError::NotResolved(Unit::Segment))?);
                let locations = context.interval.segments_to_location_list(&segments)?;
                Self::build(
                    context,
                    Unit::Gene,
                    Some(locations),
                    Some(segments),
                    Some(genes),
                )
            }
        };
        Ok(selection)
    }

    pub fn to_data(&self) -> SelectionData {
        SelectionData {
            unit: self.inner.unit,
            locations: self.inner.locations.clone(),
            segments: self.inner.segments.clone(),
            genes: self.genes_if_resolved(),
        }
    }

    pub fn unit(&self) -> Unit {
        self.inner.unit
    }

    pub fn ptr_eq(&self, other: &Selection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn as_locations(&self) -> Result<RangeList, SelectionError> {
        self.inner
            .locations
            .clone()
            .ok_or(SelectionError::NotResolved(Unit::Location))
    }

    pub fn as_segments(&self) -> Result<RangeList, SelectionError> {
        self.inner
            .segments
            .clone()
            .ok_or(SelectionError::NotResolved(Unit::Segment))
    }

    pub fn genes_if_resolved(&self) -> Option<Vec<String>> {
        self.inner.genes.get().cloned()
    }

    /// Genes covered by this selection, fetched at most once.
    ///
    /// A failed fetch is not memoized; the next call issues a new request.
    pub async fn as_genes(&self) -> Result<Vec<String>, SelectionError> {
        if let Some(genes) = self.inner.genes.get() {
            return Ok(genes.clone());
        }

        let request = self.gene_request()?;
        match request.clone().await {
            Ok(genes) => Ok(self.inner.genes.get_or_init(|| genes).clone()),
            Err(error) => {
                log::warn!("Gene resolution for {} selection failed: {}", self.inner.unit, error);
                let mut slot = self
                    .inner
                    .gene_request
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if slot.as_ref().is_some_and(|current| current.ptr_eq(&request)) {
                    *slot = None;
                }
                Err(error.into())
            }
        }
    }

    fn gene_request(&self) -> Result<GeneRequest, SelectionError> {
        let mut slot = self
            .inner
            .gene_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(request) = slot.as_ref() {
            return Ok(request.clone());
        }

        let response = match self.inner.unit {
            Unit::Location => self
                .inner
                .resolver
                .resolve_genes_for_locations(&ranges::format(&self.as_locations()?)),
            Unit::Segment => self
                .inner
                .resolver
                .resolve_genes_for_segments(&ranges::format(&self.as_segments()?)),
            // Gene-origin selections hold their genes from construction.
            Unit::Gene => return Err(SelectionError::NotResolved(Unit::Gene)),
        };

        log::debug!("Requesting genes for {} selection", self.inner.unit);
        let request = response
            .map(|result| result.map(|response| response.genes))
            .boxed()
            .shared();
        *slot = Some(request.clone());
        Ok(request)
    }
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("unit", &self.inner.unit)
            .field("locations", &self.inner.locations)
            .field("segments", &self.inner.segments)
            .field("genes", &self.inner.genes.get())
            .finish()
    }
}
