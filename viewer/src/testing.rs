//! Shared fixtures for the viewer's unit tests.

use crate::resolver::{GeneResponse, GeneTable, ResolveError, Resolver, SegmentResponse};
use crate::selection::SelectionContext;
use futures::future::{BoxFuture, FutureExt, Shared};
use shared::config::GeneEntry;
use shared::units::Interval;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const INTERVAL: u64 = 1000;

pub fn interval() -> Interval {
    Interval::new(INTERVAL).unwrap()
}

pub fn gene_table() -> GeneTable {
    let gene = |name: &str, start, end| GeneEntry {
        name: name.to_string(),
        start,
        end,
    };
    GeneTable::new(
        interval(),
        vec![
            gene("Alpha", 1_500, 2_500),
            gene("Beta", 2_600, 4_000),
            gene("Gamma", 9_000, 9_100),
        ],
    )
}

pub fn context() -> SelectionContext {
    SelectionContext::new(interval(), Arc::new(gene_table()))
}

/// Wraps the gene table, counting calls and optionally failing the first
/// `failures` of them or holding every response until `gate` resolves.
pub struct ScriptedResolver {
    table: GeneTable,
    calls: AtomicUsize,
    failures: usize,
    gate: Option<Shared<BoxFuture<'static, ()>>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            table: gene_table(),
            calls: AtomicUsize::new(0),
            failures: 0,
            gate: None,
        }
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            ..Self::new()
        }
    }

    pub fn gated() -> (Self, futures::channel::oneshot::Sender<()>) {
        let (open, gate) = futures::channel::oneshot::channel::<()>();
        let gate = gate.map(|_| ()).boxed().shared();
        (
            Self {
                gate: Some(gate),
                ..Self::new()
            },
            open,
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn script<T: Send + 'static>(
        &self,
        response: BoxFuture<'static, Result<T, ResolveError>>,
    ) -> BoxFuture<'static, Result<T, ResolveError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return futures::future::ready(Err(ResolveError::Request(
                "connection refused".to_string(),
            )))
            .boxed();
        }
        let gate = self.gate.clone();
        async move {
            if let Some(gate) = gate {
                gate.await;
            }
            response.await
        }
        .boxed()
    }
}

impl Resolver for ScriptedResolver {
    fn resolve_genes_for_locations(
        &self,
        locations: &str,
    ) -> BoxFuture<'static, Result<GeneResponse, ResolveError>> {
        self.script(self.table.resolve_genes_for_locations(locations))
    }

    fn resolve_genes_for_segments(
        &self,
        segments: &str,
    ) -> BoxFuture<'static, Result<GeneResponse, ResolveError>> {
        self.script(self.table.resolve_genes_for_segments(segments))
    }

    fn resolve_segments_for_genes(
        &self,
        genes: &str,
    ) -> BoxFuture<'static, Result<SegmentResponse, ResolveError>> {
        self.script(self.table.resolve_segments_for_genes(genes))
    }
}
