//! Stock observers connecting a controller to the display collaborators.
//!
//! [`RendererBridge`] turns the current selection into live/ghost/dead
//! segment states for a structure renderer. [`GeneReadout`] keeps a panel's
//! selection read-out current, fetching genes only once a selection has
//! settled.

use crate::controller::{
    Envelope, Observer, OnSelectionChanged, OnShowUnmappedSegmentsChanged, WeakController,
};
use crate::selection::{Selection, SelectionError};
use shared::config::{ConfigError, ViewerConfig};
use shared::ranges::{self, RangeList};
use std::sync::{Arc, Mutex, PoisonError};

/// Display capability for the 3D structure view.
pub trait SegmentRenderer: Send + Sync {
    /// `live` segments are drawn normally, `ghost` ones faded, `dead` ones
    /// (unmapped) only when requested. Ids are ascending.
    fn update_segments(&self, live: &[u64], ghost: &[u64], dead: &[u64]);
}

#[derive(Debug, Default)]
struct BridgeState {
    selected: Option<RangeList>,
    show_unmapped: bool,
}

/// Maps selection and "show unmapped" changes onto a [`SegmentRenderer`].
///
/// Without a selection every mapped segment is live.
pub struct RendererBridge<R: SegmentRenderer> {
    renderer: R,
    segment_count: u64,
    unmapped: RangeList,
    state: Mutex<BridgeState>,
}

impl<R: SegmentRenderer> RendererBridge<R> {
    pub fn new(renderer: R, segment_count: u64, unmapped: RangeList) -> Self {
        Self {
            renderer,
            segment_count,
            unmapped: ranges::canonicalize(&unmapped),
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Uses the project's segment count, or the last unmapped segment when
    /// the count is not configured.
    pub fn from_config(renderer: R, config: &ViewerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let unmapped = config.project.unmapped_segments.clone();
        let segment_count = config
            .project
            .segment_count
            .unwrap_or_else(|| unmapped.iter().map(|range| range.end).max().unwrap_or(0));
        Ok(Self::new(renderer, segment_count, unmapped))
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    fn redraw(&self, state: &BridgeState) {
        let is_unmapped = |segment: u64| self.unmapped.iter().any(|range| range.contains(segment));
        let is_selected = |segment: u64| {
            state
                .selected
                .as_ref()
                .is_none_or(|selected| selected.iter().any(|range| range.contains(segment)))
        };

        let mut live = Vec::new();
        let mut ghost = Vec::new();
        let mut dead = Vec::new();
        for segment in 1..=self.segment_count {
            if is_unmapped(segment) {
                if state.show_unmapped {
                    dead.push(segment);
                }
            } else if is_selected(segment) {
                live.push(segment);
            } else {
                ghost.push(segment);
            }
        }
        log::trace!(
            "Segment states: {} live, {} ghost, {} dead",
            live.len(),
            ghost.len(),
            dead.len()
        );
        self.renderer.update_segments(&live, &ghost, &dead);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: SegmentRenderer> OnSelectionChanged for RendererBridge<R> {
    fn on_selection_changed(&self, selection: Option<&Selection>, envelope: &Envelope) {
        // The immediate delivery already carried this value.
        if envelope.debounced {
            return;
        }
        let selected = match selection.map(Selection::as_segments).transpose() {
            Ok(selected) => selected,
            Err(e) => {
                log::warn!("Selection has no segments to render: {}", e);
                Some(RangeList::new())
            }
        };
        let mut state = self.lock_state();
        state.selected = selected;
        self.redraw(&state);
    }
}

impl<R: SegmentRenderer> OnShowUnmappedSegmentsChanged for RendererBridge<R> {
    fn on_show_unmapped_segments_changed(&self, show: bool, envelope: &Envelope) {
        if envelope.debounced {
            return;
        }
        let mut state = self.lock_state();
        state.show_unmapped = show;
        self.redraw(&state);
    }
}

impl<R: SegmentRenderer> Observer for RendererBridge<R> {
    fn selection_handler(&self) -> Option<&dyn OnSelectionChanged> {
        Some(self)
    }

    fn show_unmapped_segments_handler(&self) -> Option<&dyn OnShowUnmappedSegmentsChanged> {
        Some(self)
    }
}

/// Where a [`GeneReadout`] writes the selection read-out.
pub trait GeneSink: Send + Sync {
    /// Location and segment text, on every selection change.
    fn show_ranges(&self, locations: &str, segments: &str);

    /// Genes of the settled selection; may be empty.
    fn show_genes(&self, genes: &[String]);

    /// Gene resolution for the settled selection failed.
    fn show_gene_error(&self, error: &SelectionError);
}

/// Read-out panel observer.
///
/// Ranges are shown on every delivery. Genes are resolved only on the
/// debounced delivery, and dropped if the selection changed meanwhile.
pub struct GeneReadout {
    sink: Arc<dyn GeneSink>,
    controller: WeakController,
}

impl GeneReadout {
    pub fn new(sink: Arc<dyn GeneSink>, controller: WeakController) -> Self {
        Self { sink, controller }
    }

    fn fetch_genes(&self, selection: Selection) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("Gene read-out needs a Tokio runtime; skipping gene lookup");
            return;
        };
        let sink = self.sink.clone();
        let controller = self.controller.clone();

        runtime.spawn(async move {
            let genes = selection.as_genes().await;
            let still_current = controller
                .upgrade()
                .is_some_and(|controller| controller.is_current_selection(&selection));
            if !still_current {
                log::debug!("Selection changed while resolving genes; dropping result");
                return;
            }
            match genes {
                Ok(genes) => sink.show_genes(&genes),
                Err(e) => {
                    log::error!("Failed to resolve genes for selection: {}", e);
                    sink.show_gene_error(&e);
                }
            }
        });
    }
}

impl OnSelectionChanged for GeneReadout {
    fn on_selection_changed(&self, selection: Option<&Selection>, envelope: &Envelope) {
        let Some(selection) = selection else {
            self.sink.show_ranges("", "");
            return;
        };

        let text = |list: Result<RangeList, SelectionError>| {
            list.map(|list| ranges::format(&list)).unwrap_or_default()
        };
        self.sink
            .show_ranges(&text(selection.as_locations()), &text(selection.as_segments()));

        if envelope.debounced {
            self.fetch_genes(selection.clone());
        }
    }
}

impl Observer for GeneReadout {
    fn selection_handler(&self) -> Option<&dyn OnSelectionChanged> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, DEFAULT_DEBOUNCE};
    use crate::selection::SelectionContext;
    use crate::testing::{self, ScriptedResolver};
    use shared::state::Settings;
    use std::time::Duration;

    type Frame = (Vec<u64>, Vec<u64>, Vec<u64>);

    #[derive(Default)]
    struct FrameLog(Mutex<Vec<Frame>>);

    impl SegmentRenderer for FrameLog {
        fn update_segments(&self, live: &[u64], ghost: &[u64], dead: &[u64]) {
            self.0
                .lock()
                .unwrap()
                .push((live.to_vec(), ghost.to_vec(), dead.to_vec()));
        }
    }

    impl FrameLog {
        fn last(&self) -> Frame {
            self.0.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[derive(Default)]
    struct Panel {
        ranges: Mutex<Vec<(String, String)>>,
        genes: Mutex<Vec<Vec<String>>>,
        errors: Mutex<Vec<SelectionError>>,
    }

    impl GeneSink for Panel {
        fn show_ranges(&self, locations: &str, segments: &str) {
            self.ranges
                .lock()
                .unwrap()
                .push((locations.to_string(), segments.to_string()));
        }

        fn show_genes(&self, genes: &[String]) {
            self.genes.lock().unwrap().push(genes.to_vec());
        }

        fn show_gene_error(&self, error: &SelectionError) {
            self.errors.lock().unwrap().push(error.clone());
        }
    }

    fn list(text: &str) -> RangeList {
        ranges::parse(text).unwrap()
    }

    fn quiet_period() -> Duration {
        DEFAULT_DEBOUNCE + Duration::from_millis(100)
    }

    fn controller_with(context: SelectionContext) -> Controller {
        Controller::new(context, Settings::default(), DEFAULT_DEBOUNCE)
    }

    fn readout(controller: &Controller) -> Arc<Panel> {
        let panel = Arc::new(Panel::default());
        controller.register_observer(Arc::new(GeneReadout::new(
            panel.clone(),
            controller.downgrade(),
        )));
        panel
    }

    #[tokio::test(start_paused = true)]
    async fn test_renderer_segment_states() {
        let controller = controller_with(testing::context());
        let bridge = Arc::new(RendererBridge::new(FrameLog::default(), 8, list("3-4")));
        controller.register_observer(bridge.clone());

        controller.update_selection(None, None, None);
        assert_eq!(bridge.renderer().last(), (vec![1, 2, 5, 6, 7, 8], vec![], vec![]));

        let selection = Selection::from_segments(controller.context(), list("1-3")).unwrap();
        controller.update_selection(Some(selection), None, None);
        assert_eq!(bridge.renderer().last(), (vec![1, 2], vec![5, 6, 7, 8], vec![]));

        controller.update_show_unmapped_segments(true, None, None);
        assert_eq!(
            bridge.renderer().last(),
            (vec![1, 2], vec![5, 6, 7, 8], vec![3, 4])
        );

        let frames = bridge.renderer().0.lock().unwrap().len();
        tokio::time::sleep(quiet_period()).await;
        assert_eq!(bridge.renderer().0.lock().unwrap().len(), frames);
    }

    #[test]
    fn test_renderer_from_config() {
        let config = ViewerConfig::from_toml_str(
            "[project]\ninterval = 1000\nunmapped_segments = [[5, 6]]\n",
        )
        .unwrap();
        let bridge = RendererBridge::from_config(FrameLog::default(), &config).unwrap();
        assert_eq!(bridge.segment_count, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_genes_published_once_settled() {
        let controller = controller_with(testing::context());
        let panel = readout(&controller);

        for text in ["100-200", "2000-2700"] {
            let selection = Selection::from_locations(controller.context(), list(text));
            controller.update_selection(Some(selection), None, None);
        }
        assert_eq!(panel.ranges.lock().unwrap().len(), 2);
        assert_eq!(
            panel.ranges.lock().unwrap()[1],
            ("2000-2700".to_string(), "2-3".to_string())
        );
        assert!(panel.genes.lock().unwrap().is_empty());

        tokio::time::sleep(quiet_period()).await;
        assert_eq!(
            *panel.genes.lock().unwrap(),
            vec![vec!["Alpha".to_string(), "Beta".to_string()]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_genes_differ_from_failure() {
        let resolver = Arc::new(ScriptedResolver::failing_first(1));
        let context = SelectionContext::new(testing::interval(), resolver.clone());
        let controller = controller_with(context);
        let panel = readout(&controller);

        let failing = Selection::from_locations(controller.context(), list("9000"));
        controller.update_selection(Some(failing), None, None);
        tokio::time::sleep(quiet_period()).await;
        assert_eq!(panel.errors.lock().unwrap().len(), 1);
        assert!(panel.genes.lock().unwrap().is_empty());

        let empty = Selection::from_locations(controller.context(), list("50000"));
        controller.update_selection(Some(empty), None, None);
        tokio::time::sleep(quiet_period()).await;
        assert_eq!(*panel.genes.lock().unwrap(), vec![Vec::<String>::new()]);
        assert_eq!(panel.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_genes_are_dropped() {
        let (resolver, open) = ScriptedResolver::gated();
        let context = SelectionContext::new(testing::interval(), Arc::new(resolver));
        let controller = controller_with(context);
        let panel = readout(&controller);

        let first = Selection::from_locations(controller.context(), list("9000"));
        controller.update_selection(Some(first), None, None);
        tokio::time::sleep(quiet_period()).await;

        let second = Selection::from_locations(controller.context(), list("2000"));
        controller.update_selection(Some(second), None, None);
        let _ = open.send(());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(panel.genes.lock().unwrap().is_empty());

        tokio::time::sleep(quiet_period()).await;
        assert_eq!(*panel.genes.lock().unwrap(), vec![vec!["Alpha".to_string()]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_selection_blanks_ranges() {
        let controller = controller_with(testing::context());
        let panel = readout(&controller);

        controller.update_selection(None, None, None);
        assert_eq!(
            panel.ranges.lock().unwrap()[0],
            (String::new(), String::new())
        );
    }
}
