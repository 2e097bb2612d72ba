//! Single source of truth for the interactive state shared by a group of
//! widgets: the current selection, display settings and saved tracks.
//!
//! Every update is delivered twice. Registered observers see the new value
//! immediately, in registration order, before the update call returns. Once
//! no further update of the same event has arrived for the quiet period, the
//! final value is delivered again with `debounced: true`. Widgets with
//! expensive reactions (resolver round trips, full redraws) act only on the
//! debounced delivery.
//!
//! Mutation and delivery are serialised per controller. A handler may issue
//! further updates to the same controller; those are delivered inline.

mod observer;
mod slot;

pub use observer::{
    Change, Envelope, EventKind, Observer, OnAnyChanged, OnBackgroundColorChanged,
    OnCameraPositionChanged, OnCenterPositionChanged, OnColormapChanged,
    OnContactThresholdChanged, OnSelectionChanged, OnShowUnmappedSegmentsChanged,
    OnTracksChanged, OnVariableChanged, SourceId,
};
pub use slot::ObserverSlot;

use crate::dataflow::Debouncer;
use crate::resolver::Resolver;
use crate::selection::{Selection, SelectionContext, SelectionError};
use indexmap::IndexMap;
use serde_json::Value;
use shared::config::{ConfigError, ViewerConfig};
use shared::ranges::Range;
use shared::state::{ControllerSnapshot, DecodeError, Settings, Track, VariableId, Vec3};
use std::cell::RefCell;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to encode controller state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0} holds a value that cannot be saved (NaN or infinity)")]
    NonFinite(&'static str),
}

#[derive(Debug, Clone, Default)]
struct ControllerState {
    selection: Option<Selection>,
    settings: Settings,
    tracks: Vec<Track>,
}

impl ControllerState {
    fn apply(&mut self, change: &Change) {
        match change {
            Change::Selection(selection) => self.selection = selection.clone(),
            Change::Variable(variable) => self.settings.variable = *variable,
            Change::Colormap(colormap) => self.settings.colormap = colormap.clone(),
            Change::ShowUnmappedSegments(show) => self.settings.show_unmapped_segments = *show,
            Change::BackgroundColor(color) => self.settings.background_color = color.clone(),
            Change::CameraPosition(position) => self.settings.camera_position = *position,
            Change::CenterPosition(position) => self.settings.center_position = *position,
            Change::ContactThreshold(threshold) => self.settings.contact_threshold = *threshold,
            Change::Tracks(tracks) => self.tracks = tracks.clone(),
        }
    }

    fn current(&self, kind: EventKind) -> Change {
        match kind {
            EventKind::Selection => Change::Selection(self.selection.clone()),
            EventKind::Variable => Change::Variable(self.settings.variable),
            EventKind::Colormap => Change::Colormap(self.settings.colormap.clone()),
            EventKind::ShowUnmappedSegments => {
                Change::ShowUnmappedSegments(self.settings.show_unmapped_segments)
            }
            EventKind::BackgroundColor => {
                Change::BackgroundColor(self.settings.background_color.clone())
            }
            EventKind::CameraPosition => Change::CameraPosition(self.settings.camera_position),
            EventKind::CenterPosition => Change::CenterPosition(self.settings.center_position),
            EventKind::ContactThreshold => {
                Change::ContactThreshold(self.settings.contact_threshold)
            }
            EventKind::Tracks => Change::Tracks(self.tracks.clone()),
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            selection: self.selection.as_ref().map(Selection::to_data),
            settings: self.settings.clone(),
            tracks: self.tracks.clone(),
        }
    }
}

/// A value waiting out the quiet period of its event.
#[derive(Debug, Clone)]
struct Pending {
    change: Change,
    envelope: Envelope,
}

thread_local! {
    /// Controllers whose dispatch lock is held by this thread.
    static DISPATCHING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct DispatchGuard<'a> {
    lock: Option<MutexGuard<'a, ()>>,
    key: usize,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if self.lock.is_some() {
            DISPATCHING.with(|held| held.borrow_mut().retain(|key| *key != self.key));
        }
    }
}

struct ControllerInner {
    context: SelectionContext,
    state: Mutex<ControllerState>,
    observers: Mutex<IndexMap<usize, Arc<dyn Observer>>>,
    dispatch: Mutex<()>,
    debouncers: Vec<Debouncer<Pending>>,
}

impl ControllerInner {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_observers(&self) -> MutexGuard<'_, IndexMap<usize, Arc<dyn Observer>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch_guard(&self) -> DispatchGuard<'_> {
        let key = self as *const Self as usize;
        if DISPATCHING.with(|held| held.borrow().contains(&key)) {
            return DispatchGuard { lock: None, key };
        }
        let lock = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        DISPATCHING.with(|held| held.borrow_mut().push(key));
        DispatchGuard {
            lock: Some(lock),
            key,
        }
    }

    /// Stores the change, delivers it immediately and re-arms its debouncer.
    fn publish(&self, change: Change, source: Option<SourceId>, decoration: Option<Value>) {
        let _dispatch = self.dispatch_guard();
        self.lock_state().apply(&change);
        let envelope = Envelope::new(change.kind(), source, decoration);
        log::debug!("Immediate delivery of {}", envelope.type_name());
        self.deliver(&change, &envelope);
        self.arm(change, envelope);
    }

    fn arm(&self, change: Change, envelope: Envelope) {
        if let Some(debouncer) = self.debouncers.get(envelope.kind.index()) {
            debouncer.arm(Pending { change, envelope });
        }
    }

    fn deliver_debounced(&self, pending: Pending) {
        let _dispatch = self.dispatch_guard();
        let envelope = Envelope {
            debounced: true,
            ..pending.envelope
        };
        log::debug!("Debounced delivery of {}", envelope.type_name());
        self.deliver(&pending.change, &envelope);
    }

    fn deliver(&self, change: &Change, envelope: &Envelope) {
        // Handlers may (un)register observers; they take effect next delivery.
        let observers: Vec<Arc<dyn Observer>> = self.lock_observers().values().cloned().collect();
        for observer in &observers {
            change.deliver_to(observer.as_ref(), envelope);
        }
        for observer in &observers {
            if let Some(handler) = observer.any_handler() {
                handler.on_any_changed(change, envelope);
            }
        }
    }
}

fn observer_key(observer: &Arc<dyn Observer>) -> usize {
    Arc::as_ptr(observer) as *const () as usize
}

/// Cheap-clone handle; clones control the same state.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

#[derive(Clone)]
pub struct WeakController {
    inner: Weak<ControllerInner>,
}

impl WeakController {
    pub fn upgrade(&self) -> Option<Controller> {
        self.inner.upgrade().map(|inner| Controller { inner })
    }
}

impl Controller {
    /// Must be called from inside a Tokio runtime; debounce timers run as
    /// tasks on it.
    pub fn new(context: SelectionContext, settings: Settings, quiet: Duration) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ControllerInner>| {
            let debouncers = EventKind::ALL
                .iter()
                .map(|_| {
                    let weak = weak.clone();
                    Debouncer::spawn(quiet, move |pending: Pending| {
                        if let Some(inner) = weak.upgrade() {
                            inner.deliver_debounced(pending);
                        }
                    })
                })
                .collect();

            ControllerInner {
                context,
                state: Mutex::new(ControllerState {
                    settings,
                    ..ControllerState::default()
                }),
                observers: Mutex::new(IndexMap::new()),
                dispatch: Mutex::new(()),
                debouncers,
            }
        });
        Self { inner }
    }

    pub fn from_config(
        config: &ViewerConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, ConfigError> {
        let context = SelectionContext::new(config.project.interval()?, resolver);
        Ok(Self::new(
            context,
            config.settings.clone().into(),
            config.controller.debounce(),
        ))
    }

    pub fn context(&self) -> &SelectionContext {
        &self.inner.context
    }

    pub fn downgrade(&self) -> WeakController {
        WeakController {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Controller) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ===== STATE =====

    pub fn selection(&self) -> Option<Selection> {
        self.inner.lock_state().selection.clone()
    }

    pub fn settings(&self) -> Settings {
        self.inner.lock_state().settings.clone()
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.inner.lock_state().tracks.clone()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.inner.lock_state().snapshot()
    }

    /// Whether `selection` is (a handle to) the current selection.
    pub fn is_current_selection(&self, selection: &Selection) -> bool {
        self.inner
            .lock_state()
            .selection
            .as_ref()
            .is_some_and(|current| current.ptr_eq(selection))
    }

    // ===== OBSERVERS =====

    /// Registering an already registered observer is a no-op and keeps its
    /// position in the delivery order.
    pub fn register_observer(&self, observer: Arc<dyn Observer>) -> bool {
        let mut observers = self.inner.lock_observers();
        let key = observer_key(&observer);
        if observers.contains_key(&key) {
            return false;
        }
        observers.insert(key, observer);
        true
    }

    pub fn unregister_observer(&self, observer: &Arc<dyn Observer>) -> bool {
        self.inner
            .lock_observers()
            .shift_remove(&observer_key(observer))
            .is_some()
    }

    pub fn is_registered(&self, observer: &Arc<dyn Observer>) -> bool {
        self.inner
            .lock_observers()
            .contains_key(&observer_key(observer))
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock_observers().len()
    }

    // ===== UPDATES =====

    pub fn update_selection(
        &self,
        selection: Option<Selection>,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) {
        self.inner
            .publish(Change::Selection(selection), source, decoration);
    }

    /// Waits for a selection still being resolved, then stores it. On error
    /// the current selection is kept and nothing is delivered.
    pub async fn update_selection_pending<F>(
        &self,
        pending: F,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) -> Result<(), SelectionError>
    where
        F: Future<Output = Result<Selection, SelectionError>>,
    {
        let selection = pending.await.inspect_err(|e| {
            log::warn!("Pending selection failed, keeping current one: {}", e);
        })?;
        self.update_selection(Some(selection), source, decoration);
        Ok(())
    }

    pub fn update_variable(
        &self,
        variable: Option<VariableId>,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) {
        self.inner
            .publish(Change::Variable(variable), source, decoration);
    }

    pub fn update_colormap(
        &self,
        colormap: impl Into<String>,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) {
        self.inner
            .publish(Change::Colormap(colormap.into()), source, decoration);
    }

    pub fn update_show_unmapped_segments(
        &self,
        show: bool,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) {
        self.inner
            .publish(Change::ShowUnmappedSegments(show), source, decoration);
    }

    pub fn update_background_color(
        &self,
        color: impl Into<String>,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) {
        self.inner
            .publish(Change::BackgroundColor(color.into()), source, decoration);
    }

    pub fn update_camera_position(
        &self,
        position: Vec3,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) {
        self.inner
            .publish(Change::CameraPosition(position), source, decoration);
    }

    pub fn update_center_position(
        &self,
        position: Option<Vec3>,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) {
        self.inner
            .publish(Change::CenterPosition(position), source, decoration);
    }

    pub fn update_contact_threshold(
        &self,
        threshold: f64,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) {
        self.inner
            .publish(Change::ContactThreshold(threshold), source, decoration);
    }

    // ===== TRACKS =====

    /// Appends one track per multi-location range of the current selection,
    /// for the current variable. Single-location ranges are skipped.
    ///
    /// Returns the number of tracks added; nothing is delivered when that
    /// is zero.
    pub fn add_tracks_from_selection(
        &self,
        source: Option<SourceId>,
        decoration: Option<Value>,
    ) -> Result<usize, SelectionError> {
        let _dispatch = self.inner.dispatch_guard();

        let (selection, variable, mut tracks) = {
            let state = self.inner.lock_state();
            (
                state.selection.clone(),
                state.settings.variable,
                state.tracks.clone(),
            )
        };
        let (Some(selection), Some(variable)) = (selection, variable) else {
            log::debug!("No selection or variable; no tracks added");
            return Ok(0);
        };

        let before = tracks.len();
        tracks.extend(
            selection
                .as_locations()?
                .iter()
                .filter(|range| !range.is_point())
                .map(|&location_range: &Range| Track {
                    variable,
                    location_range,
                }),
        );
        let added = tracks.len() - before;
        if added > 0 {
            self.inner.publish(Change::Tracks(tracks), source, decoration);
        }
        Ok(added)
    }

    pub fn clear_tracks(&self, source: Option<SourceId>, decoration: Option<Value>) {
        self.inner
            .publish(Change::Tracks(Vec::new()), source, decoration);
    }

    // ===== PERSISTENCE =====

    /// Opaque token holding the selection, settings and tracks. Equal state
    /// always produces the same token.
    ///
    /// Fails with [`ControllerError::NonFinite`] rather than emit a token
    /// that [`Controller::deserialize`] would reject.
    pub fn serialize(&self) -> Result<String, ControllerError> {
        let snapshot = self.snapshot();
        if let Some(name) = snapshot.non_finite_setting() {
            return Err(ControllerError::NonFinite(name));
        }
        Ok(snapshot.to_token()?)
    }

    /// Restores a token from [`Controller::serialize`] and replays every
    /// value to all observers.
    ///
    /// Each event reaches every observer twice: once immediately with
    /// `debounced == false`, then once more after the quiet period with
    /// `debounced == true`. Observers that count replays should look at
    /// one of the two.
    ///
    /// The token is fully validated first; on error nothing changes.
    pub fn deserialize(&self, token: &str) -> Result<(), ControllerError> {
        let (snapshot, selection) = self
            .decode(token)
            .inspect_err(|e| log::warn!("Ignoring controller state token: {}", e))?;

        let _dispatch = self.inner.dispatch_guard();
        let changes: Vec<Change> = {
            let mut state = self.inner.lock_state();
            *state = ControllerState {
                selection,
                settings: snapshot.settings,
                tracks: snapshot.tracks,
            };
            EventKind::ALL.iter().map(|&kind| state.current(kind)).collect()
        };

        log::info!("Restored controller state; replaying {} events", changes.len());
        for change in changes {
            let envelope = Envelope::new(change.kind(), None, None);
            self.inner.deliver(&change, &envelope);
            self.inner.arm(change, envelope);
        }
        Ok(())
    }

    fn decode(&self, token: &str) -> Result<(ControllerSnapshot, Option<Selection>), DecodeError> {
        let mut snapshot = ControllerSnapshot::from_token(token)?;
        let selection = snapshot
            .selection
            .take()
            .map(|data| Selection::from_data(&self.inner.context, data))
            .transpose()
            .map_err(|e| DecodeError::Invalid(e.to_string()))?;
        Ok((snapshot, selection))
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &*self.inner.lock_state())
            .field("observers", &self.observer_count())
            .finish()
    }
}
