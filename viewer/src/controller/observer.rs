//! Event vocabulary between a controller and the widgets observing it.
//!
//! Each event has its own capability trait. An [`Observer`] opts into an
//! event by returning `Some(self)` from the matching accessor; the
//! controller never calls a capability the observer does not expose.

use crate::selection::Selection;
use serde_json::Value;
use shared::state::{Track, VariableId, Vec3};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity a widget passes with its updates so it can recognise, and
/// usually ignore, the echo of its own change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub fn new() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Selection,
    Variable,
    Colormap,
    ShowUnmappedSegments,
    BackgroundColor,
    CameraPosition,
    CenterPosition,
    ContactThreshold,
    Tracks,
}

impl EventKind {
    /// Replay order after a restore.
    pub const ALL: [EventKind; 9] = [
        EventKind::Selection,
        EventKind::Variable,
        EventKind::Colormap,
        EventKind::ShowUnmappedSegments,
        EventKind::BackgroundColor,
        EventKind::CameraPosition,
        EventKind::CenterPosition,
        EventKind::ContactThreshold,
        EventKind::Tracks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Selection => "selectionChanged",
            EventKind::Variable => "variableChanged",
            EventKind::Colormap => "colormapChanged",
            EventKind::ShowUnmappedSegments => "showUnmappedSegmentsChanged",
            EventKind::BackgroundColor => "backgroundColorChanged",
            EventKind::CameraPosition => "cameraPositionChanged",
            EventKind::CenterPosition => "centerPositionChanged",
            EventKind::ContactThreshold => "contactThresholdChanged",
            EventKind::Tracks => "tracksChanged",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Delivery metadata passed alongside every value.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: Option<SourceId>,
    pub decoration: Option<Value>,
    pub kind: EventKind,
    /// `false` for the immediate delivery, `true` for the trailing one sent
    /// after the quiet period.
    pub debounced: bool,
}

impl Envelope {
    pub fn new(kind: EventKind, source: Option<SourceId>, decoration: Option<Value>) -> Self {
        Self {
            source,
            decoration,
            kind,
            debounced: false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_from(&self, source: SourceId) -> bool {
        self.source == Some(source)
    }
}

/// A changed value, as handed to [`OnAnyChanged`].
#[derive(Debug, Clone)]
pub enum Change {
    Selection(Option<Selection>),
    Variable(Option<VariableId>),
    Colormap(String),
    ShowUnmappedSegments(bool),
    BackgroundColor(String),
    CameraPosition(Vec3),
    CenterPosition(Option<Vec3>),
    ContactThreshold(f64),
    Tracks(Vec<Track>),
}

impl Change {
    pub fn kind(&self) -> EventKind {
        match self {
            Change::Selection(_) => EventKind::Selection,
            Change::Variable(_) => EventKind::Variable,
            Change::Colormap(_) => EventKind::Colormap,
            Change::ShowUnmappedSegments(_) => EventKind::ShowUnmappedSegments,
            Change::BackgroundColor(_) => EventKind::BackgroundColor,
            Change::CameraPosition(_) => EventKind::CameraPosition,
            Change::CenterPosition(_) => EventKind::CenterPosition,
            Change::ContactThreshold(_) => EventKind::ContactThreshold,
            Change::Tracks(_) => EventKind::Tracks,
        }
    }

    /// Calls the observer's capability for this change, if it has one.
    pub(crate) fn deliver_to(&self, observer: &dyn Observer, envelope: &Envelope) {
        match self {
            Change::Selection(selection) => {
                if let Some(handler) = observer.selection_handler() {
                    handler.on_selection_changed(selection.as_ref(), envelope);
                }
            }
            Change::Variable(variable) => {
                if let Some(handler) = observer.variable_handler() {
                    handler.on_variable_changed(*variable, envelope);
                }
            }
            Change::Colormap(colormap) => {
                if let Some(handler) = observer.colormap_handler() {
                    handler.on_colormap_changed(colormap, envelope);
                }
            }
            Change::ShowUnmappedSegments(show) => {
                if let Some(handler) = observer.show_unmapped_segments_handler() {
                    handler.on_show_unmapped_segments_changed(*show, envelope);
                }
            }
            Change::BackgroundColor(color) => {
                if let Some(handler) = observer.background_color_handler() {
                    handler.on_background_color_changed(color, envelope);
                }
            }
            Change::CameraPosition(position) => {
                if let Some(handler) = observer.camera_position_handler() {
                    handler.on_camera_position_changed(*position, envelope);
                }
            }
            Change::CenterPosition(position) => {
                if let Some(handler) = observer.center_position_handler() {
                    handler.on_center_position_changed(*position, envelope);
                }
            }
            Change::ContactThreshold(threshold) => {
                if let Some(handler) = observer.contact_threshold_handler() {
                    handler.on_contact_threshold_changed(*threshold, envelope);
                }
            }
            Change::Tracks(tracks) => {
                if let Some(handler) = observer.tracks_handler() {
                    handler.on_tracks_changed(tracks, envelope);
                }
            }
        }
    }
}

// ===== CAPABILITIES =====

pub trait OnSelectionChanged {
    fn on_selection_changed(&self, selection: Option<&Selection>, envelope: &Envelope);
}

pub trait OnVariableChanged {
    fn on_variable_changed(&self, variable: Option<VariableId>, envelope: &Envelope);
}

pub trait OnColormapChanged {
    fn on_colormap_changed(&self, colormap: &str, envelope: &Envelope);
}

pub trait OnShowUnmappedSegmentsChanged {
    fn on_show_unmapped_segments_changed(&self, show: bool, envelope: &Envelope);
}

pub trait OnBackgroundColorChanged {
    fn on_background_color_changed(&self, color: &str, envelope: &Envelope);
}

pub trait OnCameraPositionChanged {
    fn on_camera_position_changed(&self, position: Vec3, envelope: &Envelope);
}

pub trait OnCenterPositionChanged {
    /// `None` means rotate around the structure centroid.
    fn on_center_position_changed(&self, position: Option<Vec3>, envelope: &Envelope);
}

pub trait OnContactThresholdChanged {
    fn on_contact_threshold_changed(&self, threshold: f64, envelope: &Envelope);
}

pub trait OnTracksChanged {
    fn on_tracks_changed(&self, tracks: &[Track], envelope: &Envelope);
}

/// Mirrors every delivery, immediate and debounced, of every event.
pub trait OnAnyChanged {
    fn on_any_changed(&self, change: &Change, envelope: &Envelope);
}

/// A widget registered with a controller.
///
/// Handlers run synchronously on the updating thread and must not block.
pub trait Observer: Send + Sync {
    fn selection_handler(&self) -> Option<&dyn OnSelectionChanged> {
        None
    }

    fn variable_handler(&self) -> Option<&dyn OnVariableChanged> {
        None
    }

    fn colormap_handler(&self) -> Option<&dyn OnColormapChanged> {
        None
    }

    fn show_unmapped_segments_handler(&self) -> Option<&dyn OnShowUnmappedSegmentsChanged> {
        None
    }

    fn background_color_handler(&self) -> Option<&dyn OnBackgroundColorChanged> {
        None
    }

    fn camera_position_handler(&self) -> Option<&dyn OnCameraPositionChanged> {
        None
    }

    fn center_position_handler(&self) -> Option<&dyn OnCenterPositionChanged> {
        None
    }

    fn contact_threshold_handler(&self) -> Option<&dyn OnContactThresholdChanged> {
        None
    }

    fn tracks_handler(&self) -> Option<&dyn OnTracksChanged> {
        None
    }

    fn any_handler(&self) -> Option<&dyn OnAnyChanged> {
        None
    }
}
