//! Selection and controller core of the genome viewer.
//!
//! Widgets (structure view, contact map, control panel, track charts) share
//! one [`Controller`]. They build [`Selection`]s from user gestures, push
//! them and display settings through the controller, and react to its
//! immediate and debounced notifications.

pub mod controller;
pub mod dataflow;
pub mod observers;
pub mod resolver;
pub mod selection;

#[cfg(test)]
mod testing;

pub use controller::{
    Change, Controller, ControllerError, Envelope, EventKind, Observer, ObserverSlot, SourceId,
    WeakController,
};
pub use observers::{GeneReadout, GeneSink, RendererBridge, SegmentRenderer};
pub use resolver::{GeneResponse, GeneTable, ResolveError, Resolver, SegmentResponse};
pub use selection::{Selection, SelectionContext, SelectionError};
