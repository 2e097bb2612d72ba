use super::{Controller, Observer, WeakController};
use std::sync::{Arc, Mutex, PoisonError};

/// Tracks which controller an observer is registered with, so it belongs
/// to at most one at a time.
pub struct ObserverSlot {
    observer: Arc<dyn Observer>,
    controller: Mutex<Option<WeakController>>,
}

impl ObserverSlot {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self {
            observer,
            controller: Mutex::new(None),
        }
    }

    pub fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }

    pub fn controller(&self) -> Option<Controller> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(WeakController::upgrade)
    }

    /// Registers with `controller`, leaving the previous controller first.
    /// Attaching to the current controller again changes nothing.
    pub fn attach(&self, controller: &Controller) {
        let mut current = self
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.as_ref().and_then(WeakController::upgrade) {
            if previous.ptr_eq(controller) {
                return;
            }
            previous.unregister_observer(&self.observer);
        }
        controller.register_observer(self.observer.clone());
        *current = Some(controller.downgrade());
    }

    pub fn detach(&self) {
        let previous = self
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(controller) = previous.as_ref().and_then(WeakController::upgrade) {
            controller.unregister_observer(&self.observer);
        }
    }
}

impl Drop for ObserverSlot {
    fn drop(&mut self) {
        self.detach();
    }
}
