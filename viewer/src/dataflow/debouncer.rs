//! Trailing-edge debouncer built on an unbounded channel and one Tokio task.

use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Fires `on_quiet` with the most recently armed value once `quiet` has
/// passed without another [`Debouncer::arm`] call.
///
/// Arming while a firing is pending restarts the timer, so a burst of K
/// arms produces exactly one firing carrying the last value. The task ends
/// when the debouncer is dropped.
#[derive(Debug)]
pub struct Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    armed: UnboundedSender<T>,
    task: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Must be called from inside a Tokio runtime.
    pub fn spawn<F>(quiet: Duration, on_quiet: F) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let (armed, mut armed_stream) = unbounded::<T>();

        let task = tokio::spawn(async move {
            while let Some(mut latest) = armed_stream.next().await {
                // Debounce loop - wait for quiet period, restarting on every new arm
                loop {
                    tokio::select! {
                        next = armed_stream.next() => match next {
                            Some(value) => latest = value,
                            None => return,
                        },
                        _ = tokio::time::sleep(quiet) => {
                            on_quiet(latest);
                            break;
                        }
                    }
                }
            }
        });

        Self { armed, task }
    }

    /// Start or restart the quiet-period timer.
    pub fn arm(&self, value: T) {
        if self.armed.unbounded_send(value).is_err() {
            log::warn!("Debouncer task has stopped; dropping armed value");
        }
    }
}

impl<T> Drop for Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.task.abort();
    }
}
