//! Scheduled quantity commits.
//!
//! Each cart line has at most one scheduled commit. Scheduling a new one
//! aborts the previous task, so only the last value typed before the quiet
//! window elapses is ever sent. When a task wakes up it moves its own entry
//! to the in-flight table; from then on the commit is no longer cancellable,
//! and it stays in flight until the request finishes.

use std::collections::HashMap;

use tokio::task::AbortHandle;
use tracing::debug;

use aurelia_core::{CartLineId, Quantity};

struct PendingEdit {
    quantity: Quantity,
    generation: u64,
    task: AbortHandle,
}

struct InFlight {
    quantity: Quantity,
    generation: u64,
}

/// Outstanding debounced commits, one per line.
///
/// Dropping the table aborts every scheduled commit.
#[derive(Default)]
pub(crate) struct PendingEdits {
    entries: HashMap<CartLineId, PendingEdit>,
    in_flight: HashMap<CartLineId, InFlight>,
    next_generation: u64,
}

impl PendingEdits {
    /// Reserve a generation number for the next scheduled task.
    pub(crate) const fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Record a scheduled commit, aborting any earlier one for the line.
    ///
    /// Returns the quantity the superseded commit would have sent.
    pub(crate) fn schedule(
        &mut self,
        line_id: CartLineId,
        quantity: Quantity,
        generation: u64,
        task: AbortHandle,
    ) -> Option<Quantity> {
        let previous = self.entries.insert(
            line_id,
            PendingEdit {
                quantity,
                generation,
                task,
            },
        );

        previous.map(|edit| {
            edit.task.abort();
            debug!(%line_id, superseded = %edit.quantity, %quantity, "Superseded pending commit");
            edit.quantity
        })
    }

    /// Called by a woken task: if its entry is still the current one, mark it
    /// in flight and return the quantity to send.
    pub(crate) fn take_if_current(
        &mut self,
        line_id: CartLineId,
        generation: u64,
    ) -> Option<Quantity> {
        match self.entries.get(&line_id) {
            Some(edit) if edit.generation == generation => {
                let edit = self.entries.remove(&line_id)?;
                self.in_flight.insert(
                    line_id,
                    InFlight {
                        quantity: edit.quantity,
                        generation,
                    },
                );
                Some(edit.quantity)
            }
            _ => None,
        }
    }

    /// The request for `generation` has finished.
    ///
    /// A newer commit for the same line keeps its in-flight entry.
    pub(crate) fn finish(&mut self, line_id: CartLineId, generation: u64) {
        if self
            .in_flight
            .get(&line_id)
            .is_some_and(|sent| sent.generation == generation)
        {
            self.in_flight.remove(&line_id);
        }
    }

    /// Quantity of the commit currently on the wire for a line.
    pub(crate) fn in_flight(&self, line_id: CartLineId) -> Option<Quantity> {
        self.in_flight.get(&line_id).map(|sent| sent.quantity)
    }

    /// Abort the scheduled commit for a line. Returns whether one existed.
    pub(crate) fn cancel(&mut self, line_id: CartLineId) -> bool {
        self.entries.remove(&line_id).is_some_and(|edit| {
            edit.task.abort();
            true
        })
    }

    /// Abort every scheduled commit. Returns how many were cancelled.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, edit) in self.entries.drain() {
            edit.task.abort();
        }
        if count > 0 {
            debug!(count, "Cancelled pending commits");
        }
        count
    }

    pub(crate) fn is_pending(&self, line_id: CartLineId) -> bool {
        self.entries.contains_key(&line_id)
    }

    /// Whether a line has a commit scheduled or on the wire.
    pub(crate) fn is_busy(&self, line_id: CartLineId) -> bool {
        self.is_pending(line_id) || self.in_flight.contains_key(&line_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Drop for PendingEdits {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
