//! Per-session delivery pacing.
//!
//! The scheduler hands the surface at most one event per update cycle. Events
//! that arrive while the surface is busy are queued in arrival order and
//! released one per ready signal.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::event::Event;

/// Whether the surface can take the next event right away
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// The next arriving event is shown immediately
    #[default]
    Idle,
    /// The surface is showing an event and has not signalled ready yet
    AwaitingReady,
}

/// FIFO delivery state machine for one session.
///
/// Every method that returns `Some(event)` expects the caller to push that
/// event to the surface's display trigger.
#[derive(Debug, Default)]
pub struct DeliveryScheduler {
    pending: VecDeque<Event>,
    state: DeliveryState,
    delivered: u64,
    high_water: usize,
}

impl DeliveryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// An event arrived from the connection.
    pub fn on_event(&mut self, event: Event) -> Option<Event> {
        self.pending.push_back(event);
        let shown = match self.state {
            DeliveryState::Idle => self.dispatch(),
            DeliveryState::AwaitingReady => None,
        };
        self.note_backlog();
        shown
    }

    /// The surface finished its update cycle.
    ///
    /// With nothing queued this only moves back to `Idle`; the signal is
    /// spent priming the scheduler so the next arrival is shown at once.
    pub fn on_ready(&mut self) -> Option<Event> {
        match self.dispatch() {
            Some(event) => Some(event),
            None => {
                self.state = DeliveryState::Idle;
                None
            }
        }
    }

    /// Queue an event without attempting delivery.
    pub fn enqueue(&mut self, event: Event) {
        self.pending.push_back(event);
        self.note_backlog();
    }

    /// Release the oldest queued event if the surface is idle.
    pub fn resume(&mut self) -> Option<Event> {
        match self.state {
            DeliveryState::Idle => self.dispatch(),
            DeliveryState::AwaitingReady => None,
        }
    }

    /// Drop everything still queued, returning how many events were lost.
    pub fn discard(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total events handed to the surface
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Largest number of events seen waiting behind the one on display
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    fn note_backlog(&mut self) {
        self.high_water = self.high_water.max(self.pending.len());
    }

    fn dispatch(&mut self) -> Option<Event> {
        let event = self.pending.pop_front()?;
        self.state = DeliveryState::AwaitingReady;
        self.delivered += 1;
        Some(event)
    }
}
