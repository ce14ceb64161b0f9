//! Sliding error window.
//!
//! Holds the outcome of recent failed calls and reports which fraction of
//! them were server-side. Entries expire by age and the buffer is also capped
//! by count, so a burst of failures cannot grow it without bound.

use crate::models::OutcomeEvent;
use std::{collections::VecDeque, time::Duration};
use tokio::time::Instant;

#[derive(Debug)]
pub struct SlidingErrorWindow {
    events: VecDeque<OutcomeEvent>,
    duration: Duration,
    capacity: usize,
}

impl SlidingErrorWindow {
    pub fn new(duration: Duration, capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            duration,
            capacity,
        }
    }

    pub fn record(&mut self, is_server_error: bool, at: Instant) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(OutcomeEvent {
            at,
            is_server_error,
        });
    }

    pub fn error_rate(&mut self, now: Instant) -> f64 {
        self.evict(now);
        if self.events.is_empty() {
            return 0.0;
        }
        let server_errors = self.events.iter().filter(|e| e.is_server_error).count();
        server_errors as f64 / self.events.len() as f64
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.events.front() {
            if now.saturating_duration_since(front.at) > self.duration {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}
