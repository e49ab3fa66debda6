//! Request-level statistics fed by the web middleware.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Number of recent response times averaged by default.
pub const DEFAULT_RESPONSE_WINDOW: usize = 100;

/// Snapshot of request statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestStats {
    pub total: u64,
    pub errors: u64,
    /// Percentage of requests with status >= 400.
    pub error_rate: f64,
    /// Mean over the recent response-time window, in seconds.
    pub avg_response_time: f64,
}

#[derive(Debug, Default)]
struct RequestState {
    total: u64,
    errors: u64,
    response_times: VecDeque<f64>,
}

/// Running request totals plus a sliding window of response times.
#[derive(Debug)]
pub struct RequestTracker {
    window: usize,
    state: Mutex<RequestState>,
}

impl RequestTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            state: Mutex::new(RequestState::default()),
        }
    }

    /// Record one request and return the updated stats.
    pub fn record(&self, response_time_secs: f64, status_code: u16) -> RequestStats {
        let mut state = self.state.lock();
        state.total += 1;
        if status_code >= 400 {
            state.errors += 1;
        }
        if state.response_times.len() == self.window {
            state.response_times.pop_front();
        }
        state.response_times.push_back(response_time_secs);
        snapshot(&state)
    }

    pub fn stats(&self) -> RequestStats {
        snapshot(&self.state.lock())
    }

    pub fn error_rate(&self) -> f64 {
        self.stats().error_rate
    }

    pub fn avg_response_time(&self) -> f64 {
        self.stats().avg_response_time
    }

    pub fn reset(&self) {
        *self.state.lock() = RequestState::default();
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_WINDOW)
    }
}

fn snapshot(state: &RequestState) -> RequestStats {
    let error_rate = if state.total > 0 {
        state.errors as f64 / state.total as f64 * 100.0
    } else {
        0.0
    };
    let avg_response_time = if state.response_times.is_empty() {
        0.0
    } else {
        state.response_times.iter().sum::<f64>() / state.response_times.len() as f64
    };

    RequestStats {
        total: state.total,
        errors: state.errors,
        error_rate,
        avg_response_time,
    }
}
