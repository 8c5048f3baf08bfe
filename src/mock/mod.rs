//! Scripted test doubles
//!
//! Stand-ins for the three seams the library talks to the outside world
//! through, so whole flows run in-process without a cluster:
//!
//! - [`ScriptedRunner`]: canned kubectl outputs keyed by argument line
//! - [`ScriptedTransport`]: canned gateway responses keyed by routing header
//! - [`RecordingSleeper`]: records poll sleeps instead of waiting
//!
//! A scripted key may hold a sequence of replies. Each call consumes the
//! front reply; the last one repeats forever.

mod runner;
mod transport;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::poll::Sleeper;

pub use runner::{RunnerReply, ScriptedRunner};
pub use transport::{ScriptedTransport, TransportReply};

/// Pop the next reply, keeping the last one in place
fn next_reply<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// Sleeper that only records the requested durations
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.sleeps.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}
