//! Domain events emitted over the broadcast bus during a sweep.

use serde::Serialize;

/// Events published by the sweep engine and its notifiers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum WatchEvent {
    SweepStarted,
    SweepFinished {
        owners: usize,
        watches_checked: usize,
        new_items: usize,
    },
    WatchUpdated {
        owner_id: String,
        watch_id: String,
        query: String,
        new_items: usize,
        titles: Vec<String>,
    },
    Error {
        message: String,
    },
}
