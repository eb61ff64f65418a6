//! Application state shared across handlers.

use grove_core::{Grove, SchedulerHandle};

#[derive(Clone)]
pub struct AppState {
    pub grove: Grove,
    /// Queue for syncs triggered outside the hourly sweep.
    pub scheduler: SchedulerHandle,
}

impl AppState {
    pub fn new(grove: Grove, scheduler: SchedulerHandle) -> Self {
        Self { grove, scheduler }
    }
}
