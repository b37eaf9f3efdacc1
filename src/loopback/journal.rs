use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Source,
    Decoder,
    Encoder,
    Sink,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    Open,
    Configure,
    Start,
    AddTrack,
    Stop,
    Release,
}

/// Shared, append-only log of lifecycle calls made on loopback resources.
///
/// Every call is recorded when it is made, whether or not it succeeds.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(Resource, Call)>>>,
}

impl Journal {
    pub fn record(&self, resource: Resource, call: Call) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((resource, call));
    }

    pub fn entries(&self) -> Vec<(Resource, Call)> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self, resource: Resource, call: Call) -> usize {
        self.entries()
            .into_iter()
            .filter(|&entry| entry == (resource, call))
            .count()
    }

    /// Stop and release calls in the order they were made.
    pub fn teardown(&self) -> Vec<(Resource, Call)> {
        self.entries()
            .into_iter()
            .filter(|(_, call)| matches!(call, Call::Stop | Call::Release))
            .collect()
    }
}
