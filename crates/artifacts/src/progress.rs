//! Progress reporting for chunked transfers.
//!
//! Purely observational: transfers call `begin` once, `advance` after each
//! committed batch, and `finish` at the end. Nothing here can fail a transfer.

pub trait Progress: Send + Sync {
    /// A transfer labelled `label` with `total` parts is starting.
    fn begin(&self, label: &str, total: u64);

    /// `n` more parts are done.
    fn advance(&self, n: u64);

    fn finish(&self);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&self, _label: &str, _total: u64) {}

    fn advance(&self, _n: u64) {}

    fn finish(&self) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Progress;
    use std::sync::Mutex;

    /// Records events for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingProgress {
        pub events: Mutex<Vec<String>>,
    }

    impl RecordingProgress {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Progress for RecordingProgress {
        fn begin(&self, label: &str, total: u64) {
            self.events.lock().unwrap().push(format!("begin {} {}", label, total));
        }

        fn advance(&self, n: u64) {
            self.events.lock().unwrap().push(format!("advance {}", n));
        }

        fn finish(&self) {
            self.events.lock().unwrap().push("finish".to_string());
        }
    }
}
