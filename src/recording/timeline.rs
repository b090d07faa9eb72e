use chrono::{DateTime, Local};

/// Per-transaction timestamps used only for elapsed-time diagnostics.
///
/// A timeline lives on the stack of the handling call and is never
/// persisted; the durable arrival time lives in the record itself.
#[derive(Debug, Clone, Copy)]
pub struct RecordingTimeline {
    pub request_received: DateTime<Local>,
    pub request_forwarded: Option<DateTime<Local>>,
    pub response_received: Option<DateTime<Local>>,
    pub response_sent: Option<DateTime<Local>>,
}

impl RecordingTimeline {
    /// Starts a timeline stamped with the current instant as arrival time.
    pub fn started_now() -> Self {
        Self::started_at(Local::now())
    }

    pub fn started_at(request_received: DateTime<Local>) -> Self {
        Self {
            request_received,
            request_forwarded: None,
            response_received: None,
            response_sent: None,
        }
    }

    /// Milliseconds between arrival and the response being handed off, or
    /// until now when the response timestamp was never stamped.
    pub fn elapsed_ms(&self) -> i64 {
        let end = self.response_sent.unwrap_or_else(Local::now);
        (end - self.request_received).num_milliseconds()
    }
}
