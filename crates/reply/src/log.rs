//! Completion records.

use crate::error::TransmitError;
use crate::latch::State;
use http::StatusCode;
use tracing::{error, info, warn};

const COMPLETED: &[&str] = &["response"];
const ERRORED: &[&str] = &["response", "error"];
const ABORTED: &[&str] = &["response", "error", "aborted"];

/// How a transmission ended.
#[derive(Debug)]
pub struct Outcome {
    pub state: State,
    /// The status sent. A transmission that ended while still preparing never produced
    /// a head; this is then the status of the envelope as handed in.
    pub status: StatusCode,
    /// payload bytes handed to the connection, after compression
    pub bytes_sent: u64,
    pub error: Option<TransmitError>,
}

impl Outcome {
    pub fn tags(&self) -> &'static [&'static str] {
        match self.state {
            State::Aborted => ABORTED,
            State::Errored => ERRORED,
            _ => COMPLETED,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == State::Completed
    }
}

/// Receives exactly one record per transmission.
#[cfg_attr(test, mockall::automock)]
pub trait LogSink: Send + Sync {
    fn record(&self, outcome: &Outcome);
}

/// Emits every record as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, outcome: &Outcome) {
        let tags = outcome.tags();
        let status = outcome.status.as_u16();
        match (&outcome.state, &outcome.error) {
            (State::Aborted, _) => warn!(?tags, status, bytes = outcome.bytes_sent, "response aborted"),
            (_, Some(e)) => error!(?tags, status, bytes = outcome.bytes_sent, cause = %e, "response failed"),
            _ => info!(?tags, status, bytes = outcome.bytes_sent, "response sent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(state: State, error: Option<TransmitError>) -> Outcome {
        Outcome { state, status: StatusCode::OK, bytes_sent: 0, error }
    }

    #[test]
    fn tags() {
        assert_eq!(outcome(State::Completed, None).tags(), ["response"]);
        assert_eq!(outcome(State::Errored, Some(TransmitError::marshal("x"))).tags(), ["response", "error"]);
        assert_eq!(outcome(State::Aborted, Some(TransmitError::Aborted)).tags(), ["response", "error", "aborted"]);
    }

    #[test]
    fn mock_sink_sees_the_record() {
        let mut sink = MockLogSink::new();
        sink.expect_record().withf(|outcome| outcome.is_success()).times(1).return_const(());

        sink.record(&outcome(State::Completed, None));
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        TracingSink.record(&outcome(State::Errored, Some(TransmitError::stream(std::io::Error::other("reset")))));
        TracingSink.record(&outcome(State::Aborted, Some(TransmitError::Aborted)));
    }
}
