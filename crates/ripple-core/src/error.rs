use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors surfaced by sources and pending-event handles.
///
/// Handler panics are not represented here: they unwind straight through the
/// `fire`/`stop` call that dispatched the event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("fire on stopped stream #{stream_id}")]
    FireAfterStop { stream_id: u64 },

    #[error("stream #{stream_id} stopped before producing the awaited event")]
    Exhausted { stream_id: u64 },

    #[error("timed out waiting on stream #{stream_id}")]
    WaitTimedOut { stream_id: u64 },
}

impl StreamError {
    /// Id of the stream the error refers to.
    #[must_use]
    pub fn stream_id(&self) -> u64 {
        match self {
            Self::FireAfterStop { stream_id }
            | Self::Exhausted { stream_id }
            | Self::WaitTimedOut { stream_id } => *stream_id,
        }
    }
}
