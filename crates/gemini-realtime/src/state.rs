//! Session state and the outbound gate.
//!
//! The connection handle (write half + receive task) and the session state
//! live together in one [`Link`] behind a single lock, so a sender can never
//! see a handle whose state says otherwise. Media sends go through
//! [`Link::ready_sink`], which only yields the socket once setup has been
//! transmitted.

use std::fmt;

use tokio::task::JoinHandle;

use crate::transport::FrameSink;

/// Lifecycle of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No connection handle exists.
    #[default]
    Disconnected,
    /// The socket is being opened.
    Connecting,
    /// The socket is open and the setup message is being sent.
    AwaitingHandshake,
    /// Setup was sent and the receive loop is running; media may flow.
    Ready,
    /// A close was requested and is waiting to be observed.
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::AwaitingHandshake => write!(f, "AwaitingHandshake"),
            SessionState::Ready => write!(f, "Ready"),
            SessionState::Closing => write!(f, "Closing"),
        }
    }
}

/// Connection handle plus session state.
///
/// `generation` is bumped on every `connect()` so a receive loop from an old
/// handle can tell it has been superseded.
#[derive(Default)]
pub(crate) struct Link {
    pub(crate) state: SessionState,
    pub(crate) sink: Option<Box<dyn FrameSink>>,
    pub(crate) receive_task: Option<JoinHandle<()>>,
    pub(crate) generation: u64,
}

impl Link {
    pub(crate) fn is_ready(&self) -> bool {
        self.state == SessionState::Ready && self.sink.is_some()
    }

    /// The write half, only when media is allowed through.
    pub(crate) fn ready_sink(&mut self) -> Option<&mut Box<dyn FrameSink>> {
        if self.state == SessionState::Ready {
            self.sink.as_mut()
        } else {
            None
        }
    }

    /// Whether the handle created for `generation` still exists.
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.generation == generation && self.sink.is_some()
    }

    /// Clear the handle created for `generation`.
    ///
    /// Returns `None` when that handle was already gone.
    pub(crate) fn teardown(&mut self, generation: u64) -> Option<Teardown> {
        if !self.is_live(generation) {
            return None;
        }
        let previous = self.state;
        let sink = self.sink.take()?;
        self.state = SessionState::Disconnected;
        self.receive_task = None;
        Some(Teardown { previous, sink })
    }
}

/// What was left of a handle after [`Link::teardown`].
pub(crate) struct Teardown {
    pub(crate) previous: SessionState,
    pub(crate) sink: Box<dyn FrameSink>,
}
