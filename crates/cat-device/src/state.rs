use std::fmt;

use tokio::sync::watch;

/// Connection state of a device.
///
/// `responding` only exists while connected: a console that is not connected
/// is never considered responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session is established.
    #[default]
    Disconnected,

    /// Handles are being opened, waiting for the first notification.
    Connecting,

    /// The session is established.
    Connected {
        /// Whether the console currently answers requests.
        responding: bool,
    },

    /// The session is being torn down.
    Disconnecting,
}

impl ConnectionState {
    /// Returns whether the session is established.
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns whether the session is being established.
    pub const fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Returns whether the session is established and the console answers.
    pub const fn is_responding(&self) -> bool {
        matches!(self, Self::Connected { responding: true })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected { responding: true } => f.write_str("connected"),
            Self::Connected { responding: false } => f.write_str("connected (not responding)"),
            Self::Disconnecting => f.write_str("disconnecting"),
        }
    }
}

/// Observable connection state of a device.
///
/// Every transition is published to the subscribers of the underlying watch
/// channel. Transitions are only allowed along the connection life cycle.
pub(crate) struct StatusCell {
    tx: watch::Sender<ConnectionState>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(ConnectionState::Disconnected),
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// `Disconnected` -> `Connecting`.
    pub fn begin_connect(&self) -> bool {
        self.transition(|state| match state {
            ConnectionState::Disconnected => Some(ConnectionState::Connecting),
            _ => None,
        })
    }

    /// `Connecting` -> `Connected`.
    pub fn finish_connect(&self) -> bool {
        self.transition(|state| match state {
            ConnectionState::Connecting => Some(ConnectionState::Connected { responding: true }),
            _ => None,
        })
    }

    /// `Connecting` -> `Disconnected`.
    pub fn fail_connect(&self) -> bool {
        self.transition(|state| match state {
            ConnectionState::Connecting => Some(ConnectionState::Disconnected),
            _ => None,
        })
    }

    /// Updates the `responding` flag, if connected.
    pub fn set_responding(&self, responding: bool) -> bool {
        self.transition(|state| match state {
            ConnectionState::Connected { responding: current } if current != responding => {
                Some(ConnectionState::Connected { responding })
            }
            _ => None,
        })
    }

    /// `Connecting` or `Connected` -> `Disconnecting`.
    pub fn begin_disconnect(&self) -> bool {
        self.transition(|state| match state {
            ConnectionState::Connecting | ConnectionState::Connected { .. } => {
                Some(ConnectionState::Disconnecting)
            }
            _ => None,
        })
    }

    /// `Disconnecting` -> `Disconnected`.
    pub fn finish_disconnect(&self) -> bool {
        self.transition(|state| match state {
            ConnectionState::Disconnecting => Some(ConnectionState::Disconnected),
            _ => None,
        })
    }

    fn transition(&self, f: impl FnOnce(ConnectionState) -> Option<ConnectionState>) -> bool {
        self.tx.send_if_modified(|state| match f(*state) {
            Some(next) => {
                tracing::debug!(from = %state, to = %next, "connection state");
                *state = next;
                true
            }
            None => false,
        })
    }
}
