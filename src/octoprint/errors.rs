use thiserror::Error;

/// Failure of a command sent to the printer-control service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The host answered with a non-success status. `message` is the
    /// server-supplied `error` field when present.
    #[error("{command} rejected with HTTP {status}: {message}")]
    Rejected {
        command: String,
        status: u16,
        message: String,
    },
    #[error("{command} could not reach the printer host: {message}")]
    Transport { command: String, message: String },
    #[error("{command} returned an unreadable response: {message}")]
    InvalidResponse { command: String, message: String },
}

impl CommandError {
    /// Message suitable for a user notification
    pub fn server_message(&self) -> &str {
        match self {
            CommandError::Rejected { message, .. }
            | CommandError::Transport { message, .. }
            | CommandError::InvalidResponse { message, .. } => message,
        }
    }

    pub fn command(&self) -> &str {
        match self {
            CommandError::Rejected { command, .. }
            | CommandError::Transport { command, .. }
            | CommandError::InvalidResponse { command, .. } => command,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CommandError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
