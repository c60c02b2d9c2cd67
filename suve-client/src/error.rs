/// The client-side error kinds: transport/framing failures alongside the
/// agent's own remote error kinds.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("agent is not running and auto-start is disabled")]
    AgentNotRunning,

    #[error("agent did not become ready within the auto-start backoff ceiling")]
    AutoStartTimeout,

    #[error("agent returned {kind:?}: {message}")]
    Remote { kind: suve_ipc::ErrorKind, message: String },

    #[error(transparent)]
    Ipc(#[from] suve_ipc::FramingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// `true` for the two transport failures worth one retry after a
    /// fresh `ensure_running`: the agent may have just exited from idle
    /// timeout, or its socket may still be mid-rebind.
    pub fn is_retryable(&self) -> bool {
        let kind = match self {
            ClientError::Io(e) => Some(e.kind()),
            ClientError::Ipc(suve_ipc::FramingError::Io(e)) => Some(e.kind()),
            _ => None,
        };
        matches!(kind, Some(std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::BrokenPipe))
    }
}
