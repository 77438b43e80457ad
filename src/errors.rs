use thiserror::Error;

/// Error reported by a media engine implementation.
///
/// The code and message are surfaced to callers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcErrorKind {
    /// The engine could not allocate a session. Fatal to the object.
    Construction,
    /// The request violates a facade policy; the engine was not called.
    Configuration,
    /// The offer/answer exchange was rejected. The session stays usable.
    Negotiation,
    /// A frame or codec-specific data call failed inside the engine.
    Publish,
    /// The session has been released.
    Closed,
    /// No track of the requested kind has been negotiated yet.
    NotNegotiated,
    /// The simulcast layer is not part of the negotiated track set.
    UnknownLayer,
    PoisonedLock,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RtcError {
    pub kind: RtcErrorKind,
    /// Engine-provided code, when the error came from the engine.
    pub code: Option<i32>,
    pub message: String,
}

impl RtcError {
    fn from_engine(kind: RtcErrorKind, error: EngineError) -> Self {
        Self {
            kind,
            code: Some(error.code),
            message: error.message,
        }
    }

    pub fn construction(error: EngineError) -> Self {
        Self::from_engine(RtcErrorKind::Construction, error)
    }

    pub fn negotiation(error: EngineError) -> Self {
        Self::from_engine(RtcErrorKind::Negotiation, error)
    }

    pub fn publish(error: EngineError) -> Self {
        Self::from_engine(RtcErrorKind::Publish, error)
    }

    /// The delivery thread could not be started.
    pub fn spawn_failed(error: &std::io::Error) -> Self {
        Self {
            kind: RtcErrorKind::Construction,
            code: None,
            message: format!("failed to start delivery thread: {error}"),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: RtcErrorKind::Configuration,
            code: None,
            message: message.into(),
        }
    }

    /// Negotiation failure detected by the facade itself (no engine code).
    pub fn negotiation_state(message: impl Into<String>) -> Self {
        Self {
            kind: RtcErrorKind::Negotiation,
            code: None,
            message: message.into(),
        }
    }

    pub fn closed() -> Self {
        Self {
            kind: RtcErrorKind::Closed,
            code: None,
            message: "session is closed".to_string(),
        }
    }

    pub fn not_negotiated(what: &str) -> Self {
        Self {
            kind: RtcErrorKind::NotNegotiated,
            code: None,
            message: format!("no {what} track has been negotiated"),
        }
    }

    pub fn unknown_layer(name: &str) -> Self {
        Self {
            kind: RtcErrorKind::UnknownLayer,
            code: None,
            message: format!("simulcast layer not negotiated: {name}"),
        }
    }

    pub fn poisoned_lock() -> Self {
        Self {
            kind: RtcErrorKind::PoisonedLock,
            code: None,
            message: "lock poisoned by previous panic".to_string(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.kind == RtcErrorKind::Closed
    }
}

pub type Result<T> = std::result::Result<T, RtcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_code_and_message_are_kept() {
        let err = RtcError::negotiation(EngineError::new(7, "codec mismatch"));
        assert_eq!(err.kind, RtcErrorKind::Negotiation);
        assert_eq!(err.code, Some(7));
        assert_eq!(err.to_string(), "codec mismatch");
    }

    #[test]
    fn local_errors_have_no_code() {
        assert_eq!(RtcError::closed().code, None);
        assert_eq!(RtcError::configuration("too many layers").code, None);
        assert!(RtcError::closed().is_closed());
    }

    #[test]
    fn engine_error_display() {
        let err = EngineError::new(-3, "no session");
        assert_eq!(err.to_string(), "engine error -3: no session");
    }
}
