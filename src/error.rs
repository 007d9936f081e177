use std::fmt;

/// Failure raised by a business collaborator (user directory, room store, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    Internal(String),
}

impl StoreError {
    /// Text placed in the `ERROR` response for this failure.
    pub fn message(&self) -> String {
        match self {
            StoreError::Internal(e) => {
                tracing::error!("internal collaborator error: {e}");
                "internal server error".to_string()
            }
            StoreError::NotFound(msg)
            | StoreError::Forbidden(msg)
            | StoreError::Conflict(msg)
            | StoreError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            StoreError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            StoreError::Conflict(msg) => write!(f, "conflict: {msg}"),
            StoreError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            StoreError::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug)]
pub enum AppError {
    /// An identity-requiring command arrived before the handshake.
    Unauthenticated,
    /// Wrong arity or an unparseable field.
    MalformedFrame(String),
    /// The client-side correlation wait expired.
    Timeout,
    Collaborator(StoreError),
    /// The server answered with `ERROR` or refused the handshake.
    Rejected(String),
    /// I/O failure or peer close.
    Disconnected(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::MalformedFrame(_) => "malformed_frame",
            AppError::Timeout => "timeout",
            AppError::Collaborator(StoreError::NotFound(_)) => "not_found",
            AppError::Collaborator(StoreError::Forbidden(_)) => "forbidden",
            AppError::Collaborator(StoreError::Conflict(_)) => "already_exists",
            AppError::Collaborator(StoreError::BadRequest(_)) => "invalid_request",
            AppError::Collaborator(StoreError::Internal(_)) => "internal_error",
            AppError::Rejected(_) => "rejected",
            AppError::Disconnected(_) => "disconnected",
        }
    }

    /// Text sent to the peer in an `ERROR` response.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthenticated => "not authenticated".to_string(),
            AppError::MalformedFrame(msg) => msg.clone(),
            AppError::Timeout => "no answer from server".to_string(),
            AppError::Collaborator(e) => e.message(),
            AppError::Rejected(msg) | AppError::Disconnected(msg) => msg.clone(),
        }
    }

    /// Whether the failure is answered in-band and leaves the connection open.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Disconnected(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Collaborator(e) => write!(f, "{}: {e}", self.code()),
            _ => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Collaborator(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Collaborator(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Disconnected(e.to_string())
    }
}
