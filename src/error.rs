use thiserror::Error;

/// Не удалось получить локальные медиа. Фатально для сессии: endpoint не создаётся.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaAccessError {
    #[error("permission to access media devices was denied")]
    PermissionDenied,
    #[error("no media device available for the requested constraints")]
    NoDevice,
    #[error("media capture failed: {0}")]
    Capture(String),
}

/// Ошибка применения или создания SDP. Сессия остаётся открытой.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("no endpoint exists for this session")]
    NoEndpoint,
    #[error("negotiation not allowed in current state: {0}")]
    InvalidState(String),
    #[error("failed to set remote description: {0}")]
    RemoteDescription(String),
    #[error("failed to set local description: {0}")]
    LocalDescription(String),
    #[error("failed to create answer: {0}")]
    CreateAnswer(String),
    #[error("failed to create offer: {0}")]
    CreateOffer(String),
}

/// Удалённый кандидат не добавлен. Всегда best-effort.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error("malformed candidate: {0}")]
    Malformed(String),
    #[error("candidate rejected by transport: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("signaling channel is closed")]
    Closed,
    #[error("a handler is already registered for event '{0}'")]
    DuplicateHandler(String),
    #[error("failed to encode signaling message: {0}")]
    Encode(String),
    #[error("failed to decode signaling message: {0}")]
    Decode(String),
    #[error("unknown signaling event '{0}'")]
    UnknownEvent(String),
}

/// Не удалось создать endpoint или добавить трек
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<webrtc::Error> for TransportError {
    fn from(e: webrtc::Error) -> Self {
        TransportError(e.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ICE server URL cannot be empty")]
    EmptyUrl,
    #[error("TURN server '{0}' requires username and credential")]
    MissingTurnCredentials(String),
    #[error("invalid configuration document: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    MediaAccess(#[from] MediaAccessError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Candidate(#[from] CandidateError),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
