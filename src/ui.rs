use crate::error::MediaAccessError;
use crate::peer::media::RemoteStream;
use crate::peer::state::SessionState;
use tokio::sync::mpsc;

/// Кто завершил сессию
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Local,
    Remote,
}

/// Уведомления для встраивающего UI
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Привязать поток к удалённому видео
    RemoteStream(RemoteStream),
    StateChanged(SessionState),
    /// Блокирующее уведомление, сессия не стартовала
    MediaError(MediaAccessError),
    /// Не удалось поднять endpoint, сессия не стартовала
    StartFailed(String),
    ConnectionProblem,
    ConnectionRecovering,
    ConnectionRecovered,
    ConnectionFailed,
    SessionEnded(EndReason),
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::RemoteStream(_) => "visio-remote-stream",
            UiEvent::StateChanged(SessionState::Connected) => "visio-connected",
            UiEvent::StateChanged(_) => "visio-state",
            UiEvent::MediaError(_) => "visio-media-error",
            UiEvent::StartFailed(_) => "visio-start-failed",
            UiEvent::ConnectionProblem => "visio-connection-problem",
            UiEvent::ConnectionRecovering => "visio-connection-recovering",
            UiEvent::ConnectionRecovered => "visio-connection-recovered",
            UiEvent::ConnectionFailed => "visio-connection-failed",
            UiEvent::SessionEnded(_) => "visio-ended",
        }
    }
}

pub trait SessionObserver: Send + Sync {
    fn notify(&self, event: UiEvent);
}

/// Пересылает события в канал, который читает UI
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionObserver for ChannelObserver {
    fn notify(&self, event: UiEvent) {
        tracing::debug!("emit {}", event.name());
        if self.tx.send(event).is_err() {
            tracing::debug!("UI receiver dropped, event discarded");
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn notify(&self, _event: UiEvent) {}
}
