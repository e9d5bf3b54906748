use crate::error::{CandidateError, NegotiationError, TransportError};
use crate::peer::media::{LocalStream, LocalTrack, RemoteTrack};
use crate::peer::types::{IceCandidate, ServerConfig, SessionDescription};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Состояние транспорта, упрощённое до того, что нужно сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// События, которые endpoint отдаёт в цикл сессии
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    LocalCandidate(IceCandidate),
    GatheringComplete,
    RemoteTrack(RemoteTrack),
    ConnectionState(ConnectionStatus),
}

pub type EndpointEvents = mpsc::UnboundedSender<EndpointEvent>;

/// Одна сторона peer connection. Принадлежит только контроллеру сессии.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn add_track(&self, track: &LocalTrack, stream: &LocalStream) -> Result<(), TransportError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;

    async fn has_remote_description(&self) -> bool;

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), CandidateError>;

    /// Повторное закрытие ничего не делает
    async fn close(&self);

    /// Снимок статистики транспорта в лог
    async fn log_stats(&self, _moment: &str) {}
}

#[async_trait]
pub trait EndpointFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[ServerConfig],
        events: EndpointEvents,
    ) -> Result<Arc<dyn Endpoint>, TransportError>;
}
