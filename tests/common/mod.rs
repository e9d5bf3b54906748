#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use visio_session::error::{CandidateError, MediaAccessError, NegotiationError, TransportError};
use visio_session::peer::endpoint::{Endpoint, EndpointEvent, EndpointEvents, EndpointFactory};
use visio_session::peer::media::{LocalStream, LocalTrack, MediaConstraints, MediaSource, StaticTrackSource};
use visio_session::peer::types::{IceCandidate, ServerConfig, SessionDescription};
use visio_session::signaling::{Envelope, SignalingChannel, SignalingMessage};
use visio_session::ui::{SessionObserver, UiEvent};
use visio_session::{SessionConfig, SessionController};

pub fn desc(kind: &str, sdp: &str) -> SessionDescription {
    serde_json::from_value(json!({ "type": kind, "sdp": sdp })).unwrap()
}

pub fn host_candidate(n: u16) -> IceCandidate {
    IceCandidate::new(format!(
        "candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"
    ))
}

// ========== MEDIA ==========

pub struct FakeMedia {
    error: Option<MediaAccessError>,
    gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
}

impl FakeMedia {
    pub fn ok() -> Self {
        Self {
            error: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: MediaAccessError) -> Self {
        Self {
            error: Some(error),
            ..Self::ok()
        }
    }

    /// Получение медиа ждёт сигнала gate
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::ok()
        }
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaAccessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        StaticTrackSource::default().acquire(constraints).await
    }
}

// ========== ENDPOINT ==========

#[derive(Default)]
pub struct FakeState {
    pub has_remote: bool,
    pub remote: Vec<SessionDescription>,
    pub local: Vec<SessionDescription>,
    pub candidates: Vec<IceCandidate>,
    pub tracks: Vec<String>,
    pub close_calls: usize,
}

pub struct FakeEndpoint {
    events: Mutex<Option<EndpointEvents>>,
    pub state: Mutex<FakeState>,
}

impl FakeEndpoint {
    pub fn emit(&self, event: EndpointEvent) {
        let events = self.events.lock().unwrap();
        events.as_ref().expect("events detached").send(event).unwrap();
    }

    /// Отпускает sender событий, как будто транспорт пропал
    pub fn detach_events(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().close_calls > 0
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().unwrap().candidates.clone()
    }

    pub fn track_count(&self) -> usize {
        self.state.lock().unwrap().tracks.len()
    }
}

#[async_trait]
impl Endpoint for FakeEndpoint {
    async fn add_track(&self, track: &LocalTrack, _stream: &LocalStream) -> Result<(), TransportError> {
        self.state.lock().unwrap().tracks.push(track.id.clone());
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        if desc.sdp.contains("garbage") {
            return Err(NegotiationError::RemoteDescription("unparseable sdp".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.has_remote = true;
        state.remote.push(desc);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        Ok(desc("offer", "v=0\r\no=- fake-offer\r\n"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        if !self.state.lock().unwrap().has_remote {
            return Err(NegotiationError::CreateAnswer("no remote offer".into()));
        }
        Ok(desc("answer", "v=0\r\no=- fake-answer\r\n"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.state.lock().unwrap().local.push(desc);
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.state.lock().unwrap().has_remote
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), CandidateError> {
        let mut state = self.state.lock().unwrap();
        if !state.has_remote {
            return Err(CandidateError::Rejected("remote description not set".into()));
        }
        state.candidates.push(candidate);
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().close_calls += 1;
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub fail: bool,
    created: Mutex<Vec<Arc<FakeEndpoint>>>,
}

impl FakeFactory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn last(&self) -> Arc<FakeEndpoint> {
        self.created.lock().unwrap().last().cloned().expect("no endpoint created")
    }
}

#[async_trait]
impl EndpointFactory for FakeFactory {
    async fn create(
        &self,
        _ice_servers: &[ServerConfig],
        events: EndpointEvents,
    ) -> Result<Arc<dyn Endpoint>, TransportError> {
        if self.fail {
            return Err(TransportError("no network".into()));
        }
        let endpoint = Arc::new(FakeEndpoint {
            events: Mutex::new(Some(events)),
            state: Mutex::new(FakeState::default()),
        });
        self.created.lock().unwrap().push(endpoint.clone());
        Ok(endpoint)
    }
}

// ========== UI ==========

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }
}

impl SessionObserver for RecordingObserver {
    fn notify(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ========== RELAY ==========

/// Дальняя сторона relay со стороны теста
pub struct Relay {
    to_session: mpsc::UnboundedSender<Envelope>,
    from_session: mpsc::UnboundedReceiver<Envelope>,
}

impl Relay {
    pub fn push(&self, msg: SignalingMessage) {
        self.to_session.send(msg.into_envelope().unwrap()).unwrap();
    }

    /// Всё, что сессия уже отправила
    pub fn sent(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.from_session.try_recv() {
            out.push(envelope);
        }
        out
    }

    pub async fn next(&mut self) -> Option<Envelope> {
        self.from_session.recv().await
    }
}

pub fn relay() -> (SignalingChannel, Relay) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (
        SignalingChannel::new(out_tx, in_rx),
        Relay {
            to_session: in_tx,
            from_session: out_rx,
        },
    )
}

pub fn events_named<'a>(sent: &'a [Envelope], name: &str) -> Vec<&'a Envelope> {
    sent.iter().filter(|e| e.event == name).collect()
}

pub struct Harness {
    pub session: SessionController,
    pub relay: Relay,
    pub factory: Arc<FakeFactory>,
    pub media: Arc<FakeMedia>,
    pub ui: Arc<RecordingObserver>,
}

pub fn harness_with(config: SessionConfig, media: FakeMedia, factory: FakeFactory) -> Harness {
    let (channel, relay) = relay();
    let media = Arc::new(media);
    let factory = Arc::new(factory);
    let ui = Arc::new(RecordingObserver::default());
    let session = SessionController::new(config, media.clone(), factory.clone(), channel, ui.clone()).unwrap();
    Harness {
        session,
        relay,
        factory,
        media,
        ui,
    }
}

pub fn harness() -> Harness {
    harness_with(SessionConfig::default(), FakeMedia::ok(), FakeFactory::default())
}
