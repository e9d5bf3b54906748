//! Один видеозвонок: локальные медиа, один транспортный endpoint и обмен
//! offer/answer через сигнальный канал.
//!
//! Все обработчики выполняются по одному в собственной задаче сессии.
//! Контроллер создаётся на звонок и единолично владеет своим endpoint.

use crate::config::SessionConfig;
use crate::error::{MediaAccessError, NegotiationError, SessionError, SignalingError};
use crate::peer::endpoint::{ConnectionStatus, Endpoint, EndpointEvent, EndpointFactory};
use crate::peer::ice::{analyze_candidates, apply_pending_candidates};
use crate::peer::media::{LocalStream, MediaConstraints, MediaSource, RemoteStream, RemoteTrack};
use crate::peer::state::{ConnectionHealth, PendingCandidates, SessionState};
use crate::peer::types::{IceCandidate, SessionDescription};
use crate::signaling::{SignalEvent, SignalingChannel, SignalingMessage, Subscription};
use crate::ui::{EndReason, SessionObserver, UiEvent};
use crate::utils::random_id;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;

/// Команды UI для запущенной сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Offer,
    End,
}

/// Клонируемый хэндл сессии, работающей в своей задаче
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// false, если задача сессии уже завершилась
    pub fn end(&self) -> bool {
        self.tx.send(SessionCommand::End).is_ok()
    }

    pub fn offer(&self) -> bool {
        self.tx.send(SessionCommand::Offer).is_ok()
    }
}

/// По одной подписке на каждое сигнальное событие, регистрируются при создании сессии
struct Inbox {
    offers: Subscription,
    answers: Subscription,
    candidates: Subscription,
    end: Subscription,
}

impl Inbox {
    fn subscribe(channel: &SignalingChannel) -> Result<Self, SignalingError> {
        Ok(Self {
            offers: channel.on(SignalEvent::Offer)?,
            answers: channel.on(SignalEvent::Answer)?,
            candidates: channel.on(SignalEvent::Candidate)?,
            end: channel.on(SignalEvent::EndChat)?,
        })
    }
}

pub struct SessionController {
    id: String,
    config: SessionConfig,
    media: Arc<dyn MediaSource>,
    factory: Arc<dyn EndpointFactory>,
    channel: SignalingChannel,
    inbox: Option<Inbox>,
    observer: Arc<dyn SessionObserver>,

    state: SessionState,
    endpoint: Option<Arc<dyn Endpoint>>,
    endpoint_events: Option<mpsc::UnboundedReceiver<EndpointEvent>>,
    local_stream: Option<LocalStream>,
    remote_stream: Option<RemoteStream>,
    pending: PendingCandidates,
    local_candidates: Vec<IceCandidate>,
    awaiting_answer: bool,
    offer_requested: bool,
    health: ConnectionHealth,
    grace_deadline: Option<Instant>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        media: Arc<dyn MediaSource>,
        factory: Arc<dyn EndpointFactory>,
        channel: SignalingChannel,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, SessionError> {
        let inbox = Inbox::subscribe(&channel)?;
        Ok(Self {
            id: random_id(),
            config,
            media,
            factory,
            channel,
            inbox: Some(inbox),
            observer,
            state: SessionState::Idle,
            endpoint: None,
            endpoint_events: None,
            local_stream: None,
            remote_stream: None,
            pending: PendingCandidates::default(),
            local_candidates: Vec::new(),
            awaiting_answer: false,
            offer_requested: false,
            health: ConnectionHealth::default(),
            grace_deadline: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_endpoint(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    pub fn local_stream(&self) -> Option<&LocalStream> {
        self.local_stream.as_ref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::info!(session = %self.id, "state {} -> {}", self.state, state);
        self.state = state;
        self.observer.notify(UiEvent::StateChanged(state));
    }

    // ========== START ==========

    /// Получает локальные медиа и открывает транспортный endpoint
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let stream = self.acquire_media().await?;
        self.open_endpoint(stream).await
    }

    pub async fn acquire_media(&mut self) -> Result<LocalStream, SessionError> {
        let constraints = self.enter_acquiring()?;
        let media = self.media.clone();
        let result = media.acquire(constraints).await;
        self.media_acquired(result)
    }

    fn enter_acquiring(&mut self) -> Result<MediaConstraints, SessionError> {
        if self.state != SessionState::Idle {
            return Err(NegotiationError::InvalidState(format!("start in {}", self.state)).into());
        }
        self.set_state(SessionState::AcquiringMedia);
        Ok(MediaConstraints {
            video: self.config.video,
            audio: self.config.audio,
        })
    }

    fn media_acquired(
        &mut self,
        result: Result<LocalStream, MediaAccessError>,
    ) -> Result<LocalStream, SessionError> {
        match result {
            Ok(stream) if self.state == SessionState::AcquiringMedia => Ok(stream),
            Ok(_) => Err(NegotiationError::InvalidState(format!("media arrived in {}", self.state)).into()),
            Err(e) => {
                tracing::error!(session = %self.id, "Error accessing media devices: {e}");
                self.observer.notify(UiEvent::MediaError(e.clone()));
                self.set_state(SessionState::Ended);
                Err(e.into())
            }
        }
    }

    /// Создаёт endpoint, подписывается на его события и добавляет локальные треки
    pub async fn open_endpoint(&mut self, stream: LocalStream) -> Result<(), SessionError> {
        if self.state != SessionState::AcquiringMedia {
            return Err(NegotiationError::InvalidState(format!("open endpoint in {}", self.state)).into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = match self.factory.create(&self.config.ice_servers, tx).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::error!(session = %self.id, "Failed to create endpoint: {e}");
                self.observer.notify(UiEvent::StartFailed(e.to_string()));
                self.set_state(SessionState::Ended);
                return Err(e.into());
            }
        };

        for track in stream.tracks() {
            if let Err(e) = endpoint.add_track(track, &stream).await {
                tracing::error!(session = %self.id, "Failed to attach {} track: {e}", track.kind);
                endpoint.close().await;
                self.observer.notify(UiEvent::StartFailed(e.to_string()));
                self.set_state(SessionState::Ended);
                return Err(e.into());
            }
        }

        tracing::info!(session = %self.id, tracks = stream.tracks().len(), "endpoint ready");
        self.endpoint = Some(endpoint);
        self.endpoint_events = Some(rx);
        self.local_stream = Some(stream);
        self.set_state(SessionState::Negotiating);
        Ok(())
    }

    // ========== NEGOTIATION ==========

    /// Сторона вызывающего: создаёт offer и отправляет собеседнику
    pub async fn offer(&mut self) -> Result<(), SessionError> {
        let endpoint = self.live_endpoint()?;
        let offer = endpoint.create_offer().await?;
        endpoint.set_local_description(offer.clone()).await?;
        self.awaiting_answer = true;
        self.channel.send(SignalingMessage::Offer(offer))?;
        tracing::debug!(session = %self.id, "offer sent");
        Ok(())
    }

    /// Применяет удалённый offer и отвечает на него. Remote description
    /// устанавливается до создания answer.
    pub async fn on_offer(&mut self, offer: SessionDescription) -> Result<(), NegotiationError> {
        if self.state.is_terminal() {
            tracing::debug!(session = %self.id, "offer after end ignored");
            return Ok(());
        }
        let endpoint = self.live_endpoint()?;

        endpoint.set_remote_description(offer).await?;
        self.replay_pending(endpoint.as_ref()).await;

        let answer = endpoint.create_answer().await?;
        endpoint.set_local_description(answer.clone()).await?;

        if let Err(e) = self.channel.send(SignalingMessage::Answer(answer)) {
            tracing::warn!(session = %self.id, "Failed to send answer: {e}");
        }
        tracing::debug!(session = %self.id, "answer sent");
        Ok(())
    }

    pub async fn on_answer(&mut self, answer: SessionDescription) -> Result<(), NegotiationError> {
        if self.state.is_terminal() {
            tracing::debug!(session = %self.id, "answer after end ignored");
            return Ok(());
        }
        let endpoint = self.live_endpoint()?;
        if !self.awaiting_answer {
            return Err(NegotiationError::InvalidState(
                "answer without a pending local offer".into(),
            ));
        }

        endpoint.set_remote_description(answer).await?;
        self.awaiting_answer = false;
        self.replay_pending(endpoint.as_ref()).await;
        Ok(())
    }

    /// Best-effort: ошибки логируются и отбрасываются
    pub async fn on_candidate(&mut self, candidate: IceCandidate) {
        if self.state.is_terminal() {
            return;
        }

        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                if self.config.buffer_early_candidates {
                    tracing::debug!(session = %self.id, "No endpoint yet, queuing candidate");
                    self.queue_candidate(candidate);
                }
                return;
            }
        };

        if self.config.buffer_early_candidates && !endpoint.has_remote_description().await {
            tracing::debug!(session = %self.id, "Remote description not set yet, queuing candidate");
            self.queue_candidate(candidate);
            return;
        }

        if let Err(e) = endpoint.add_candidate(candidate).await {
            tracing::debug!(session = %self.id, "Error adding received ICE candidate: {e}");
        }
    }

    fn queue_candidate(&mut self, candidate: IceCandidate) {
        if let Some(dropped) = self.pending.push(candidate) {
            tracing::warn!(session = %self.id, "Pending candidate queue full, dropped {}", dropped.candidate);
        }
    }

    async fn replay_pending(&mut self, endpoint: &dyn Endpoint) {
        if self.pending.is_empty() {
            return;
        }
        let queued = self.pending.len();
        let applied = apply_pending_candidates(endpoint, &mut self.pending).await;
        tracing::debug!(session = %self.id, "Applied {applied}/{queued} pending candidates");
    }

    fn live_endpoint(&self) -> Result<Arc<dyn Endpoint>, NegotiationError> {
        match &self.endpoint {
            Some(endpoint) if self.state.accepts_signaling() => Ok(endpoint.clone()),
            Some(_) => Err(NegotiationError::InvalidState(self.state.to_string())),
            None => Err(NegotiationError::NoEndpoint),
        }
    }

    // ========== TERMINATION ==========

    /// Завершение по инициативе собеседника. Ничего не отправляет обратно.
    pub async fn on_end_session(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::info!(session = %self.id, "The chat session has ended (remote)");
        self.teardown().await;
        self.observer.notify(UiEvent::SessionEnded(EndReason::Remote));
    }

    /// Локальное завершение: сообщаем собеседнику, затем закрываем endpoint
    pub async fn end(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if let Err(e) = self.channel.send(SignalingMessage::EndSession) {
            tracing::warn!(session = %self.id, "Failed to send end-chat: {e}");
        }
        tracing::info!(session = %self.id, "Chat session ended (local)");
        self.teardown().await;
        self.observer.notify(UiEvent::SessionEnded(EndReason::Local));
    }

    async fn teardown(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close().await;
        }
        self.endpoint_events = None;
        self.local_stream = None;
        self.pending.clear();
        self.awaiting_answer = false;
        self.grace_deadline = None;
        self.set_state(SessionState::Ended);
    }

    // ========== ENDPOINT EVENTS ==========

    pub async fn handle_endpoint_event(&mut self, event: EndpointEvent) {
        if self.state.is_terminal() {
            tracing::trace!(session = %self.id, "endpoint event after end dropped: {event:?}");
            return;
        }
        match event {
            EndpointEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate),
            EndpointEvent::GatheringComplete => {
                analyze_candidates(&self.local_candidates);
            }
            EndpointEvent::RemoteTrack(track) => self.on_remote_track(track),
            EndpointEvent::ConnectionState(status) => self.on_connection_state(status).await,
        }
    }

    fn on_local_candidate(&mut self, candidate: IceCandidate) {
        self.local_candidates.push(candidate.clone());
        if let Err(e) = self.channel.send(SignalingMessage::Candidate(candidate)) {
            tracing::warn!(session = %self.id, "Failed to send local candidate: {e}");
        }
    }

    fn on_remote_track(&mut self, track: RemoteTrack) {
        let stream = self.remote_stream.get_or_insert_with(RemoteStream::new).clone();
        if !stream.add_track(track) {
            tracing::debug!(session = %self.id, "duplicate remote track ignored");
        }
        self.observer.notify(UiEvent::RemoteStream(stream));
    }

    async fn on_connection_state(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connected => {
                self.grace_deadline = None;
                if self.health.is_degraded() {
                    tracing::info!(session = %self.id, "Connection recovered");
                    self.observer.notify(UiEvent::ConnectionRecovered);
                }
                self.health = ConnectionHealth::Stable;
                self.set_state(SessionState::Connected);
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Failed => {
                if self.grace_deadline.is_some() {
                    tracing::debug!(session = %self.id, "Grace period already running, ignoring {status:?}");
                    return;
                }
                tracing::warn!(
                    session = %self.id,
                    "Peer connection {:?} - starting grace period of {} s",
                    status,
                    self.config.grace_period.as_secs()
                );
                if let Some(endpoint) = &self.endpoint {
                    endpoint.log_stats("BEFORE-FAIL").await;
                }
                self.health = ConnectionHealth::Degraded {
                    since: chrono::Utc::now(),
                };
                self.grace_deadline = Some(Instant::now() + self.config.grace_period);
                self.observer.notify(UiEvent::ConnectionProblem);
                self.observer.notify(UiEvent::ConnectionRecovering);
            }
            ConnectionStatus::Closed => {
                tracing::debug!(session = %self.id, "Peer connection closed");
            }
            ConnectionStatus::New | ConnectionStatus::Connecting => {
                tracing::trace!(session = %self.id, "Peer connection state: {status:?}");
            }
        }
    }

    /// Grace period истёк, транспорт не восстановился
    pub fn on_grace_expired(&mut self) {
        self.grace_deadline = None;
        if let ConnectionHealth::Degraded { since } = self.health {
            tracing::warn!(session = %self.id, "Connection not recovered since {since}");
            self.health = ConnectionHealth::Failed;
            self.observer.notify(UiEvent::ConnectionFailed);
        }
    }

    // ========== DISPATCH ==========

    /// Передаёт сигнальное сообщение обработчику. Ошибки дальше не идут.
    pub async fn dispatch(&mut self, msg: SignalingMessage) {
        match msg {
            SignalingMessage::Offer(offer) => {
                if let Err(e) = self.on_offer(offer).await {
                    tracing::warn!(session = %self.id, "Error handling offer: {e}");
                }
            }
            SignalingMessage::Answer(answer) => {
                if let Err(e) = self.on_answer(answer).await {
                    tracing::warn!(session = %self.id, "Error handling answer: {e}");
                }
            }
            SignalingMessage::Candidate(candidate) => self.on_candidate(candidate).await,
            SignalingMessage::EndSession => self.on_end_session().await,
        }
    }

    async fn command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Offer => {
                if let Err(e) = self.offer().await {
                    tracing::warn!(session = %self.id, "Failed to create offer: {e}");
                }
            }
            SessionCommand::End => self.end().await,
        }
    }

    /// Ведёт сессию до конца: старт, затем сигналинг, события endpoint,
    /// команды UI и таймер grace period по одному, пока сессия не завершится.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) -> SessionState {
        if !self.channel.is_pumping() {
            if let Err(e) = self.channel.spawn_pump() {
                tracing::warn!(session = %self.id, "Signaling pump not started: {e}");
            }
        }
        let mut commands_open = true;

        if self.state == SessionState::Idle {
            if !self.start_racing_end(&mut commands, &mut commands_open).await {
                return self.state;
            }
            if self.offer_requested {
                self.offer_requested = false;
                self.command(SessionCommand::Offer).await;
            }
        }

        let Some(mut inbox) = self.inbox.take() else {
            tracing::warn!(session = %self.id, "Signaling handlers already taken");
            return self.state;
        };
        let mut events = self.endpoint_events.take();

        while !self.state.is_terminal() {
            let grace = self.grace_deadline;
            tokio::select! {
                Some(msg) = inbox.offers.recv() => self.dispatch(msg).await,
                Some(msg) = inbox.answers.recv() => self.dispatch(msg).await,
                Some(msg) = inbox.candidates.recv() => self.dispatch(msg).await,
                Some(msg) = inbox.end.recv() => self.dispatch(msg).await,
                Some(event) = next_event(&mut events) => self.handle_endpoint_event(event).await,
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => self.command(cmd).await,
                    None => commands_open = false,
                },
                _ = grace_timer(grace), if grace.is_some() => self.on_grace_expired(),
                else => {
                    tracing::warn!(session = %self.id, "All session inputs closed");
                    self.teardown().await;
                    break;
                }
            }
        }
        self.state
    }

    /// Получает медиа, продолжая слушать `End` от UI. Возвращает false,
    /// если сессия не дошла до Negotiating.
    async fn start_racing_end(
        &mut self,
        commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
        commands_open: &mut bool,
    ) -> bool {
        let constraints = match self.enter_acquiring() {
            Ok(constraints) => constraints,
            Err(e) => {
                tracing::warn!(session = %self.id, "{e}");
                return false;
            }
        };

        let media = self.media.clone();
        let acquire = media.acquire(constraints);
        tokio::pin!(acquire);

        let result = loop {
            tokio::select! {
                result = &mut acquire => break Some(result),
                cmd = commands.recv(), if *commands_open => match cmd {
                    Some(SessionCommand::Offer) => self.offer_requested = true,
                    Some(SessionCommand::End) => break None,
                    None => *commands_open = false,
                },
            }
        };

        let Some(result) = result else {
            tracing::info!(session = %self.id, "ended while acquiring media");
            self.end().await;
            return false;
        };

        match self.media_acquired(result) {
            Ok(stream) => self.open_endpoint(stream).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Запускает сессию в отдельной задаче
    pub fn spawn(self) -> (SessionHandle, JoinHandle<SessionState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("session", id = %self.id);
        let task = tokio::spawn(self.run(rx).instrument(span));
        (SessionHandle { tx }, task)
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<EndpointEvent>>,
) -> Option<EndpointEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

async fn grace_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
