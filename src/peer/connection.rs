use crate::config::default_ice_servers;
use crate::error::{CandidateError, NegotiationError, TransportError};
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::peer::endpoint::{
    ConnectionStatus, Endpoint, EndpointEvent, EndpointEvents, EndpointFactory,
};
use crate::peer::media::{LocalStream, LocalTrack, RemoteTrack};
use crate::peer::types::{IceCandidate, MediaKind, ServerConfig, SessionDescription};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Создаёт endpoint'ы поверх webrtc-rs
#[derive(Debug, Clone, Default)]
pub struct WebRtcFactory;

#[async_trait]
impl EndpointFactory for WebRtcFactory {
    async fn create(
        &self,
        ice_servers: &[ServerConfig],
        events: EndpointEvents,
    ) -> Result<Arc<dyn Endpoint>, TransportError> {
        let endpoint = WebRtcEndpoint::new(ice_servers, events).await?;
        Ok(Arc::new(endpoint))
    }
}

pub struct WebRtcEndpoint {
    pc: Arc<RTCPeerConnection>,
    closed: AtomicBool,
}

impl WebRtcEndpoint {
    /// создаём Peer и подписываемся на его события
    pub async fn new(ice_servers: &[ServerConfig], events: EndpointEvents) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(ice_servers)).await?);

        // Обработчик локальных кандидатов (Trickle-ICE)
        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                match cand {
                    Some(c) => match c.to_json() {
                        Ok(init) => {
                            let candidate = IceCandidate::from(init);
                            dump_candidate("LOCAL", &candidate);
                            let _ = tx.send(EndpointEvent::LocalCandidate(candidate));
                        }
                        Err(e) => tracing::warn!("Failed to serialize local candidate: {e}"),
                    },
                    // cand == None означает конец сбора
                    None => {
                        tracing::debug!("ICE candidate gathering completed (null candidate received)");
                    }
                }
            })
        }));

        let tx = events.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            tracing::debug!("ICE gathering state changed to: {:?}", state);
            if state == RTCIceGathererState::Complete {
                let _ = tx.send(EndpointEvent::GatheringComplete);
            }
            Box::pin(async {})
        }));

        let tx = events.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Audio,
                    _ => MediaKind::Video,
                };
                let remote = RemoteTrack {
                    id: track.id(),
                    kind,
                    stream_id: track.stream_id(),
                    remote: Some(track),
                };
                tracing::debug!(track = %remote.id, kind = %remote.kind, "remote track arrived");
                let _ = tx.send(EndpointEvent::RemoteTrack(remote));
                Box::pin(async {})
            },
        ));

        let tx = events;
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            tracing::debug!("Peer connection state changed to: {:?}", st);
            let status = match st {
                RTCPeerConnectionState::Connecting => ConnectionStatus::Connecting,
                RTCPeerConnectionState::Connected => ConnectionStatus::Connected,
                RTCPeerConnectionState::Disconnected => ConnectionStatus::Disconnected,
                RTCPeerConnectionState::Failed => ConnectionStatus::Failed,
                RTCPeerConnectionState::Closed => ConnectionStatus::Closed,
                _ => ConnectionStatus::New,
            };
            let _ = tx.send(EndpointEvent::ConnectionState(status));
            Box::pin(async {})
        }));

        Ok(Self {
            pc,
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl Endpoint for WebRtcEndpoint {
    async fn add_track(&self, track: &LocalTrack, stream: &LocalStream) -> Result<(), TransportError> {
        let local: Arc<dyn TrackLocal + Send + Sync> = track.rtp.clone();
        let sender = self.pc.add_track(local).await?;
        tracing::debug!(track = %track.id, stream = %stream.id, "local track attached");

        // RTCP нужно вычитывать, иначе интерцепторы не работают
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| NegotiationError::RemoteDescription(e.to_string()))
    }

    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        self.pc
            .create_offer(None)
            .await
            .map_err(|e| NegotiationError::CreateOffer(e.to_string()))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        self.pc
            .create_answer(None)
            .await
            .map_err(|e| NegotiationError::CreateAnswer(e.to_string()))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| NegotiationError::LocalDescription(e.to_string()))
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), CandidateError> {
        if candidate.candidate.is_empty() {
            return Err(CandidateError::Malformed("empty candidate line".into()));
        }
        self.pc
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| CandidateError::Rejected(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.pc.close().await {
            tracing::warn!("Failed to close peer connection: {e}");
        }
    }

    async fn log_stats(&self, moment: &str) {
        dump_selected_pair(&self.pc, moment).await;
    }
}

/// Создает конфигурацию для peer connection
pub fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    let ice_servers = if servers.is_empty() {
        get_user_ice_servers(&default_ice_servers())
    } else {
        get_user_ice_servers(servers)
    };

    RTCConfiguration {
        ice_servers,
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Преобразование серверов из фронтенда в RTCIceServer
pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}
