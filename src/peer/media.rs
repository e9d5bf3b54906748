use crate::error::MediaAccessError;
use crate::peer::types::MediaKind;
use crate::utils::random_id;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Какие устройства запрашиваются у платформы
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

/// Локальный трек, который отдаётся в endpoint через `add_track`
#[derive(Clone)]
pub struct LocalTrack {
    pub id: String,
    pub kind: MediaKind,
    pub stream_id: String,
    pub rtp: Arc<TrackLocalStaticSample>,
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

impl LocalTrack {
    pub fn new(kind: MediaKind, stream_id: &str) -> Self {
        let codec = match kind {
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
        };
        let id = format!("{kind}-{}", random_id());
        let rtp = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            stream_id.to_owned(),
        ));
        Self {
            id,
            kind,
            stream_id: stream_id.to_owned(),
            rtp,
        }
    }
}

/// Набор локальных треков, принадлежит сессии до её завершения
#[derive(Debug, Clone)]
pub struct LocalStream {
    pub id: String,
    tracks: Vec<LocalTrack>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, tracks: Vec<LocalTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn audio(&self) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(|t| t.kind == MediaKind::Audio)
    }

    pub fn video(&self) -> impl Iterator<Item = &LocalTrack> {
        self.tracks.iter().filter(|t| t.kind == MediaKind::Video)
    }
}

/// Трек, пришедший от удалённой стороны
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: MediaKind,
    pub stream_id: String,
    pub remote: Option<Arc<TrackRemote>>,
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            stream_id: stream_id.into(),
            remote: None,
        }
    }
}

/// Удалённые треки, собранные для видео.
///
/// Клоны разделяют один список треков, поэтому однажды привязанный вывод
/// видит и треки, добавленные позже.
#[derive(Debug, Clone)]
pub struct RemoteStream {
    id: String,
    tracks: Arc<Mutex<Vec<RemoteTrack>>>,
}

impl RemoteStream {
    pub fn new() -> Self {
        Self {
            id: random_id(),
            tracks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// false, если трек с таким id уже есть
    pub fn add_track(&self, track: RemoteTrack) -> bool {
        let mut tracks = self.tracks.lock().unwrap();
        if tracks.iter().any(|t| t.id == track.id) {
            return false;
        }
        tracks.push(track);
        true
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Оба хэндла указывают на один и тот же поток
    pub fn same_stream(&self, other: &RemoteStream) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

impl Default for RemoteStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Платформенный доступ к камере и микрофону
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaAccessError>;
}

/// Источник треков без устройств захвата. Кадры в `LocalTrack::rtp` пишет
/// владелец пайплайна захвата.
#[derive(Debug, Clone)]
pub struct StaticTrackSource {
    has_camera: bool,
    has_microphone: bool,
    denied: bool,
}

impl StaticTrackSource {
    pub fn new(has_camera: bool, has_microphone: bool) -> Self {
        Self {
            has_camera,
            has_microphone,
            denied: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            has_camera: true,
            has_microphone: true,
            denied: true,
        }
    }
}

impl Default for StaticTrackSource {
    fn default() -> Self {
        Self::new(true, true)
    }
}

#[async_trait]
impl MediaSource for StaticTrackSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaAccessError> {
        if self.denied {
            return Err(MediaAccessError::PermissionDenied);
        }
        if !constraints.video && !constraints.audio {
            return Err(MediaAccessError::NoDevice);
        }
        if (constraints.video && !self.has_camera) || (constraints.audio && !self.has_microphone) {
            return Err(MediaAccessError::NoDevice);
        }

        let stream_id = format!("local-{}", random_id());
        let mut tracks = Vec::with_capacity(2);
        if constraints.audio {
            tracks.push(LocalTrack::new(MediaKind::Audio, &stream_id));
        }
        if constraints.video {
            tracks.push(LocalTrack::new(MediaKind::Video, &stream_id));
        }
        tracing::debug!(stream = %stream_id, tracks = tracks.len(), "local media acquired");
        Ok(LocalStream::new(stream_id, tracks))
    }
}
