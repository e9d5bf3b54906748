pub mod connection;
pub mod endpoint;
pub mod ice;
pub mod media;
pub mod state;
pub mod types;

pub use connection::{WebRtcEndpoint, WebRtcFactory};
pub use endpoint::{ConnectionStatus, Endpoint, EndpointEvent, EndpointEvents, EndpointFactory};
pub use media::{
    LocalStream, LocalTrack, MediaConstraints, MediaSource, RemoteStream, RemoteTrack,
    StaticTrackSource,
};
pub use state::{ConnectionHealth, PendingCandidates, SessionState};
pub use types::{IceCandidate, MediaKind, ServerConfig, SessionDescription};
