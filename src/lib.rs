pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod ui;
pub mod utils;

pub use config::SessionConfig;
pub use error::{
    CandidateError, ConfigError, MediaAccessError, NegotiationError, Result, SessionError,
    SignalingError, TransportError,
};
pub use peer::{
    ConnectionStatus, Endpoint, EndpointEvent, EndpointFactory, IceCandidate, LocalStream,
    MediaConstraints, MediaSource, RemoteStream, RemoteTrack, SessionDescription, SessionState,
    StaticTrackSource, WebRtcFactory,
};
pub use session::{SessionCommand, SessionController, SessionHandle};
pub use signaling::{Envelope, SignalEvent, SignalingChannel, SignalingMessage};
pub use ui::{ChannelObserver, EndReason, NullObserver, SessionObserver, UiEvent};
