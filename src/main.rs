// Два локальных пира договариваются через relay внутри процесса

use std::sync::Arc;
use std::time::Duration;
use visio_session::{
    ChannelObserver, SessionConfig, SessionController, SessionState, SignalingChannel,
    StaticTrackSource, UiEvent, WebRtcFactory,
};

#[tokio::main]
async fn main() {
    visio_session::logger::init();

    let (caller_channel, callee_channel) = SignalingChannel::pair();
    let (caller_ui, mut caller_events) = ChannelObserver::new();
    let (callee_ui, mut callee_events) = ChannelObserver::new();

    let build = |channel: SignalingChannel, ui: ChannelObserver| {
        SessionController::new(
            SessionConfig::default(),
            Arc::new(StaticTrackSource::default()),
            Arc::new(WebRtcFactory),
            channel,
            Arc::new(ui),
        )
    };
    let (caller, callee) = match (build(caller_channel, caller_ui), build(callee_channel, callee_ui)) {
        (Ok(caller), Ok(callee)) => (caller, callee),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to build sessions: {e}");
            return;
        }
    };

    let (_callee_handle, callee_task) = callee.spawn();
    let (caller_handle, caller_task) = caller.spawn();

    tokio::spawn(async move {
        while let Some(event) = callee_events.recv().await {
            if let UiEvent::RemoteStream(stream) = &event {
                tracing::info!("callee bound remote stream {} ({} tracks)", stream.id(), stream.len());
            }
        }
    });

    caller_handle.offer();

    let connected = tokio::time::timeout(Duration::from_secs(15), async {
        while let Some(event) = caller_events.recv().await {
            match event {
                UiEvent::StateChanged(SessionState::Connected) => return true,
                UiEvent::StateChanged(SessionState::Ended) => return false,
                _ => {}
            }
        }
        false
    })
    .await
    .unwrap_or(false);

    tracing::info!(connected, "loopback negotiation finished");
    caller_handle.end();

    for (name, task) in [("caller", caller_task), ("callee", callee_task)] {
        match task.await {
            Ok(state) => tracing::info!("{name} finished in state {state}"),
            Err(e) => tracing::error!("{name} task failed: {e}"),
        }
    }
}
