//! Сигналинг через relay строго между двумя пирами.
//!
//! Relay непрозрачен: кадры уходят через один mpsc sender и приходят через один
//! receiver. Обе стороны считают собеседника единственным, поэтому id пиров в
//! кадрах нет.

use crate::error::SignalingError;
use crate::peer::types::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalEvent {
    Offer,
    Answer,
    Candidate,
    EndChat,
}

impl SignalEvent {
    pub const ALL: [SignalEvent; 4] = [
        SignalEvent::Offer,
        SignalEvent::Answer,
        SignalEvent::Candidate,
        SignalEvent::EndChat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalEvent::Offer => "offer",
            SignalEvent::Answer => "answer",
            SignalEvent::Candidate => "candidate",
            SignalEvent::EndChat => "end-chat",
        }
    }

    /// Старые браузерные клиенты шлют `ice-candidate`, принимаем как `candidate`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "offer" => Some(SignalEvent::Offer),
            "answer" => Some(SignalEvent::Answer),
            "candidate" | "ice-candidate" => Some(SignalEvent::Candidate),
            "end-chat" => Some(SignalEvent::EndChat),
            _ => None,
        }
    }
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Кадр в том виде, в каком он идёт через relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum SignalingMessage {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
    EndSession,
}

impl SignalingMessage {
    pub fn event(&self) -> SignalEvent {
        match self {
            SignalingMessage::Offer(_) => SignalEvent::Offer,
            SignalingMessage::Answer(_) => SignalEvent::Answer,
            SignalingMessage::Candidate(_) => SignalEvent::Candidate,
            SignalingMessage::EndSession => SignalEvent::EndChat,
        }
    }

    pub fn into_envelope(self) -> Result<Envelope, SignalingError> {
        let event = self.event().as_str().to_owned();
        let payload = match self {
            SignalingMessage::Offer(desc) | SignalingMessage::Answer(desc) => Some(
                serde_json::to_value(desc).map_err(|e| SignalingError::Encode(e.to_string()))?,
            ),
            SignalingMessage::Candidate(c) => Some(
                serde_json::to_value(c).map_err(|e| SignalingError::Encode(e.to_string()))?,
            ),
            SignalingMessage::EndSession => None,
        };
        Ok(Envelope { event, payload })
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, SignalingError> {
        let event = SignalEvent::parse(&envelope.event)
            .ok_or_else(|| SignalingError::UnknownEvent(envelope.event.clone()))?;

        if event == SignalEvent::EndChat {
            return Ok(SignalingMessage::EndSession);
        }

        let payload = envelope
            .payload
            .ok_or_else(|| SignalingError::Decode(format!("'{event}' without payload")))?;
        let decode_err = |e: serde_json::Error| SignalingError::Decode(e.to_string());

        Ok(match event {
            SignalEvent::Offer => SignalingMessage::Offer(serde_json::from_value(payload).map_err(decode_err)?),
            SignalEvent::Answer => SignalingMessage::Answer(serde_json::from_value(payload).map_err(decode_err)?),
            SignalEvent::Candidate => {
                SignalingMessage::Candidate(serde_json::from_value(payload).map_err(decode_err)?)
            }
            SignalEvent::EndChat => SignalingMessage::EndSession,
        })
    }
}

/// Принимающая сторона одного события
#[derive(Debug)]
pub struct Subscription {
    event: SignalEvent,
    rx: mpsc::UnboundedReceiver<SignalingMessage>,
}

impl Subscription {
    pub fn event(&self) -> SignalEvent {
        self.event
    }

    pub async fn recv(&mut self) -> Option<SignalingMessage> {
        self.rx.recv().await
    }
}

type Routes = Arc<Mutex<HashMap<SignalEvent, mpsc::UnboundedSender<SignalingMessage>>>>;

/// Упорядоченная шина at-most-once до единственного собеседника.
///
/// Порядок сохраняется только внутри одного события: у каждого своя очередь.
pub struct SignalingChannel {
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    routes: Routes,
}

impl SignalingChannel {
    pub fn new(
        outbound: mpsc::UnboundedSender<Envelope>,
        inbound: mpsc::UnboundedReceiver<Envelope>,
    ) -> Self {
        Self {
            outbound,
            inbound: Mutex::new(Some(inbound)),
            routes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Два канала, соединённые напрямую, как будто оба в одной комнате relay
    pub fn pair() -> (SignalingChannel, SignalingChannel) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (SignalingChannel::new(a_tx, a_rx), SignalingChannel::new(b_tx, b_rx))
    }

    /// Fire-and-forget. Ошибка только если relay закрыт.
    pub fn send(&self, msg: SignalingMessage) -> Result<(), SignalingError> {
        let envelope = msg.into_envelope()?;
        tracing::trace!(event = %envelope.event, "signaling send");
        self.outbound.send(envelope).map_err(|_| SignalingError::Closed)
    }

    /// Регистрирует единственный обработчик `event` на всё время жизни канала
    pub fn on(&self, event: SignalEvent) -> Result<Subscription, SignalingError> {
        let mut routes = self.routes.lock().unwrap();
        if routes.contains_key(&event) {
            return Err(SignalingError::DuplicateHandler(event.as_str().to_owned()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        routes.insert(event, tx);
        Ok(Subscription { event, rx })
    }

    /// Разводит входящие кадры по очередям, пока relay не закроется. Запускается один раз.
    pub fn spawn_pump(&self) -> Result<JoinHandle<()>, SignalingError> {
        let mut inbound = self
            .inbound
            .lock()
            .unwrap()
            .take()
            .ok_or(SignalingError::Closed)?;
        let routes = self.routes.clone();
        Ok(tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                route(&routes, envelope);
            }
            tracing::debug!("signaling relay closed");
            // отпускаем sender'ы, чтобы подписчики увидели закрытие
            routes.lock().unwrap().clear();
        }))
    }

    pub fn is_pumping(&self) -> bool {
        self.inbound.lock().unwrap().is_none()
    }
}

fn route(routes: &Routes, envelope: Envelope) {
    let msg = match SignalingMessage::from_envelope(envelope) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!("Dropping signaling frame: {e}");
            return;
        }
    };
    let event = msg.event();
    let mut routes = routes.lock().unwrap();
    match routes.get(&event) {
        Some(tx) => {
            if tx.send(msg).is_err() {
                routes.remove(&event);
            }
        }
        None => tracing::debug!("No handler for '{event}', frame dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;

    fn offer() -> SessionDescription {
        serde_json::from_value(json!({"type": "offer", "sdp": "v=0\r\n"})).unwrap()
    }

    #[test]
    fn wire_names_match_relay_events() {
        let names: Vec<_> = SignalEvent::ALL.iter().map(|e| e.as_str()).collect();
        assert_eq!(names, vec!["offer", "answer", "candidate", "end-chat"]);
        assert_eq!(SignalEvent::parse("ice-candidate"), Some(SignalEvent::Candidate));
        assert_eq!(SignalEvent::parse("join"), None);
    }

    #[test]
    fn end_chat_has_no_payload() {
        let envelope = SignalingMessage::EndSession.into_envelope().unwrap();
        assert_eq!(envelope.event, "end-chat");
        assert_eq!(envelope.payload, None);
        assert_eq!(
            serde_json::to_string(&envelope).unwrap(),
            r#"{"event":"end-chat"}"#
        );
    }

    #[test]
    fn decodes_browser_offer() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"event":"offer","payload":{"type":"offer","sdp":"v=0"}}"#).unwrap();
        match SignalingMessage::from_envelope(envelope).unwrap() {
            SignalingMessage::Offer(desc) => {
                assert_eq!(desc.sdp_type, RTCSdpType::Offer);
                assert_eq!(desc.sdp, "v=0");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn offer_without_payload_is_rejected() {
        let err = SignalingMessage::from_envelope(Envelope {
            event: "offer".into(),
            payload: None,
        })
        .unwrap_err();
        assert!(matches!(err, SignalingError::Decode(_)));
    }

    #[test]
    fn second_handler_for_same_event_is_rejected() {
        let (a, _b) = SignalingChannel::pair();
        let _first = a.on(SignalEvent::Offer).unwrap();
        assert_eq!(
            a.on(SignalEvent::Offer).unwrap_err(),
            SignalingError::DuplicateHandler("offer".into())
        );
        assert!(a.on(SignalEvent::Answer).is_ok());
    }

    #[tokio::test]
    async fn pair_delivers_in_order_per_event() {
        let (a, b) = SignalingChannel::pair();
        let mut candidates = b.on(SignalEvent::Candidate).unwrap();
        let mut offers = b.on(SignalEvent::Offer).unwrap();
        b.spawn_pump().unwrap();

        a.send(SignalingMessage::Candidate(IceCandidate::new("c1"))).unwrap();
        a.send(SignalingMessage::Offer(offer())).unwrap();
        a.send(SignalingMessage::Candidate(IceCandidate::new("c2"))).unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            if let Some(SignalingMessage::Candidate(c)) = candidates.recv().await {
                seen.push(c.candidate);
            }
        }
        assert_eq!(seen, vec!["c1", "c2"]);
        assert!(matches!(offers.recv().await, Some(SignalingMessage::Offer(_))));
    }

    #[tokio::test]
    async fn pump_starts_once_and_closes_subscribers() {
        let (a, b) = SignalingChannel::pair();
        let mut end = b.on(SignalEvent::EndChat).unwrap();
        let pump = b.spawn_pump().unwrap();
        assert!(b.is_pumping());
        assert_eq!(b.spawn_pump().unwrap_err(), SignalingError::Closed);

        a.send(SignalingMessage::EndSession).unwrap();
        assert!(matches!(end.recv().await, Some(SignalingMessage::EndSession)));

        drop(a);
        pump.await.unwrap();
        assert!(end.recv().await.is_none());
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out, _out_rx) = mpsc::unbounded_channel();
        let channel = SignalingChannel::new(out, rx);
        let mut candidates = channel.on(SignalEvent::Candidate).unwrap();
        channel.spawn_pump().unwrap();

        tx.send(Envelope {
            event: "candidate".into(),
            payload: Some(json!({"nope": true})),
        })
        .unwrap();
        tx.send(Envelope {
            event: "bogus".into(),
            payload: None,
        })
        .unwrap();
        tx.send(Envelope {
            event: "ice-candidate".into(),
            payload: Some(json!({"candidate": "ok", "sdpMid": "0", "sdpMLineIndex": 0})),
        })
        .unwrap();

        match candidates.recv().await {
            Some(SignalingMessage::Candidate(c)) => assert_eq!(c.candidate, "ok"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn send_after_relay_drop_is_closed() {
        let (out, out_rx) = mpsc::unbounded_channel();
        let (_tx, rx) = mpsc::unbounded_channel();
        let channel = SignalingChannel::new(out, rx);
        drop(out_rx);
        assert_eq!(
            channel.send(SignalingMessage::EndSession).unwrap_err(),
            SignalingError::Closed
        );
    }
}
