use crate::peer::types::IceCandidate;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;

/// ========== SESSION STATE ==========

/// Жизненный цикл одной сессии. `Ended` поглощающее состояние.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AcquiringMedia,
    Negotiating,
    Connected,
    Ended,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == SessionState::Ended
    }

    /// Сигнальные сообщения обрабатываются только при живом endpoint
    pub fn accepts_signaling(self) -> bool {
        matches!(self, SessionState::Negotiating | SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::AcquiringMedia => "acquiring-media",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Состояние транспорта с точки зрения grace period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionHealth {
    #[default]
    Stable,
    Degraded { since: DateTime<Utc> },
    Failed,
}

impl ConnectionHealth {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ConnectionHealth::Stable)
    }
}

/// Сколько ранних кандидатов держим, пока нет remote description
pub const MAX_PENDING_CANDIDATES: usize = 64;

/// Кандидаты, полученные до установки remote description
#[derive(Debug, Default)]
pub struct PendingCandidates {
    queue: VecDeque<IceCandidate>,
}

impl PendingCandidates {
    /// При переполнении вытесняет самого старого кандидата и возвращает его
    pub fn push(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        let evicted = if self.queue.len() >= MAX_PENDING_CANDIDATES {
            self.queue.pop_front()
        } else {
            None
        };
        self.queue.push_back(candidate);
        evicted
    }

    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
