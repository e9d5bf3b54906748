use crate::peer::endpoint::Endpoint;
use crate::peer::state::PendingCandidates;
use crate::peer::types::IceCandidate;

/// Применяет все отложенные кандидаты после установки remote description.
/// Возвращает количество успешно применённых.
pub async fn apply_pending_candidates(endpoint: &dyn Endpoint, pending: &mut PendingCandidates) -> usize {
    let candidates = pending.drain();
    let mut applied = 0;

    for candidate in candidates {
        tracing::debug!("Applying pending candidate: {}", candidate.candidate);
        match endpoint.add_candidate(candidate).await {
            Ok(()) => applied += 1,
            Err(e) => tracing::debug!("Failed to apply pending candidate: {e}"),
        }
    }
    applied
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateStats {
    pub host: usize,
    pub srflx: usize,
    pub relay: usize,
}

pub fn analyze_candidates(candidates: &[IceCandidate]) -> CandidateStats {
    let mut stats = CandidateStats::default();

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            stats.host += 1;
        } else if candidate.candidate.contains("typ srflx") {
            stats.srflx += 1;
        } else if candidate.candidate.contains("typ relay") {
            stats.relay += 1;
        }
    }

    tracing::debug!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        stats.host,
        stats.srflx,
        stats.relay
    );

    if stats.relay == 0 {
        tracing::warn!("No TURN relay candidates found! Connection through NAT may fail.");
    }
    stats
}
