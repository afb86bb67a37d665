//! 주장 드래프트 핸들러

use crate::error::DraftError;
use crate::protocol::Side;
use crate::registry::{SessionKind, SessionStore};
use crate::session::{unix_millis, DraftSession};
use crate::state::AppState;
use std::sync::Arc;

/// 기존 드래프트 세션에 대해 연산 수행. 가드는 반환 전에 놓인다.
fn with_draft<T>(
    state: &AppState,
    match_id: &str,
    f: impl FnOnce(&mut DraftSession) -> Result<T, DraftError>,
) -> Result<T, DraftError> {
    state
        .registry
        .drafts
        .update(match_id, f)
        .ok_or(DraftError::NoSession)?
}

/// 드래프트 참여 (세션이 없으면 생성 후 좌석 요청)
pub fn handle_join_draft(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    user: Option<String>,
    players: Option<Vec<String>>,
) {
    let outcome = state.registry.draft_session(match_id, |session| {
        if let Some(players) = players {
            if session.seed_pool(players) {
                tracing::debug!(
                    match_id = %match_id,
                    pool = session.remaining_pool().map_or(0, |p| p.len()),
                    "Draft pool seeded"
                );
            }
        }
        session.claim(conn_id, user)
    });

    match outcome {
        Ok(claim) => {
            tracing::info!(conn_id = %conn_id, match_id = %match_id, role = ?claim.role, "Captain seat assigned");
            state.deliver(claim.deliveries);
        }
        Err(e) => state.reject(conn_id, "join-draft", &e),
    }
}

/// 기존 세션에 좌석 요청 (세션을 만들지 않음)
pub fn handle_request_captain(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    user: Option<String>,
) {
    match with_draft(state, match_id, |s| s.claim(conn_id, user)) {
        Ok(claim) => {
            tracing::info!(conn_id = %conn_id, match_id = %match_id, role = ?claim.role, "Captain seat assigned");
            state.deliver(claim.deliveries);
        }
        Err(e) => state.reject(conn_id, "request-captain", &e),
    }
}

/// 좌석 반납
pub fn handle_leave_draft(state: &Arc<AppState>, conn_id: &str, match_id: &str) {
    let left = state
        .registry
        .drafts
        .update(match_id, |s| s.vacate(conn_id))
        .flatten();

    match left {
        Some(deliveries) => {
            tracing::info!(conn_id = %conn_id, match_id = %match_id, "Captain left draft");
            state.deliver(deliveries);
            state.registry.remove_if_empty(match_id, SessionKind::Draft);
        }
        None => state.reject(conn_id, "leave-draft", &DraftError::NotACaptain),
    }
}

/// 코인 토스
pub fn handle_toss(state: &Arc<AppState>, conn_id: &str, match_id: &str) {
    let result = with_draft(state, match_id, |s| {
        s.toss(conn_id, &mut rand::thread_rng())
    });
    match result {
        Ok(deliveries) => {
            tracing::info!(match_id = %match_id, "Coin toss resolved");
            state.deliver(deliveries);
        }
        Err(e) => state.reject(conn_id, "request-toss", &e),
    }
}

/// 선수 선택. 풀이 소진되면 확정 팀을 경기 기록에 저장한다.
pub fn handle_select_player(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    player: &str,
    team: Side,
    role: Side,
) {
    let result = with_draft(state, match_id, |s| {
        let deliveries = s.pick(conn_id, player, team, role)?;
        let completed = s
            .remaining_pool()
            .is_some_and(|p| p.is_empty())
            .then(|| (s.team(Side::A).to_vec(), s.team(Side::B).to_vec()));
        Ok((deliveries, completed))
    });

    let (deliveries, completed) = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            state.reject(conn_id, "select-player", &e);
            return;
        }
    };

    tracing::debug!(match_id = %match_id, player = %player, team = ?team, "Player selected");
    state.deliver(deliveries);

    if let Some((team_a, team_b)) = completed {
        tracing::info!(
            match_id = %match_id,
            team_a = team_a.len(),
            team_b = team_b.len(),
            "Draft completed"
        );
        if let Err(e) = state.records.save_teams(match_id, &team_a, &team_b) {
            tracing::warn!(match_id = %match_id, error = %e, "Failed to save drafted teams");
        }
    }
}

/// 주장 간 채팅
pub fn handle_captain_message(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    sender: Option<String>,
    text: &str,
) {
    match with_draft(state, match_id, |s| {
        s.chat(conn_id, sender, text, unix_millis())
    }) {
        Ok(deliveries) => state.deliver(deliveries),
        Err(e) => state.reject(conn_id, "captain-message", &e),
    }
}
