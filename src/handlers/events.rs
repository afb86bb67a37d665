//! 경기 이벤트 핸들러 (경기 방 구독, 골/스트리밍 상태, 전역 알림, 평점)

use crate::error::BusError;
use crate::protocol::{PlayerRating, ServerMessage, Side};
use crate::registry::{SessionKind, SessionStore};
use crate::session::bus::{self, Echo};
use crate::state::AppState;
use std::sync::Arc;

/// 서버에서 발생한 이벤트를 경기 방 전체에 전달
pub(crate) fn notify_match_room(state: &AppState, match_id: &str, message: ServerMessage) {
    let deliveries = state
        .registry
        .match_rooms
        .read(match_id, |room| room.notify(None, &message, Echo::IncludeSender))
        .unwrap_or_default();
    state.deliver(deliveries);
}

fn publish(
    state: &AppState,
    conn_id: &str,
    match_id: &str,
    message: ServerMessage,
    echo: Echo,
) -> Result<(), BusError> {
    let deliveries = state
        .registry
        .match_rooms
        .read(match_id, |room| room.publish(conn_id, &message, echo))
        .ok_or(BusError::NotAMember)??;
    state.deliver(deliveries);
    Ok(())
}

fn is_member(state: &AppState, conn_id: &str, match_id: &str) -> bool {
    state
        .registry
        .match_rooms
        .read(match_id, |room| room.contains(conn_id))
        .unwrap_or(false)
}

/// 경기 방 구독
pub fn handle_join_match_room(state: &Arc<AppState>, conn_id: &str, match_id: &str) {
    let viewers = state.registry.match_room(match_id, |room| room.join(conn_id));
    tracing::debug!(conn_id = %conn_id, match_id = %match_id, viewers, "Joined match room");
    state.send_to(
        conn_id,
        ServerMessage::JoinedMatch {
            match_id: match_id.to_string(),
            viewers,
        },
    );
}

/// 경기 방 구독 해제
pub fn handle_leave_match_room(state: &Arc<AppState>, conn_id: &str, match_id: &str) {
    let left = state
        .registry
        .match_rooms
        .update(match_id, |room| room.leave(conn_id))
        .unwrap_or(false);
    if left {
        tracing::debug!(conn_id = %conn_id, match_id = %match_id, "Left match room");
        state.registry.remove_if_empty(match_id, SessionKind::MatchRoom);
    } else {
        state.reject(conn_id, "leave-match-room", &BusError::NotAMember);
    }
}

/// 골 기록 후 스코어와 함께 방 전체(보낸 사람 포함)에 전파
pub fn handle_emit_goal(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    team: Side,
    scorer: &str,
    minute: Option<u32>,
) {
    if !is_member(state, conn_id, match_id) {
        state.reject(conn_id, "emit-goal", &BusError::NotAMember);
        return;
    }

    let minute = minute.unwrap_or_default();
    let score = match state.records.record_goal(match_id, team, scorer, minute) {
        Ok(score) => Some(score),
        Err(e) => {
            tracing::warn!(match_id = %match_id, error = %e, "Failed to record goal");
            None
        }
    };
    tracing::info!(match_id = %match_id, team = ?team, scorer = %scorer, minute, "Goal");

    let message = ServerMessage::GoalUpdate {
        match_id: match_id.to_string(),
        team,
        scorer: scorer.to_string(),
        minute,
        score,
    };
    if let Err(e) = publish(state, conn_id, match_id, message, Echo::IncludeSender) {
        state.reject(conn_id, "emit-goal", &e);
    }
}

/// 스트리밍 상태 전파 (보낸 사람 제외)
pub fn handle_emit_stream_status(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    streaming: bool,
    streamer: Option<String>,
) {
    let message = ServerMessage::StreamStatus {
        match_id: match_id.to_string(),
        streaming,
        streamer,
    };
    if let Err(e) = publish(state, conn_id, match_id, message, Echo::ExcludeSender) {
        state.reject(conn_id, "emit-stream-status", &e);
    }
}

/// 전역 알림 방 참여
pub fn handle_join_global(state: &Arc<AppState>, conn_id: &str, user: &str) {
    state
        .registry
        .global
        .insert(conn_id.to_string(), user.to_string());
    tracing::debug!(conn_id = %conn_id, user = %user, "Joined global room");
}

/// 경기 종료 알림. 종료한 사용자의 연결은 모두 제외한다.
pub fn handle_announce_match_ended(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    user: &str,
) {
    if let Err(e) = state.records.mark_ended(match_id) {
        tracing::warn!(match_id = %match_id, error = %e, "Failed to mark match ended");
    }

    let deliveries = {
        let presence: Vec<(String, String)> = state
            .registry
            .global
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        bus::match_ended(presence.iter().map(|(c, u)| (c, u)), match_id, user)
    };

    tracing::info!(
        conn_id = %conn_id,
        match_id = %match_id,
        recipients = deliveries.len(),
        "Match ended"
    );
    state.deliver(deliveries);
}

/// 경기 후 평점 저장
pub fn handle_submit_ratings(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    rater: &str,
    ratings: &[PlayerRating],
) {
    match state.records.save_ratings(match_id, rater, ratings) {
        Ok(count) => {
            tracing::info!(match_id = %match_id, rater = %rater, count, "Ratings saved");
            state.send_to(
                conn_id,
                ServerMessage::RatingsSaved {
                    match_id: match_id.to_string(),
                    count,
                },
            );
        }
        Err(e) => state.reject(conn_id, "submit-ratings", &e),
    }
}
