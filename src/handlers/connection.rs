//! 연결 핸들러
//!
//! 연결이 끊기면 모든 레지스트리를 훑어 그 연결이 차지하던 주장 좌석,
//! 방송자 자리, 시청자/구독 멤버십, 전역 알림 등록, 폴링 타이머를
//! 정리한다. 같은 연결에 대해 여러 번 호출해도 안전하다.

use crate::handlers::broadcast::on_broadcast_ended;
use crate::protocol::ServerMessage;
use crate::registry::{SessionKind, SessionStore};
use crate::session::{ConnId, Delivery, MatchId};
use crate::state::{AppState, PeerSession};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// 새 연결 처리
pub fn handle_connection(state: &Arc<AppState>, sender: UnboundedSender<ServerMessage>) -> ConnId {
    let conn_id = Uuid::new_v4().to_string();

    let _ = sender.send(ServerMessage::Connected {
        socket_id: conn_id.clone(),
    });
    state
        .peers
        .insert(conn_id.clone(), PeerSession::new(conn_id.clone(), sender));

    tracing::info!(conn_id = %conn_id, "New connection established");
    conn_id
}

/// 연결 해제 처리
pub fn handle_disconnect(state: &Arc<AppState>, conn_id: &str) {
    if let Some((_, mut peer)) = state.peers.remove(conn_id) {
        peer.clear_timers();
        tracing::info!(
            conn_id = %conn_id,
            connected_for_ms = peer.connected_at.elapsed().as_millis() as u64,
            "Connection closed"
        );
    }
    release_connection(state, conn_id);
}

/// 모든 레지스트리에서 연결을 제거하고 빈 세션을 삭제
pub fn release_connection(state: &Arc<AppState>, conn_id: &str) {
    let mut deliveries: Vec<Delivery> = Vec::new();

    // 1. 주장 좌석
    let mut vacant_drafts: Vec<MatchId> = Vec::new();
    state.registry.drafts.update_all(|match_id, session| {
        if let Some(notices) = session.vacate(conn_id) {
            tracing::info!(conn_id = %conn_id, match_id = %match_id, "Captain seat released");
            deliveries.extend(notices);
            if session.is_vacant() {
                vacant_drafts.push(match_id.to_string());
            }
        }
    });

    // 2. 방송자 / 시청자
    let mut touched_broadcasts: Vec<MatchId> = Vec::new();
    let mut ended: Vec<(MatchId, Option<String>)> = Vec::new();
    state.registry.broadcasts.update_all(|match_id, session| {
        let streamer = session.broadcaster_user().map(str::to_string);
        if let Some(departure) = session.drop_connection(conn_id) {
            if departure.was_broadcaster {
                tracing::info!(conn_id = %conn_id, match_id = %match_id, "Broadcaster disconnected");
                ended.push((match_id.to_string(), streamer));
            }
            deliveries.extend(departure.deliveries);
            touched_broadcasts.push(match_id.to_string());
        }
    });

    // 3. 경기 이벤트 구독
    let mut left_rooms: Vec<MatchId> = Vec::new();
    state.registry.match_rooms.update_all(|match_id, room| {
        if room.leave(conn_id) {
            left_rooms.push(match_id.to_string());
        }
    });

    // 전역 알림 방
    state.registry.global.remove(conn_id);

    // 가드를 모두 놓은 뒤 정리와 전송
    for match_id in &vacant_drafts {
        state.registry.remove_if_empty(match_id, SessionKind::Draft);
    }
    for match_id in &left_rooms {
        state.registry.remove_if_empty(match_id, SessionKind::MatchRoom);
    }
    state.deliver(deliveries);
    for (match_id, streamer) in ended {
        on_broadcast_ended(state, &match_id, streamer);
    }
    for match_id in &touched_broadcasts {
        state.registry.remove_if_empty(match_id, SessionKind::Broadcast);
    }
}

/// Heartbeat 처리. 방송자의 heartbeat 는 방송 활동으로 친다.
pub fn handle_heartbeat(state: &AppState, conn_id: &str) {
    state.registry.broadcasts.update_all(|_, session| {
        if session.is_broadcaster(conn_id) {
            session.touch();
        }
    });
    state.send_to(conn_id, ServerMessage::HeartbeatAck);
}

/// 오래 조용한 방송 정리 (`BROADCAST_IDLE_TIMEOUT_SECS` 가 0 이면 비활성)
pub fn sweep_idle_broadcasts(state: &Arc<AppState>) {
    let timeout_secs = state.config.broadcast.idle_timeout_secs;
    if timeout_secs == 0 {
        return;
    }
    let timeout = Duration::from_secs(timeout_secs);
    let now = Instant::now();

    let mut deliveries = Vec::new();
    let mut expired: Vec<(MatchId, Option<String>)> = Vec::new();
    state.registry.broadcasts.update_all(|match_id, session| {
        let idle = session.idle_for(now);
        if session.broadcaster().is_some() && idle > timeout {
            let streamer = session.broadcaster_user().map(str::to_string);
            tracing::info!(
                match_id = %match_id,
                idle_secs = idle.as_secs(),
                "Expired idle broadcast"
            );
            deliveries.extend(session.expire());
            expired.push((match_id.to_string(), streamer));
        }
    });

    state.deliver(deliveries);
    for (match_id, streamer) in &expired {
        on_broadcast_ended(state, match_id, streamer.clone());
        state
            .registry
            .remove_if_empty(match_id, SessionKind::Broadcast);
    }

    if !expired.is_empty() {
        tracing::info!(expired = expired.len(), "Idle sweep completed");
    }
}
