//! 생중계 핸들러 (segment-push 모드)
//!
//! 방송자가 올린 영상 조각을 파일로 저장하고 시청자에게 새 URL 을
//! 알린다. 시청자는 `request-segment-updates` 로 주기적인 재전송을 받을
//! 수 있다.

use crate::config::BroadcastMode;
use crate::error::RelayError;
use crate::handlers::events::notify_match_room;
use crate::protocol::{ServerMessage, StreamRole};
use crate::registry::{SessionKind, SessionStore};
use crate::segments::PendingSegment;
use crate::session::{ConnId, MatchId};
use crate::state::AppState;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use std::time::Duration;

/// 방송 참여 (방송자 또는 시청자)
pub fn handle_join_broadcast(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    role: StreamRole,
    user: Option<String>,
) {
    match role {
        StreamRole::Broadcaster => {
            let mode = state.config.broadcast.mode;
            let target = match mode {
                BroadcastMode::Segment => Some(state.segments.allocate(match_id)),
                BroadcastMode::Peer => None,
            };
            let streamer = user.clone();

            let (previous, deliveries) = state.registry.broadcast_session(match_id, |session| {
                let previous = session
                    .broadcaster()
                    .filter(|b| *b != conn_id)
                    .map(str::to_string);
                (previous, session.join_broadcaster(conn_id, user, mode, target))
            });

            if let Some(previous) = previous {
                tracing::info!(
                    match_id = %match_id,
                    previous = %previous,
                    conn_id = %conn_id,
                    "Broadcaster replaced"
                );
            } else {
                tracing::info!(match_id = %match_id, conn_id = %conn_id, "Broadcaster joined");
            }
            state.deliver(deliveries);

            if let Err(e) = state
                .records
                .set_streaming(match_id, true, streamer.as_deref())
            {
                tracing::warn!(match_id = %match_id, error = %e, "Failed to persist streaming flag");
            }
            notify_match_room(
                state,
                match_id,
                ServerMessage::StreamStatus {
                    match_id: match_id.to_string(),
                    streaming: true,
                    streamer,
                },
            );
        }
        StreamRole::Viewer => {
            let deliveries = state
                .registry
                .broadcast_session(match_id, |session| session.join_viewer(conn_id));
            tracing::debug!(match_id = %match_id, conn_id = %conn_id, "Viewer joined");
            state.deliver(deliveries);
        }
    }
}

/// base64 JSON 업로드
pub fn handle_push_segment(state: &Arc<AppState>, conn_id: &str, match_id: &str, data: &str) {
    if state.config.broadcast.mode != BroadcastMode::Segment {
        state.reject(conn_id, "push-segment", &RelayError::WrongMode("peer"));
        return;
    }
    match BASE64.decode(data) {
        Ok(bytes) => push_segment_bytes(state, conn_id, match_id, bytes),
        Err(_) => state.reject(conn_id, "push-segment", &RelayError::BadPayload),
    }
}

/// 바이너리 프레임 업로드. 이 연결이 방송 중인 경기로 보낸다.
pub fn handle_binary_segment(state: &Arc<AppState>, conn_id: &str, bytes: Vec<u8>) {
    if state.config.broadcast.mode != BroadcastMode::Segment {
        state.reject(conn_id, "push-segment", &RelayError::WrongMode("peer"));
        return;
    }
    let match_id = state
        .registry
        .broadcasts
        .find(|session| session.is_broadcaster(conn_id));

    match match_id {
        Some(match_id) => push_segment_bytes(state, conn_id, &match_id, bytes),
        None => state.reject(conn_id, "push-segment", &RelayError::NotBroadcaster),
    }
}

fn push_segment_bytes(state: &Arc<AppState>, conn_id: &str, match_id: &str, bytes: Vec<u8>) {
    let limit = state.config.broadcast.max_segment_bytes;
    if bytes.len() > limit {
        state.reject(
            conn_id,
            "push-segment",
            &RelayError::SegmentTooLarge {
                size: bytes.len(),
                limit,
            },
        );
        return;
    }

    let target = state
        .registry
        .broadcasts
        .update(match_id, |session| session.segment_target_for(conn_id))
        .unwrap_or(Err(RelayError::NoSession));
    let target = match target {
        Ok(target) => target,
        Err(e) => {
            state.reject(conn_id, "push-segment", &e);
            return;
        }
    };

    tracing::debug!(match_id = %match_id, size = bytes.len(), "Segment received");
    let notifier = Arc::clone(state);
    state.segments.submit(
        match_id,
        PendingSegment {
            target,
            data: Arc::new(bytes),
        },
        move |match_id, written| on_segment_written(&notifier, match_id, &written.url),
    );
}

/// 파일 기록이 끝난 조각을 시청자에게 알림
fn on_segment_written(state: &AppState, match_id: &str, url: &str) {
    let deliveries = state
        .registry
        .broadcasts
        .update(match_id, |session| session.record_segment(url))
        .unwrap_or_default();
    state.deliver(deliveries);
}

/// 시청자 폴링 등록. 최신 조각을 즉시 보내고 주기적으로 다시 보낸다.
pub fn handle_request_segment_updates(state: &Arc<AppState>, conn_id: &str, match_id: &str) {
    let membership = state.registry.broadcasts.read(match_id, |session| {
        session
            .viewers()
            .contains(conn_id)
            .then(|| session.latest_update())
    });
    let latest = match membership {
        Some(Some(latest)) => latest,
        Some(None) => {
            state.reject(conn_id, "request-segment-updates", &RelayError::NotViewer);
            return;
        }
        None => {
            tracing::debug!(match_id = %match_id, conn_id = %conn_id, "Broadcast not started yet");
            return;
        }
    };
    if let Some(update) = latest {
        state.send_to(conn_id, update);
    }

    let interval_ms = state.config.broadcast.viewer_poll_interval_ms;
    if interval_ms == 0 {
        return;
    }
    let handle = tokio::spawn(poll_segments(
        Arc::clone(state),
        conn_id.to_string(),
        match_id.to_string(),
        Duration::from_millis(interval_ms),
    ));
    match state.peers.get_mut(conn_id) {
        Some(mut peer) => peer.set_timer(match_id, handle),
        None => handle.abort(),
    }
}

async fn poll_segments(state: Arc<AppState>, conn_id: ConnId, match_id: MatchId, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let update = match state.registry.broadcasts.read(&match_id, |s| s.latest_update()) {
            Some(update) => update,
            None => break,
        };
        if let Some(update) = update {
            if !state.send_to(&conn_id, update) {
                break;
            }
        }
    }
    tracing::debug!(conn_id = %conn_id, match_id = %match_id, "Segment polling stopped");
}

/// 방송 중지 (방송자 전용)
pub fn handle_stop_broadcast(state: &Arc<AppState>, conn_id: &str, match_id: &str) {
    let result = state
        .registry
        .broadcasts
        .update(match_id, |session| {
            let streamer = session.broadcaster_user().map(str::to_string);
            session.stop(conn_id).map(|deliveries| (streamer, deliveries))
        })
        .unwrap_or(Err(RelayError::NoSession));

    match result {
        Ok((streamer, deliveries)) => {
            tracing::info!(match_id = %match_id, conn_id = %conn_id, "Broadcast stopped");
            state.deliver(deliveries);
            on_broadcast_ended(state, match_id, streamer);
            state.registry.remove_if_empty(match_id, SessionKind::Broadcast);
        }
        Err(e) => state.reject(conn_id, "stop-broadcast", &e),
    }
}

/// 방송 세션에서 나가기 (방송자면 방송도 종료)
pub fn handle_leave_broadcast(state: &Arc<AppState>, conn_id: &str, match_id: &str) {
    let departure = state
        .registry
        .broadcasts
        .update(match_id, |session| {
            let streamer = session.broadcaster_user().map(str::to_string);
            session
                .drop_connection(conn_id)
                .map(|departure| (streamer, departure))
        })
        .flatten();

    if let Some(mut peer) = state.peers.get_mut(conn_id) {
        peer.clear_timer(match_id);
    }

    let Some((streamer, departure)) = departure else {
        state.reject(conn_id, "leave-broadcast", &RelayError::NotViewer);
        return;
    };

    tracing::debug!(
        match_id = %match_id,
        conn_id = %conn_id,
        was_broadcaster = departure.was_broadcaster,
        "Left broadcast"
    );
    state.deliver(departure.deliveries);
    if departure.was_broadcaster {
        on_broadcast_ended(state, match_id, streamer);
    }
    state.registry.remove_if_empty(match_id, SessionKind::Broadcast);
}

/// 방송 종료 후속 처리: writer 정리, 기록 갱신, 경기 방 알림
pub(crate) fn on_broadcast_ended(state: &AppState, match_id: &str, streamer: Option<String>) {
    state.segments.release(match_id);
    if let Err(e) = state
        .records
        .set_streaming(match_id, false, streamer.as_deref())
    {
        tracing::warn!(match_id = %match_id, error = %e, "Failed to persist streaming flag");
    }
    notify_match_room(
        state,
        match_id,
        ServerMessage::StreamStatus {
            match_id: match_id.to_string(),
            streaming: false,
            streamer,
        },
    );
}
