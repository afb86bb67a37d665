//! WebRTC 시그널링 핸들러 (peer 모드)
//!
//! 방송자와 시청자 사이의 SDP/ICE 메시지를 중계하고 TURN 자격증명을 발급한다.

use crate::config::BroadcastMode;
use crate::error::RelayError;
use crate::protocol::ServerMessage;
use crate::registry::SessionStore;
use crate::session::{BroadcastSession, Delivery};
use crate::state::AppState;
use crate::turn;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// peer 모드 방송 세션에 대해 중계 연산 수행
fn relay(
    state: &AppState,
    conn_id: &str,
    match_id: &str,
    event: &str,
    f: impl FnOnce(&mut BroadcastSession) -> Result<Vec<Delivery>, RelayError>,
) -> bool {
    if state.config.broadcast.mode != BroadcastMode::Peer {
        state.reject(conn_id, event, &RelayError::WrongMode("segment"));
        return false;
    }
    let result = state
        .registry
        .broadcasts
        .update(match_id, f)
        .unwrap_or(Err(RelayError::NoSession));
    match result {
        Ok(deliveries) => {
            state.deliver(deliveries);
            true
        }
        Err(e) => {
            state.reject(conn_id, event, &e);
            false
        }
    }
}

/// Offer 처리 (방송자 → 시청자)
pub fn handle_offer(
    state: &Arc<AppState>,
    from_conn: &str,
    match_id: &str,
    sdp: &Value,
    target: Option<&str>,
) {
    if relay(state, from_conn, match_id, "offer", |s| {
        s.relay_offer(from_conn, sdp, target)
    }) {
        tracing::debug!(
            from = %from_conn,
            match_id = %match_id,
            target = ?target,
            "Relayed offer"
        );
    }
}

/// Answer 처리 (시청자 → 방송자)
pub fn handle_answer(state: &Arc<AppState>, from_conn: &str, match_id: &str, sdp: &Value) {
    if relay(state, from_conn, match_id, "answer", |s| {
        s.relay_answer(from_conn, sdp)
    }) {
        tracing::debug!(from = %from_conn, match_id = %match_id, "Relayed answer");
    }
}

/// ICE Candidate 처리
pub fn handle_ice_candidate(
    state: &Arc<AppState>,
    from_conn: &str,
    match_id: &str,
    candidate: &Value,
    target: Option<&str>,
) {
    if relay(state, from_conn, match_id, "ice-candidate", |s| {
        s.relay_ice(from_conn, candidate, target)
    }) {
        tracing::debug!(
            from = %from_conn,
            match_id = %match_id,
            target = ?target,
            "Relayed ICE candidate"
        );
    }
}

/// ICE 서버 요청 처리. 현재 자격증명이 아직 유효하면 재발급하지 않는다.
pub fn handle_ice_servers_request(
    state: &Arc<AppState>,
    conn_id: &str,
    match_id: &str,
    current_username: Option<&str>,
) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    if current_username.is_some_and(|username| turn::credentials_valid(username, now)) {
        state.send_to(
            conn_id,
            ServerMessage::IceServers {
                success: true,
                data: None,
                error: Some("Credentials still valid".to_string()),
            },
        );
        return;
    }

    let reply = match turn::ice_config(&state.config.turn, match_id, now, rand::random()) {
        Ok(data) => {
            tracing::info!(match_id = %match_id, ttl = data.ttl, "ICE servers sent");
            ServerMessage::IceServers {
                success: true,
                data: Some(data),
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(match_id = %match_id, error = %e, "ICE servers unavailable");
            ServerMessage::IceServers {
                success: false,
                data: None,
                error: Some(e.to_string()),
            }
        }
    };
    state.send_to(conn_id, reply);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handlers::broadcast::handle_join_broadcast;
    use crate::handlers::testing::{connect, drain};
    use crate::protocol::StreamRole;
    use serde_json::json;

    fn peer_state() -> Arc<AppState> {
        let mut config = Config::with_recordings_dir(std::env::temp_dir());
        config.rejection_acks = true;
        config.broadcast.mode = BroadcastMode::Peer;
        Arc::new(AppState::new(config))
    }

    #[tokio::test]
    async fn offer_answer_and_ice_are_brokered() {
        let state = peer_state();
        let (b1, mut rxb) = connect(&state);
        let (v1, mut rxv) = connect(&state);
        handle_join_broadcast(&state, &v1, "m1", StreamRole::Viewer, None);
        handle_join_broadcast(&state, &b1, "m1", StreamRole::Broadcaster, None);
        assert!(drain(&mut rxv).contains(&ServerMessage::StreamStarted {
            match_id: "m1".into()
        }));
        drain(&mut rxb);

        handle_offer(&state, &b1, "m1", &json!({"sdp": "o"}), Some(&v1));
        assert_eq!(
            drain(&mut rxv),
            vec![ServerMessage::Offer {
                match_id: "m1".into(),
                from: b1.clone(),
                sdp: json!({"sdp": "o"}),
            }]
        );

        handle_answer(&state, &v1, "m1", &json!({"sdp": "a"}));
        handle_ice_candidate(&state, &v1, "m1", &json!({"candidate": "c"}), None);
        let to_broadcaster = drain(&mut rxb);
        assert_eq!(to_broadcaster.len(), 2);
        assert!(matches!(to_broadcaster[0], ServerMessage::Answer { .. }));
        assert!(matches!(to_broadcaster[1], ServerMessage::IceCandidate { .. }));
    }

    #[tokio::test]
    async fn signaling_is_rejected_in_segment_mode() {
        let mut config = Config::with_recordings_dir(std::env::temp_dir());
        config.rejection_acks = true;
        let state = Arc::new(AppState::new(config));
        let (b1, mut rxb) = connect(&state);
        handle_join_broadcast(&state, &b1, "m1", StreamRole::Broadcaster, None);
        drain(&mut rxb);

        handle_offer(&state, &b1, "m1", &json!({}), None);
        assert_eq!(
            drain(&mut rxb),
            vec![ServerMessage::Rejected {
                event: "offer".into(),
                reason: RelayError::WrongMode("segment").to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn unconfigured_turn_reports_failure() {
        let state = peer_state();
        let (c1, mut rx1) = connect(&state);
        handle_ice_servers_request(&state, &c1, "m1", None);
        assert!(matches!(
            drain(&mut rx1).as_slice(),
            [ServerMessage::IceServers { success: false, .. }]
        ));
    }
}
