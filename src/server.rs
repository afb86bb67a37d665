//! HTTP / WebSocket 서버 구성

use crate::handlers;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::segments::RECORDINGS_ROUTE;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// 라우터 설정
pub fn router(state: Arc<AppState>) -> Router {
    let recordings = ServeDir::new(state.segments.dir());
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/matches/:match_id", get(match_handler))
        .nest_service(RECORDINGS_ROUTE, recordings)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// CORS 설정. `*` 가 있으면 모든 출처 허용.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// 유휴 방송 정리 스케줄러 (타임아웃이 0 이면 시작하지 않음)
pub fn spawn_sweeper(state: Arc<AppState>) -> Option<JoinHandle<()>> {
    let broadcast = &state.config.broadcast;
    if broadcast.idle_timeout_secs == 0 {
        return None;
    }
    let period = Duration::from_secs(broadcast.sweep_interval_secs.max(1));

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            handlers::sweep_idle_broadcasts(&state);
        }
    }))
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Squad Live Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let (drafts, broadcasts, match_rooms, global) = state.registry.counts();
    Json(serde_json::json!({
        "status": "ok",
        "server": "squad-live",
        "mode": state.config.broadcast.mode.as_str(),
        "connections": state.peers.len(),
        "drafts": drafts,
        "broadcasts": broadcasts,
        "match_rooms": match_rooms,
        "global": global,
        "timestamp": std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }))
}

async fn match_handler(
    Path(match_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match state.records.fetch(&match_id) {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "match not found" })),
        )
            .into_response(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let max_message = state.config.broadcast.max_segment_bytes.saturating_mul(2);
    ws.max_message_size(max_message)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // 연결 처리
    let conn_id = handlers::handle_connection(&state, tx);

    // 송신 태스크
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to encode message"),
            }
        }
    });

    // 수신 처리
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&state, &conn_id, msg),
                Err(e) => {
                    tracing::warn!(conn_id = %conn_id, error = %e, "Malformed client message");
                    state.send_to(
                        &conn_id,
                        ServerMessage::Error {
                            code: "malformed-event".to_string(),
                            message: e.to_string(),
                        },
                    );
                }
            },
            Ok(Message::Binary(data)) => handlers::handle_binary_segment(&state, &conn_id, data),
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
            _ => {}
        }
    }

    // 연결 해제
    handlers::handle_disconnect(&state, &conn_id);
    send_task.abort();
}

fn handle_client_message(state: &Arc<AppState>, conn_id: &str, msg: ClientMessage) {
    tracing::trace!(conn_id = %conn_id, event = msg.event_name(), "Client event");
    match msg {
        ClientMessage::Heartbeat => handlers::handle_heartbeat(state, conn_id),

        ClientMessage::JoinDraft {
            match_id,
            user,
            players,
        } => handlers::handle_join_draft(state, conn_id, &match_id, user, players),
        ClientMessage::RequestCaptain { match_id, user } => {
            handlers::handle_request_captain(state, conn_id, &match_id, user)
        }
        ClientMessage::LeaveDraft { match_id } => {
            handlers::handle_leave_draft(state, conn_id, &match_id)
        }
        ClientMessage::RequestToss { match_id } => handlers::handle_toss(state, conn_id, &match_id),
        ClientMessage::SelectPlayer {
            match_id,
            player,
            team,
            role,
        } => handlers::handle_select_player(state, conn_id, &match_id, &player, team, role),
        ClientMessage::CaptainMessage {
            match_id,
            sender,
            text,
        } => handlers::handle_captain_message(state, conn_id, &match_id, sender, &text),

        ClientMessage::JoinBroadcast {
            match_id,
            role,
            user,
        } => handlers::handle_join_broadcast(state, conn_id, &match_id, role, user),
        ClientMessage::PushSegment { match_id, data } => {
            handlers::handle_push_segment(state, conn_id, &match_id, &data)
        }
        ClientMessage::RequestSegmentUpdates { match_id } => {
            handlers::handle_request_segment_updates(state, conn_id, &match_id)
        }
        ClientMessage::StopBroadcast { match_id } => {
            handlers::handle_stop_broadcast(state, conn_id, &match_id)
        }
        ClientMessage::LeaveBroadcast { match_id } => {
            handlers::handle_leave_broadcast(state, conn_id, &match_id)
        }

        ClientMessage::Offer {
            match_id,
            sdp,
            target,
        } => handlers::handle_offer(state, conn_id, &match_id, &sdp, target.as_deref()),
        ClientMessage::Answer { match_id, sdp } => {
            handlers::handle_answer(state, conn_id, &match_id, &sdp)
        }
        ClientMessage::IceCandidate {
            match_id,
            candidate,
            target,
        } => handlers::handle_ice_candidate(state, conn_id, &match_id, &candidate, target.as_deref()),
        ClientMessage::RequestIceServers {
            match_id,
            current_username,
        } => handlers::handle_ice_servers_request(
            state,
            conn_id,
            &match_id,
            current_username.as_deref(),
        ),

        ClientMessage::JoinMatchRoom { match_id } => {
            handlers::handle_join_match_room(state, conn_id, &match_id)
        }
        ClientMessage::LeaveMatchRoom { match_id } => {
            handlers::handle_leave_match_room(state, conn_id, &match_id)
        }
        ClientMessage::EmitGoal {
            match_id,
            team,
            scorer,
            minute,
        } => handlers::handle_emit_goal(state, conn_id, &match_id, team, &scorer, minute),
        ClientMessage::EmitStreamStatus {
            match_id,
            streaming,
            streamer,
        } => handlers::handle_emit_stream_status(state, conn_id, &match_id, streaming, streamer),
        ClientMessage::JoinGlobal { user } => handlers::handle_join_global(state, conn_id, &user),
        ClientMessage::AnnounceMatchEnded { match_id, user } => {
            handlers::handle_announce_match_ended(state, conn_id, &match_id, &user)
        }
        ClientMessage::SubmitRatings {
            match_id,
            rater,
            ratings,
        } => handlers::handle_submit_ratings(state, conn_id, &match_id, &rater, &ratings),
    }
}
