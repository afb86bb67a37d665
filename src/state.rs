//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::protocol::ServerMessage;
use crate::records::{InMemoryMatchRecords, MatchRecords};
use crate::registry::RoomRegistry;
use crate::segments::SegmentStore;
use crate::session::{ConnId, Delivery, MatchId};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 경기별 임시 세션
    pub registry: RoomRegistry,
    /// 연결 세션 (conn_id -> PeerSession)
    pub peers: DashMap<ConnId, PeerSession>,
    /// 영상 조각 저장소
    pub segments: SegmentStore,
    /// 외부 경기 기록
    pub records: Arc<dyn MatchRecords>,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_records(config, Arc::new(InMemoryMatchRecords::new()))
    }

    pub fn with_records(config: Config, records: Arc<dyn MatchRecords>) -> Self {
        let segments = SegmentStore::new(
            config.broadcast.recordings_dir.clone(),
            config.broadcast.segment_extension.clone(),
        );
        Self {
            registry: RoomRegistry::new(),
            peers: DashMap::new(),
            segments,
            records,
            config: Arc::new(config),
        }
    }

    /// 특정 연결에게 메시지 전송. 연결이 없으면 `false`.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        match self.peers.get(conn_id) {
            Some(peer) => peer.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// 세션 연산이 만든 메시지 전송 (엔트리 락을 놓은 뒤 호출)
    pub fn deliver(&self, deliveries: Vec<Delivery>) {
        for Delivery { to, message } in deliveries {
            if !self.send_to(&to, message) {
                tracing::debug!(conn_id = %to, "Dropped delivery to closed connection");
            }
        }
    }

    /// 거부된 요청 처리. 기본은 로그만 남기고 버린다.
    pub fn reject(&self, conn_id: &str, event: &str, reason: &dyn Display) {
        tracing::debug!(conn_id = %conn_id, event = %event, reason = %reason, "Dropped event");
        if self.config.rejection_acks {
            self.send_to(
                conn_id,
                ServerMessage::Rejected {
                    event: event.to_string(),
                    reason: reason.to_string(),
                },
            );
        }
    }
}

/// 연결 세션 정보
pub struct PeerSession {
    pub id: ConnId,
    pub sender: UnboundedSender<ServerMessage>,
    pub connected_at: Instant,
    /// 시청자 폴링 타이머 (match_id -> task)
    pub timers: HashMap<MatchId, JoinHandle<()>>,
}

impl PeerSession {
    pub fn new(id: ConnId, sender: UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            sender,
            connected_at: Instant::now(),
            timers: HashMap::new(),
        }
    }

    /// 같은 경기의 기존 타이머를 교체
    pub fn set_timer(&mut self, match_id: &str, handle: JoinHandle<()>) {
        if let Some(old) = self.timers.insert(match_id.to_string(), handle) {
            old.abort();
        }
    }

    pub fn clear_timer(&mut self, match_id: &str) {
        if let Some(handle) = self.timers.remove(match_id) {
            handle.abort();
        }
    }

    pub fn clear_timers(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
