//! 경기 생중계 세션 (방송자 1명, 시청자 N명)

use super::{fan_out, ConnId, Delivery, MatchId};
use crate::config::BroadcastMode;
use crate::error::RelayError;
use crate::protocol::ServerMessage;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// 방송자가 올리는 영상 조각이 저장될 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTarget {
    pub path: PathBuf,
    pub url: String,
}

/// 연결 해제/퇴장 결과
#[derive(Debug)]
pub struct Departure {
    pub was_broadcaster: bool,
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug)]
pub struct BroadcastSession {
    match_id: MatchId,
    broadcaster: Option<ConnId>,
    broadcaster_user: Option<String>,
    viewers: HashSet<ConnId>,
    target: Option<SegmentTarget>,
    current_segment: Option<String>,
    sequence: u64,
    last_activity: Instant,
}

impl BroadcastSession {
    pub fn new(match_id: impl Into<MatchId>) -> Self {
        Self {
            match_id: match_id.into(),
            broadcaster: None,
            broadcaster_user: None,
            viewers: HashSet::new(),
            target: None,
            current_segment: None,
            sequence: 0,
            last_activity: Instant::now(),
        }
    }

    pub fn broadcaster(&self) -> Option<&str> {
        self.broadcaster.as_deref()
    }

    pub fn broadcaster_user(&self) -> Option<&str> {
        self.broadcaster_user.as_deref()
    }

    pub fn viewers(&self) -> &HashSet<ConnId> {
        &self.viewers
    }

    pub fn is_broadcaster(&self, conn: &str) -> bool {
        self.broadcaster.as_deref() == Some(conn)
    }

    pub fn current_segment(&self) -> Option<&str> {
        self.current_segment.as_deref()
    }

    /// 방송자도 시청자도 없으면 즉시 삭제 대상
    pub fn is_empty(&self) -> bool {
        self.broadcaster.is_none() && self.viewers.is_empty()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    fn to_viewers(&self, message: ServerMessage) -> Vec<Delivery> {
        fan_out(&self.viewers, &message)
    }

    /// 방송자 등록. 기존 방송자가 있으면 마지막 요청이 이긴다.
    pub fn join_broadcaster(
        &mut self,
        conn: &str,
        user: Option<String>,
        mode: BroadcastMode,
        target: Option<SegmentTarget>,
    ) -> Vec<Delivery> {
        self.viewers.remove(conn);
        self.broadcaster = Some(conn.to_string());
        self.broadcaster_user = user;
        self.target = target;
        self.current_segment = None;
        self.touch();

        let mut deliveries = vec![Delivery::new(
            conn,
            ServerMessage::ReadyToStream {
                match_id: self.match_id.clone(),
            },
        )];
        if mode == BroadcastMode::Peer {
            deliveries.extend(self.to_viewers(ServerMessage::StreamStarted {
                match_id: self.match_id.clone(),
            }));
        }
        deliveries
    }

    /// 시청자 등록. 방송 중이면 바로 `stream-available` 을 보낸다.
    /// 현재 방송자는 자기 방송의 시청자가 될 수 없다.
    pub fn join_viewer(&mut self, conn: &str) -> Vec<Delivery> {
        if self.is_broadcaster(conn) {
            return Vec::new();
        }
        self.viewers.insert(conn.to_string());
        match &self.broadcaster {
            Some(_) => vec![Delivery::new(
                conn,
                ServerMessage::StreamAvailable {
                    match_id: self.match_id.clone(),
                },
            )],
            None => Vec::new(),
        }
    }

    fn end_broadcast(&mut self) -> Vec<Delivery> {
        self.broadcaster = None;
        self.broadcaster_user = None;
        self.target = None;
        self.current_segment = None;
        self.to_viewers(ServerMessage::StreamEnded {
            match_id: self.match_id.clone(),
        })
    }

    /// 방송 중지. 시청자 목록은 유지한다.
    pub fn stop(&mut self, conn: &str) -> Result<Vec<Delivery>, RelayError> {
        if !self.is_broadcaster(conn) {
            return Err(RelayError::NotBroadcaster);
        }
        Ok(self.end_broadcast())
    }

    /// 비활성 방송 강제 종료
    pub fn expire(&mut self) -> Vec<Delivery> {
        if self.broadcaster.is_none() {
            return Vec::new();
        }
        self.end_broadcast()
    }

    /// 연결을 세션에서 제거. 관여하지 않은 연결이면 `None`.
    pub fn drop_connection(&mut self, conn: &str) -> Option<Departure> {
        let was_broadcaster = self.is_broadcaster(conn);
        let deliveries = if was_broadcaster {
            self.end_broadcast()
        } else {
            Vec::new()
        };
        let was_viewer = self.viewers.remove(conn);

        if !was_broadcaster && !was_viewer {
            return None;
        }
        Some(Departure {
            was_broadcaster,
            deliveries,
        })
    }

    /// 영상 조각 업로드 권한 확인 후 저장 위치 반환
    pub fn segment_target_for(&mut self, conn: &str) -> Result<SegmentTarget, RelayError> {
        if !self.is_broadcaster(conn) {
            return Err(RelayError::NotBroadcaster);
        }
        self.touch();
        self.target
            .clone()
            .ok_or(RelayError::WrongMode("peer"))
    }

    /// 저장이 끝난 조각을 시청자에게 알림. 그 사이 방송자가 바뀌었으면 무시.
    pub fn record_segment(&mut self, url: &str) -> Vec<Delivery> {
        if !self.target.as_ref().is_some_and(|t| t.url == url) {
            return Vec::new();
        }
        self.sequence += 1;
        self.current_segment = Some(url.to_string());
        self.to_viewers(ServerMessage::VideoUpdate {
            match_id: self.match_id.clone(),
            video_url: url.to_string(),
            sequence: self.sequence,
        })
    }

    /// 가장 최근 조각 알림 (폴링 응답용)
    pub fn latest_update(&self) -> Option<ServerMessage> {
        self.current_segment
            .as_ref()
            .map(|url| ServerMessage::VideoUpdate {
                match_id: self.match_id.clone(),
                video_url: url.clone(),
                sequence: self.sequence,
            })
    }

    fn viewer_targets(&self, target: Option<&str>) -> Result<Vec<ConnId>, RelayError> {
        match target {
            Some(viewer) if self.viewers.contains(viewer) => Ok(vec![viewer.to_string()]),
            Some(_) => Err(RelayError::NotViewer),
            None => Ok(self.viewers.iter().cloned().collect()),
        }
    }

    /// 방송자의 offer 를 시청자(전체 또는 지정)에게 중계
    pub fn relay_offer(
        &mut self,
        from: &str,
        sdp: &Value,
        target: Option<&str>,
    ) -> Result<Vec<Delivery>, RelayError> {
        if !self.is_broadcaster(from) {
            return Err(RelayError::NotBroadcaster);
        }
        self.touch();
        let message = ServerMessage::Offer {
            match_id: self.match_id.clone(),
            from: from.to_string(),
            sdp: sdp.clone(),
        };
        Ok(fan_out(&self.viewer_targets(target)?, &message))
    }

    /// 시청자의 answer 를 방송자에게 중계
    pub fn relay_answer(&mut self, from: &str, sdp: &Value) -> Result<Vec<Delivery>, RelayError> {
        if !self.viewers.contains(from) {
            return Err(RelayError::NotViewer);
        }
        let broadcaster = self.broadcaster.clone().ok_or(RelayError::NoBroadcaster)?;
        self.touch();
        Ok(vec![Delivery::new(
            broadcaster,
            ServerMessage::Answer {
                match_id: self.match_id.clone(),
                from: from.to_string(),
                sdp: sdp.clone(),
            },
        )])
    }

    /// ICE 후보 중계. 방송자 → 시청자, 시청자 → 방송자.
    pub fn relay_ice(
        &mut self,
        from: &str,
        candidate: &Value,
        target: Option<&str>,
    ) -> Result<Vec<Delivery>, RelayError> {
        let message = ServerMessage::IceCandidate {
            match_id: self.match_id.clone(),
            from: from.to_string(),
            candidate: candidate.clone(),
        };

        let recipients = if self.is_broadcaster(from) {
            self.viewer_targets(target)?
        } else if self.viewers.contains(from) {
            vec![self.broadcaster.clone().ok_or(RelayError::NoBroadcaster)?]
        } else {
            return Err(RelayError::NotViewer);
        };
        self.touch();
        Ok(fan_out(&recipients, &message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target(url: &str) -> Option<SegmentTarget> {
        Some(SegmentTarget {
            path: PathBuf::from(format!("/tmp{url}")),
            url: url.to_string(),
        })
    }

    fn count_ended(deliveries: &[Delivery], conn: &str) -> usize {
        deliveries
            .iter()
            .filter(|d| d.to == conn && matches!(d.message, ServerMessage::StreamEnded { .. }))
            .count()
    }

    #[test]
    fn viewer_learns_about_running_stream() {
        let mut session = BroadcastSession::new("m1");
        assert!(session.join_viewer("v1").is_empty());

        session.join_broadcaster("b1", None, BroadcastMode::Segment, target("/r/m1-1.webm"));
        let out = session.join_viewer("v2");
        assert!(matches!(out[0].message, ServerMessage::StreamAvailable { .. }));
        assert_eq!(out[0].to, "v2");
    }

    #[test]
    fn broadcaster_cannot_watch_own_stream() {
        let mut session = BroadcastSession::new("m1");
        session.join_broadcaster("b1", None, BroadcastMode::Segment, target("/r/m1-1.webm"));

        assert!(session.join_viewer("b1").is_empty());
        assert!(session.viewers().is_empty());

        let ended = session.stop("b1").unwrap();
        assert_eq!(count_ended(&ended, "b1"), 0);
        assert!(session.is_empty());
    }

    #[test]
    fn second_broadcaster_supersedes_first() {
        let mut session = BroadcastSession::new("m1");
        session.join_broadcaster("b1", None, BroadcastMode::Segment, target("/r/a.webm"));
        session.join_broadcaster("b2", None, BroadcastMode::Segment, target("/r/b.webm"));
        assert_eq!(session.broadcaster(), Some("b2"));

        assert_eq!(session.stop("b1"), Err(RelayError::NotBroadcaster));
        assert!(session.drop_connection("b1").is_none());
        assert_eq!(session.broadcaster(), Some("b2"));
    }

    #[test]
    fn peer_mode_announces_stream_to_waiting_viewers() {
        let mut session = BroadcastSession::new("m1");
        session.join_viewer("v1");
        let out = session.join_broadcaster("b1", None, BroadcastMode::Peer, None);
        assert!(out.iter().any(|d| d.to == "v1"
            && matches!(d.message, ServerMessage::StreamStarted { .. })));
    }

    #[test]
    fn segment_updates_reach_every_viewer() {
        let mut session = BroadcastSession::new("m1");
        session.join_broadcaster("b1", None, BroadcastMode::Segment, target("/r/m1.webm"));
        session.join_viewer("v1");
        session.join_viewer("v2");

        let first = session.record_segment("/r/m1.webm");
        let second = session.record_segment("/r/m1.webm");
        for viewer in ["v1", "v2"] {
            assert_eq!(first.iter().filter(|d| d.to == viewer).count(), 1);
            assert_eq!(second.iter().filter(|d| d.to == viewer).count(), 1);
        }
        assert!(matches!(
            session.latest_update(),
            Some(ServerMessage::VideoUpdate { sequence: 2, .. })
        ));
    }

    #[test]
    fn stale_segment_write_is_ignored() {
        let mut session = BroadcastSession::new("m1");
        session.join_broadcaster("b1", None, BroadcastMode::Segment, target("/r/old.webm"));
        session.join_viewer("v1");
        session.join_broadcaster("b2", None, BroadcastMode::Segment, target("/r/new.webm"));
        assert!(session.record_segment("/r/old.webm").is_empty());
        assert!(session.latest_update().is_none());
    }

    #[test]
    fn stream_ended_is_sent_exactly_once() {
        let mut session = BroadcastSession::new("m1");
        session.join_broadcaster("b1", None, BroadcastMode::Segment, target("/r/m1.webm"));
        session.join_viewer("v1");

        let stopped = session.stop("b1").unwrap();
        assert_eq!(count_ended(&stopped, "v1"), 1);
        assert!(session.drop_connection("b1").is_none());
        assert_eq!(session.viewers().len(), 1);
        assert!(!session.is_empty());
    }

    #[test]
    fn broadcaster_disconnect_notifies_and_session_empties() {
        let mut session = BroadcastSession::new("m1");
        session.join_broadcaster("b1", None, BroadcastMode::Segment, target("/r/m1.webm"));
        session.join_viewer("v1");

        let gone = session.drop_connection("b1").unwrap();
        assert!(gone.was_broadcaster);
        assert_eq!(count_ended(&gone.deliveries, "v1"), 1);

        let viewer_gone = session.drop_connection("v1").unwrap();
        assert!(!viewer_gone.was_broadcaster);
        assert!(session.is_empty());
        assert!(session.drop_connection("v1").is_none());
    }

    #[test]
    fn signaling_routes_between_roles() {
        let mut session = BroadcastSession::new("m1");
        session.join_broadcaster("b1", None, BroadcastMode::Peer, None);
        session.join_viewer("v1");
        session.join_viewer("v2");
        let sdp = json!({"type": "offer", "sdp": "v=0"});

        let offers = session.relay_offer("b1", &sdp, None).unwrap();
        assert_eq!(offers.len(), 2);
        let targeted = session.relay_offer("b1", &sdp, Some("v2")).unwrap();
        assert_eq!(targeted.len(), 1);
        assert_eq!(targeted[0].to, "v2");
        assert_eq!(session.relay_offer("v1", &sdp, None), Err(RelayError::NotBroadcaster));

        let answer = session.relay_answer("v1", &json!({"type": "answer"})).unwrap();
        assert_eq!(answer[0].to, "b1");
        assert!(matches!(&answer[0].message, ServerMessage::Answer { from, .. } if from == "v1"));

        let up = session.relay_ice("v2", &json!({"candidate": "c"}), None).unwrap();
        assert_eq!(up[0].to, "b1");
        let down = session.relay_ice("b1", &json!({"candidate": "c"}), Some("v1")).unwrap();
        assert_eq!(down.len(), 1);
        assert_eq!(
            session.relay_ice("x", &json!({}), None),
            Err(RelayError::NotViewer)
        );
    }

    #[test]
    fn peer_mode_has_no_segment_target() {
        let mut session = BroadcastSession::new("m1");
        session.join_broadcaster("b1", None, BroadcastMode::Peer, None);
        assert_eq!(session.segment_target_for("b1"), Err(RelayError::WrongMode("peer")));
        assert_eq!(session.segment_target_for("v1"), Err(RelayError::NotBroadcaster));
    }
}
