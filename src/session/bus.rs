//! 경기 이벤트 버스
//!
//! 경기 방 구독자에게 골/스트리밍 상태를 전파하고, 전역 방에는
//! "경기 종료" 알림을 보낸다. 점수 원본은 외부 경기 기록에 있다.

use super::{fan_out, ConnId, Delivery};
use crate::error::BusError;
use crate::protocol::ServerMessage;
use std::collections::HashSet;

/// 보낸 사람에게도 되돌려 줄지 여부
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// 골 업데이트: 보낸 화면도 확정 스코어를 반영해야 함
    IncludeSender,
    /// 스트리밍 상태: 보낸 쪽은 이미 알고 있음
    ExcludeSender,
}

/// 경기 방 구독자 집합
#[derive(Debug, Default)]
pub struct MatchRoom {
    members: HashSet<ConnId>,
}

impl MatchRoom {
    pub fn join(&mut self, conn: &str) -> usize {
        self.members.insert(conn.to_string());
        self.members.len()
    }

    pub fn leave(&mut self, conn: &str) -> bool {
        self.members.remove(conn)
    }

    pub fn contains(&self, conn: &str) -> bool {
        self.members.contains(conn)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 구독자가 보낸 이벤트를 방 전체에 전파
    pub fn publish(
        &self,
        sender: &str,
        message: &ServerMessage,
        echo: Echo,
    ) -> Result<Vec<Delivery>, BusError> {
        if !self.contains(sender) {
            return Err(BusError::NotAMember);
        }
        Ok(self.notify(Some(sender), message, echo))
    }

    /// 서버 내부에서 발생한 이벤트 전파 (구독 여부 확인 없음)
    pub fn notify(&self, sender: Option<&str>, message: &ServerMessage, echo: Echo) -> Vec<Delivery> {
        let recipients = self
            .members
            .iter()
            .filter(|conn| echo == Echo::IncludeSender || Some(conn.as_str()) != sender);
        fan_out(recipients, message)
    }
}

/// 경기 종료 알림 대상 계산. 종료한 사용자의 모든 연결은 제외한다.
pub fn match_ended<'a>(
    presence: impl IntoIterator<Item = (&'a ConnId, &'a String)>,
    match_id: &str,
    ending_user: &str,
) -> Vec<Delivery> {
    let message = ServerMessage::MatchEnded {
        match_id: match_id.to_string(),
        exclude_user: ending_user.to_string(),
    };
    presence
        .into_iter()
        .filter(|(_, user)| user.as_str() != ending_user)
        .map(|(conn, _)| Delivery::new(conn.clone(), message.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Side;
    use std::collections::HashMap;

    fn goal() -> ServerMessage {
        ServerMessage::GoalUpdate {
            match_id: "m1".into(),
            team: Side::A,
            scorer: "p7".into(),
            minute: 12,
            score: None,
        }
    }

    fn room(members: &[&str]) -> MatchRoom {
        let mut room = MatchRoom::default();
        for m in members {
            room.join(m);
        }
        room
    }

    #[test]
    fn goal_updates_echo_to_sender() {
        let out = room(&["c1", "c2"])
            .publish("c1", &goal(), Echo::IncludeSender)
            .unwrap();
        let mut to: Vec<_> = out.iter().map(|d| d.to.as_str()).collect();
        to.sort();
        assert_eq!(to, vec!["c1", "c2"]);
    }

    #[test]
    fn stream_status_skips_sender() {
        let status = ServerMessage::StreamStatus {
            match_id: "m1".into(),
            streaming: true,
            streamer: None,
        };
        let out = room(&["c1", "c2", "c3"])
            .publish("c2", &status, Echo::ExcludeSender)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.to != "c2"));
    }

    #[test]
    fn outsiders_cannot_publish() {
        assert_eq!(
            room(&["c1"]).publish("c9", &goal(), Echo::IncludeSender),
            Err(BusError::NotAMember)
        );
    }

    #[test]
    fn match_end_excludes_every_connection_of_the_ender() {
        let presence: HashMap<ConnId, String> = [
            ("c1", "alice"),
            ("c2", "alice"),
            ("c3", "bob"),
            ("c4", "carol"),
        ]
        .into_iter()
        .map(|(c, u)| (c.to_string(), u.to_string()))
        .collect();

        let out = match_ended(&presence, "m1", "alice");
        let mut to: Vec<_> = out.iter().map(|d| d.to.as_str()).collect();
        to.sort();
        assert_eq!(to, vec!["c3", "c4"]);
    }
}
