//! 주장 드래프트 상태 머신
//!
//! `AwaitingCaptains → TossPending → Picking → Completed`
//!
//! 두 주장 좌석(A/B)은 먼저 요청한 연결이 차지한다. 코인 토스는 A 주장만
//! 할 수 있고, 이긴 쪽부터 번갈아 선수를 고른다. 잘못된 요청은 상태를
//! 바꾸지 않고 [`DraftError`] 로 돌려준다.

use super::{fan_out, ConnId, Delivery, MatchId};
use crate::error::DraftError;
use crate::protocol::{ChatEntry, DraftPhase, ServerMessage, Side};
use rand::Rng;

/// 좌석에 앉은 주장
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captain {
    pub conn: ConnId,
    pub user: Option<String>,
}

/// 좌석 요청 결과
#[derive(Debug)]
pub struct Claim {
    pub role: Side,
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug)]
pub struct DraftSession {
    match_id: MatchId,
    captain_a: Option<Captain>,
    captain_b: Option<Captain>,
    phase: DraftPhase,
    current_turn: Side,
    team_a: Vec<String>,
    team_b: Vec<String>,
    /// 서버가 추적하는 남은 선수 목록 (클라이언트가 알려준 경우에만)
    pool: Option<Vec<String>>,
    chat_log: Vec<ChatEntry>,
}

fn phase_name(phase: DraftPhase) -> &'static str {
    match phase {
        DraftPhase::AwaitingCaptains => "awaiting captains",
        DraftPhase::TossPending => "awaiting toss",
        DraftPhase::Picking => "picking",
        DraftPhase::Completed => "completed",
    }
}

impl DraftSession {
    pub fn new(match_id: impl Into<MatchId>) -> Self {
        Self {
            match_id: match_id.into(),
            captain_a: None,
            captain_b: None,
            phase: DraftPhase::AwaitingCaptains,
            current_turn: Side::A,
            team_a: Vec::new(),
            team_b: Vec::new(),
            pool: None,
            chat_log: Vec::new(),
        }
    }

    pub fn phase(&self) -> DraftPhase {
        self.phase
    }

    pub fn current_turn(&self) -> Side {
        self.current_turn
    }

    pub fn team(&self, side: Side) -> &[String] {
        match side {
            Side::A => &self.team_a,
            Side::B => &self.team_b,
        }
    }

    pub fn remaining_pool(&self) -> Option<&[String]> {
        self.pool.as_deref()
    }

    pub fn captain(&self, side: Side) -> Option<&Captain> {
        match side {
            Side::A => self.captain_a.as_ref(),
            Side::B => self.captain_b.as_ref(),
        }
    }

    fn seat_mut(&mut self, side: Side) -> &mut Option<Captain> {
        match side {
            Side::A => &mut self.captain_a,
            Side::B => &mut self.captain_b,
        }
    }

    /// 연결이 앉아 있는 좌석
    pub fn role_of(&self, conn: &str) -> Option<Side> {
        if self.captain_a.as_ref().is_some_and(|c| c.conn == conn) {
            Some(Side::A)
        } else if self.captain_b.as_ref().is_some_and(|c| c.conn == conn) {
            Some(Side::B)
        } else {
            None
        }
    }

    /// 두 좌석이 모두 비었는지 (레지스트리 정리 조건)
    pub fn is_vacant(&self) -> bool {
        self.captain_a.is_none() && self.captain_b.is_none()
    }

    pub fn captain_conns(&self) -> Vec<ConnId> {
        self.captain_a
            .iter()
            .chain(self.captain_b.iter())
            .map(|c| c.conn.clone())
            .collect()
    }

    fn to_captains(&self, message: ServerMessage) -> Vec<Delivery> {
        fan_out(&self.captain_conns(), &message)
    }

    /// 현재 드래프트 상태 (중간에 합류한 주장에게 전송)
    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::DraftSnapshot {
            match_id: self.match_id.clone(),
            phase: self.phase,
            current_turn: self.current_turn,
            team_a: self.team_a.clone(),
            team_b: self.team_b.clone(),
            remaining: self.pool.clone(),
            chat: self.chat_log.clone(),
        }
    }

    /// 주장 좌석 요청. 빈 좌석 중 A 를 먼저 채운다.
    pub fn claim(&mut self, conn: &str, user: Option<String>) -> Result<Claim, DraftError> {
        if let Some(role) = self.role_of(conn) {
            return Ok(Claim {
                role,
                deliveries: vec![Delivery::new(conn, self.assigned(role))],
            });
        }

        let role = if self.captain_a.is_none() {
            Side::A
        } else if self.captain_b.is_none() {
            Side::B
        } else {
            return Err(DraftError::SeatsFull);
        };

        *self.seat_mut(role) = Some(Captain {
            conn: conn.to_string(),
            user,
        });

        let mut deliveries = vec![Delivery::new(conn, self.assigned(role))];
        if self.captain_a.is_some() && self.captain_b.is_some() {
            match self.phase {
                DraftPhase::AwaitingCaptains => {
                    self.phase = DraftPhase::TossPending;
                    deliveries.extend(self.to_captains(ServerMessage::BothCaptainsReady {
                        match_id: self.match_id.clone(),
                    }));
                }
                _ => deliveries.push(Delivery::new(conn, self.snapshot())),
            }
        }

        Ok(Claim { role, deliveries })
    }

    fn assigned(&self, role: Side) -> ServerMessage {
        ServerMessage::CaptainAssigned {
            match_id: self.match_id.clone(),
            role,
        }
    }

    /// 선수 목록을 서버에서 추적하도록 설정. 첫 픽 이전에 한 번만 적용된다.
    pub fn seed_pool(&mut self, players: Vec<String>) -> bool {
        if self.pool.is_some() || !self.team_a.is_empty() || !self.team_b.is_empty() {
            return false;
        }
        let mut pool: Vec<String> = Vec::with_capacity(players.len());
        for player in players {
            if !pool.contains(&player) {
                pool.push(player);
            }
        }
        if pool.is_empty() {
            return false;
        }
        self.pool = Some(pool);
        true
    }

    /// 코인 토스 (A 주장 전용)
    pub fn toss<R: Rng>(
        &mut self,
        conn: &str,
        rng: &mut R,
    ) -> Result<Vec<Delivery>, DraftError> {
        match self.role_of(conn) {
            None => return Err(DraftError::NotACaptain),
            Some(Side::B) => return Err(DraftError::TossReserved),
            Some(Side::A) => {}
        }
        if self.phase != DraftPhase::TossPending {
            return Err(DraftError::WrongPhase(phase_name(self.phase)));
        }

        let winner = if rng.gen_bool(0.5) { Side::A } else { Side::B };
        self.current_turn = winner;
        self.phase = DraftPhase::Picking;

        Ok(self.to_captains(ServerMessage::TossResult {
            match_id: self.match_id.clone(),
            winner,
        }))
    }

    /// 선수 선택. 차례가 아니면 아무것도 바꾸지 않는다.
    pub fn pick(
        &mut self,
        conn: &str,
        player: &str,
        team: Side,
        claimed: Side,
    ) -> Result<Vec<Delivery>, DraftError> {
        let held = self.role_of(conn).ok_or(DraftError::NotACaptain)?;
        if held != claimed {
            return Err(DraftError::RoleMismatch);
        }
        if self.phase != DraftPhase::Picking {
            return Err(DraftError::WrongPhase(phase_name(self.phase)));
        }
        if claimed != self.current_turn {
            return Err(DraftError::NotYourTurn);
        }
        if self.team_a.iter().chain(self.team_b.iter()).any(|p| p == player) {
            return Err(DraftError::AlreadyPicked(player.to_string()));
        }
        if let Some(pool) = self.pool.as_mut() {
            let idx = pool
                .iter()
                .position(|p| p == player)
                .ok_or_else(|| DraftError::UnknownPlayer(player.to_string()))?;
            pool.remove(idx);
        }

        match team {
            Side::A => self.team_a.push(player.to_string()),
            Side::B => self.team_b.push(player.to_string()),
        }
        self.current_turn = claimed.other();

        let mut deliveries = self.to_captains(ServerMessage::PlayerSelected {
            match_id: self.match_id.clone(),
            player: player.to_string(),
            team,
            next_turn: self.current_turn,
        });

        if self.pool.as_ref().is_some_and(|p| p.is_empty()) {
            self.phase = DraftPhase::Completed;
            deliveries.extend(self.to_captains(ServerMessage::SelectionCompleted {
                match_id: self.match_id.clone(),
                team_a: self.team_a.clone(),
                team_b: self.team_b.clone(),
            }));
        }

        Ok(deliveries)
    }

    /// 주장 채팅. 상대 주장에게만 전달하고 기록에 남긴다.
    pub fn chat(
        &mut self,
        conn: &str,
        sender: Option<String>,
        text: &str,
        timestamp: u64,
    ) -> Result<Vec<Delivery>, DraftError> {
        let role = self.role_of(conn).ok_or(DraftError::NotACaptain)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DraftError::EmptyMessage);
        }

        let sender = sender
            .or_else(|| self.captain(role).and_then(|c| c.user.clone()))
            .unwrap_or_else(|| conn.to_string());

        self.chat_log.push(ChatEntry {
            sender: sender.clone(),
            text: text.to_string(),
            timestamp,
        });

        let message = ServerMessage::CaptainMessage {
            match_id: self.match_id.clone(),
            sender,
            text: text.to_string(),
            timestamp,
        };
        Ok(self
            .captain(role.other())
            .map(|other| vec![Delivery::new(other.conn.clone(), message)])
            .unwrap_or_default())
    }

    /// 연결이 앉은 좌석을 비운다. 주장이 아니면 `None`.
    pub fn vacate(&mut self, conn: &str) -> Option<Vec<Delivery>> {
        let role = self.role_of(conn)?;
        *self.seat_mut(role) = None;
        if self.phase == DraftPhase::TossPending {
            self.phase = DraftPhase::AwaitingCaptains;
        }

        let left = ServerMessage::CaptainLeft {
            match_id: self.match_id.clone(),
            role,
        };
        Some(
            self.captain(role.other())
                .map(|other| vec![Delivery::new(other.conn.clone(), left)])
                .unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn heads() -> StepRng {
        StepRng::new(0, 0)
    }

    fn tails() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    fn ready_session() -> DraftSession {
        let mut session = DraftSession::new("m1");
        session.claim("c1", Some("alice@club".into())).unwrap();
        session.claim("c2", Some("bob@club".into())).unwrap();
        session
    }

    fn recipients(deliveries: &[Delivery]) -> Vec<&str> {
        deliveries.iter().map(|d| d.to.as_str()).collect()
    }

    #[test]
    fn draft_walkthrough() {
        let mut session = DraftSession::new("m1");

        let first = session.claim("c1", None).unwrap();
        assert_eq!(first.role, Side::A);
        assert_eq!(session.phase(), DraftPhase::AwaitingCaptains);

        let second = session.claim("c2", None).unwrap();
        assert_eq!(second.role, Side::B);
        assert_eq!(session.phase(), DraftPhase::TossPending);
        let ready: Vec<_> = second
            .deliveries
            .iter()
            .filter(|d| matches!(d.message, ServerMessage::BothCaptainsReady { .. }))
            .map(|d| d.to.as_str())
            .collect();
        assert_eq!(ready, vec!["c1", "c2"]);

        let toss = session.toss("c1", &mut heads()).unwrap();
        assert_eq!(recipients(&toss), vec!["c1", "c2"]);
        assert!(toss.iter().all(|d| matches!(
            d.message,
            ServerMessage::TossResult { winner: Side::A, .. }
        )));
        assert_eq!(session.phase(), DraftPhase::Picking);
        assert_eq!(session.current_turn(), Side::A);

        session.pick("c1", "p7", Side::A, Side::A).unwrap();
        assert_eq!(session.team(Side::A), ["p7".to_string()]);
        assert_eq!(session.current_turn(), Side::B);

        let picked = session.pick("c2", "p3", Side::B, Side::B).unwrap();
        assert!(picked.iter().all(|d| matches!(
            d.message,
            ServerMessage::PlayerSelected { next_turn: Side::A, .. }
        )));
        assert_eq!(session.team(Side::B), ["p3".to_string()]);
        assert_eq!(session.current_turn(), Side::A);

        assert_eq!(session.claim("c3", None).unwrap_err(), DraftError::SeatsFull);
    }

    #[test]
    fn tails_hands_first_pick_to_b() {
        let mut session = ready_session();
        session.toss("c1", &mut tails()).unwrap();
        assert_eq!(session.current_turn(), Side::B);
    }

    #[test]
    fn reclaim_keeps_existing_seat() {
        let mut session = DraftSession::new("m1");
        session.claim("c1", None).unwrap();
        let again = session.claim("c1", None).unwrap();
        assert_eq!(again.role, Side::A);
        assert!(session.captain(Side::B).is_none());
        assert_eq!(session.phase(), DraftPhase::AwaitingCaptains);
    }

    #[test]
    fn only_captain_a_tosses_once() {
        let mut session = ready_session();
        assert_eq!(session.toss("c2", &mut heads()), Err(DraftError::TossReserved));
        assert_eq!(session.toss("c9", &mut heads()), Err(DraftError::NotACaptain));
        assert_eq!(session.phase(), DraftPhase::TossPending);

        session.toss("c1", &mut heads()).unwrap();
        assert!(matches!(
            session.toss("c1", &mut tails()),
            Err(DraftError::WrongPhase(_))
        ));
        assert_eq!(session.current_turn(), Side::A);
    }

    #[test]
    fn out_of_turn_pick_changes_nothing() {
        let mut session = ready_session();
        session.toss("c1", &mut heads()).unwrap();

        assert_eq!(
            session.pick("c2", "p1", Side::B, Side::B),
            Err(DraftError::NotYourTurn)
        );
        assert_eq!(
            session.pick("c2", "p1", Side::A, Side::A),
            Err(DraftError::RoleMismatch)
        );
        assert_eq!(session.current_turn(), Side::A);
        assert!(session.team(Side::A).is_empty());
        assert!(session.team(Side::B).is_empty());
    }

    #[test]
    fn pick_before_toss_is_dropped() {
        let mut session = ready_session();
        assert!(matches!(
            session.pick("c1", "p1", Side::A, Side::A),
            Err(DraftError::WrongPhase(_))
        ));
    }

    #[test]
    fn duplicate_pick_is_rejected_without_pool() {
        let mut session = ready_session();
        session.toss("c1", &mut heads()).unwrap();
        session.pick("c1", "p1", Side::A, Side::A).unwrap();
        assert_eq!(
            session.pick("c2", "p1", Side::B, Side::B),
            Err(DraftError::AlreadyPicked("p1".into()))
        );
        assert_eq!(session.current_turn(), Side::B);
    }

    #[test]
    fn tracked_pool_completes_the_draft() {
        let mut session = ready_session();
        assert!(session.seed_pool(vec!["p1".into(), "p2".into(), "p1".into()]));
        assert!(!session.seed_pool(vec!["p9".into()]));
        session.toss("c1", &mut heads()).unwrap();

        assert_eq!(
            session.pick("c1", "p9", Side::A, Side::A),
            Err(DraftError::UnknownPlayer("p9".into()))
        );
        session.pick("c1", "p1", Side::A, Side::A).unwrap();
        let last = session.pick("c2", "p2", Side::B, Side::B).unwrap();

        assert_eq!(session.phase(), DraftPhase::Completed);
        assert_eq!(session.remaining_pool(), Some(&[][..]));
        let completed = last
            .iter()
            .filter(|d| matches!(d.message, ServerMessage::SelectionCompleted { .. }))
            .count();
        assert_eq!(completed, 2);
        assert!(matches!(
            session.pick("c1", "p3", Side::A, Side::A),
            Err(DraftError::WrongPhase(_))
        ));
    }

    #[test]
    fn chat_reaches_only_the_other_captain() {
        let mut session = ready_session();
        let out = session.chat("c1", None, "  you pick first  ", 42).unwrap();
        assert_eq!(recipients(&out), vec!["c2"]);
        match &out[0].message {
            ServerMessage::CaptainMessage { sender, text, .. } => {
                assert_eq!(sender, "alice@club");
                assert_eq!(text, "you pick first");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(session.chat("c3", None, "hi", 43), Err(DraftError::NotACaptain));
        assert_eq!(session.chat("c2", None, "   ", 44), Err(DraftError::EmptyMessage));
    }

    #[test]
    fn vacate_is_idempotent_and_reopens_toss() {
        let mut session = ready_session();
        let notices = session.vacate("c2").unwrap();
        assert_eq!(recipients(&notices), vec!["c1"]);
        assert_eq!(session.phase(), DraftPhase::AwaitingCaptains);
        assert!(session.vacate("c2").is_none());
        assert!(!session.is_vacant());

        session.vacate("c1").unwrap();
        assert!(session.is_vacant());
    }

    #[test]
    fn replacement_captain_gets_snapshot_mid_draft() {
        let mut session = ready_session();
        session.toss("c1", &mut heads()).unwrap();
        session.pick("c1", "p1", Side::A, Side::A).unwrap();
        session.vacate("c2");
        assert_eq!(session.phase(), DraftPhase::Picking);

        let claim = session.claim("c4", None).unwrap();
        assert_eq!(claim.role, Side::B);
        assert!(claim.deliveries.iter().any(|d| d.to == "c4"
            && matches!(d.message, ServerMessage::DraftSnapshot { current_turn: Side::B, .. })));
        session.pick("c4", "p2", Side::B, Side::B).unwrap();
    }

    #[test]
    fn snapshot_carries_chat_history() {
        let mut session = ready_session();
        session.chat("c1", None, "you pick first", 42).unwrap();
        session.toss("c1", &mut heads()).unwrap();
        session.vacate("c2");

        let claim = session.claim("c4", None).unwrap();
        let chat = claim.deliveries.iter().find_map(|d| match &d.message {
            ServerMessage::DraftSnapshot { chat, .. } if d.to == "c4" => Some(chat.clone()),
            _ => None,
        });
        assert_eq!(
            chat,
            Some(vec![ChatEntry {
                sender: "alice@club".into(),
                text: "you pick first".into(),
                timestamp: 42,
            }])
        );
    }
}
