//! 경기 ID 별 임시 세션 레지스트리
//!
//! 세션은 처음 요청될 때 만들어지고, 비어 있는 세션은 연결 정리 경로에서
//! [`RoomRegistry::remove_if_empty`] 로 즉시 제거된다.
//!
//! 세션 저장소는 [`SessionStore`] 트레잇 뒤에 있다. 기본 구현은 프로세스
//! 내 [`MemoryStore`] 이며, 모든 접근은 클로저 안에서만 이루어지므로 호출자가
//! 엔트리 가드를 들고 다른 맵이나 `.await` 를 넘나들 수 없다.

use crate::session::bus::MatchRoom;
use crate::session::{BroadcastSession, ConnId, DraftSession, MatchId};
use dashmap::DashMap;

/// 세션 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Draft,
    Broadcast,
    MatchRoom,
}

/// match id 를 키로 하는 세션 저장소
pub trait SessionStore<S>: Default + Send + Sync {
    /// 세션이 없으면 `create` 로 만든 뒤 `f` 실행 (원자적 get-or-create)
    fn upsert<T>(
        &self,
        match_id: &str,
        create: impl FnOnce() -> S,
        f: impl FnOnce(&mut S) -> T,
    ) -> T;

    /// 기존 세션에만 `f` 실행. 세션이 없으면 `None`.
    fn update<T>(&self, match_id: &str, f: impl FnOnce(&mut S) -> T) -> Option<T>;

    fn read<T>(&self, match_id: &str, f: impl FnOnce(&S) -> T) -> Option<T>;

    /// 모든 세션 순회 (연결 정리, 유휴 정리용)
    fn update_all(&self, f: impl FnMut(&str, &mut S));

    /// `pred` 를 만족하는 세션 하나의 match id
    fn find(&self, pred: impl FnMut(&S) -> bool) -> Option<MatchId>;

    /// `pred` 가 참이면 삭제. 삭제했으면 `true`.
    fn remove_if(&self, match_id: &str, pred: impl FnOnce(&S) -> bool) -> bool;

    fn contains(&self, match_id: &str) -> bool {
        self.read(match_id, |_| ()).is_some()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `DashMap` 기반 프로세스 내 저장소
pub struct MemoryStore<S> {
    sessions: DashMap<MatchId, S>,
}

impl<S> Default for MemoryStore<S> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl<S: Send + Sync> SessionStore<S> for MemoryStore<S> {
    fn upsert<T>(
        &self,
        match_id: &str,
        create: impl FnOnce() -> S,
        f: impl FnOnce(&mut S) -> T,
    ) -> T {
        let mut entry = self
            .sessions
            .entry(match_id.to_string())
            .or_insert_with(create);
        f(entry.value_mut())
    }

    fn update<T>(&self, match_id: &str, f: impl FnOnce(&mut S) -> T) -> Option<T> {
        self.sessions
            .get_mut(match_id)
            .map(|mut entry| f(entry.value_mut()))
    }

    fn read<T>(&self, match_id: &str, f: impl FnOnce(&S) -> T) -> Option<T> {
        self.sessions.get(match_id).map(|entry| f(entry.value()))
    }

    fn update_all(&self, mut f: impl FnMut(&str, &mut S)) {
        for mut entry in self.sessions.iter_mut() {
            let (match_id, session) = entry.pair_mut();
            f(match_id, session);
        }
    }

    fn find(&self, mut pred: impl FnMut(&S) -> bool) -> Option<MatchId> {
        self.sessions
            .iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| entry.key().clone())
    }

    fn remove_if(&self, match_id: &str, pred: impl FnOnce(&S) -> bool) -> bool {
        self.sessions
            .remove_if(match_id, |_, session| pred(session))
            .is_some()
    }

    fn contains(&self, match_id: &str) -> bool {
        self.sessions.contains_key(match_id)
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[derive(Default)]
pub struct RoomRegistry<
    D = MemoryStore<DraftSession>,
    B = MemoryStore<BroadcastSession>,
    M = MemoryStore<MatchRoom>,
> {
    /// 주장 드래프트
    pub drafts: D,
    /// 생중계
    pub broadcasts: B,
    /// 경기 이벤트 구독
    pub match_rooms: M,
    /// 전역 알림 방 (conn_id -> user identity)
    pub global: DashMap<ConnId, String>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D, B, M> RoomRegistry<D, B, M>
where
    D: SessionStore<DraftSession>,
    B: SessionStore<BroadcastSession>,
    M: SessionStore<MatchRoom>,
{
    /// 드래프트 세션 가져오기 또는 생성 (두 좌석 비어 있음, 차례 = A)
    pub fn draft_session<T>(&self, match_id: &str, f: impl FnOnce(&mut DraftSession) -> T) -> T {
        self.drafts.upsert(
            match_id,
            || {
                tracing::info!(match_id = %match_id, "Draft session created");
                DraftSession::new(match_id)
            },
            f,
        )
    }

    /// 방송 세션 가져오기 또는 생성
    pub fn broadcast_session<T>(
        &self,
        match_id: &str,
        f: impl FnOnce(&mut BroadcastSession) -> T,
    ) -> T {
        self.broadcasts.upsert(
            match_id,
            || {
                tracing::info!(match_id = %match_id, "Broadcast session created");
                BroadcastSession::new(match_id)
            },
            f,
        )
    }

    /// 경기 이벤트 방 가져오기 또는 생성
    pub fn match_room<T>(&self, match_id: &str, f: impl FnOnce(&mut MatchRoom) -> T) -> T {
        self.match_rooms.upsert(match_id, MatchRoom::default, f)
    }

    /// 비어 있는 세션이면 삭제. 삭제했으면 `true`.
    pub fn remove_if_empty(&self, match_id: &str, kind: SessionKind) -> bool {
        let removed = match kind {
            SessionKind::Draft => self.drafts.remove_if(match_id, DraftSession::is_vacant),
            SessionKind::Broadcast => self
                .broadcasts
                .remove_if(match_id, BroadcastSession::is_empty),
            SessionKind::MatchRoom => self.match_rooms.remove_if(match_id, MatchRoom::is_empty),
        };
        if removed {
            tracing::info!(match_id = %match_id, kind = ?kind, "Session removed");
        }
        removed
    }

    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.drafts.len(),
            self.broadcasts.len(),
            self.match_rooms.len(),
            self.global.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DraftPhase, Side};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn get_or_create_returns_the_same_session() {
        let registry = RoomRegistry::new();
        registry
            .draft_session("m1", |s| s.claim("c1", None))
            .unwrap();

        let role = registry.draft_session("m1", |s| s.role_of("c1"));
        assert_eq!(role, Some(Side::A));
        assert_eq!(registry.drafts.len(), 1);
    }

    #[test]
    fn fresh_draft_session_starts_empty() {
        let registry = RoomRegistry::new();
        registry.draft_session("m1", |session| {
            assert!(session.is_vacant());
            assert_eq!(session.phase(), DraftPhase::AwaitingCaptains);
            assert_eq!(session.current_turn(), Side::A);
        });
    }

    #[test]
    fn update_does_not_create_sessions() {
        let registry = RoomRegistry::new();
        assert!(registry.drafts.update("m1", |s| s.vacate("c1")).is_none());
        assert!(registry.broadcasts.read("m1", |s| s.is_empty()).is_none());
        assert!(!registry.match_rooms.contains("m1"));
        assert_eq!(registry.counts(), (0, 0, 0, 0));
    }

    #[test]
    fn remove_if_empty_keeps_occupied_sessions() {
        let registry = RoomRegistry::new();
        registry
            .draft_session("m1", |s| s.claim("c1", None))
            .unwrap();
        registry.broadcast_session("m1", |s| s.join_viewer("v1"));
        registry.match_room("m1", |r| r.join("c2"));

        assert!(!registry.remove_if_empty("m1", SessionKind::Draft));
        assert!(!registry.remove_if_empty("m1", SessionKind::Broadcast));
        assert!(!registry.remove_if_empty("m1", SessionKind::MatchRoom));

        registry.draft_session("m1", |s| s.vacate("c1"));
        registry.broadcast_session("m1", |s| s.drop_connection("v1"));
        registry.match_room("m1", |r| r.leave("c2"));

        assert!(registry.remove_if_empty("m1", SessionKind::Draft));
        assert!(registry.remove_if_empty("m1", SessionKind::Broadcast));
        assert!(registry.remove_if_empty("m1", SessionKind::MatchRoom));
        assert_eq!(registry.counts(), (0, 0, 0, 0));
        assert!(!registry.remove_if_empty("m1", SessionKind::Draft));
    }

    /// 접근 횟수를 세는 저장소. 레지스트리가 트레잇만 통해 접근하는지 확인한다.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore<DraftSession>,
        creates: AtomicUsize,
    }

    impl SessionStore<DraftSession> for CountingStore {
        fn upsert<T>(
            &self,
            match_id: &str,
            create: impl FnOnce() -> DraftSession,
            f: impl FnOnce(&mut DraftSession) -> T,
        ) -> T {
            self.inner.upsert(
                match_id,
                || {
                    self.creates.fetch_add(1, Ordering::SeqCst);
                    create()
                },
                f,
            )
        }

        fn update<T>(&self, match_id: &str, f: impl FnOnce(&mut DraftSession) -> T) -> Option<T> {
            self.inner.update(match_id, f)
        }

        fn read<T>(&self, match_id: &str, f: impl FnOnce(&DraftSession) -> T) -> Option<T> {
            self.inner.read(match_id, f)
        }

        fn update_all(&self, f: impl FnMut(&str, &mut DraftSession)) {
            self.inner.update_all(f)
        }

        fn find(&self, pred: impl FnMut(&DraftSession) -> bool) -> Option<MatchId> {
            self.inner.find(pred)
        }

        fn remove_if(&self, match_id: &str, pred: impl FnOnce(&DraftSession) -> bool) -> bool {
            self.inner.remove_if(match_id, pred)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn registry_works_over_a_custom_store() {
        let registry: RoomRegistry<CountingStore> = RoomRegistry::default();
        registry
            .draft_session("m1", |s| s.claim("c1", None))
            .unwrap();
        registry
            .draft_session("m1", |s| s.claim("c2", None))
            .unwrap();
        assert_eq!(registry.drafts.creates.load(Ordering::SeqCst), 1);

        registry.draft_session("m1", |s| s.vacate("c1"));
        assert!(!registry.remove_if_empty("m1", SessionKind::Draft));
        registry.draft_session("m1", |s| s.vacate("c2"));
        assert!(registry.remove_if_empty("m1", SessionKind::Draft));
        assert!(!registry.drafts.contains("m1"));
    }
}
