//! 경기 기록 저장소 (외부 협력자)
//!
//! 코어는 경기 기록을 소유하지 않는다. 스트리밍 여부, 골, 종료, 평점,
//! 확정된 팀 명단을 이 인터페이스로 넘기고, 기본 구현은 메모리에 둔다.

use crate::error::RecordError;
use crate::protocol::{PlayerRating, Score, Side};
use crate::session::unix_millis;
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeamRecord {
    pub name: String,
    pub players: Vec<String>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalEntry {
    pub team: Side,
    pub scorer: String,
    pub minute: u32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatingEntry {
    pub player: String,
    pub rating: u8,
    pub rated_by: String,
    pub rated_at: u64,
}

/// 경기 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub id: String,
    pub team_a: TeamRecord,
    pub team_b: TeamRecord,
    pub goals: Vec<GoalEntry>,
    pub is_streaming: bool,
    pub streaming_user: Option<String>,
    pub ended: bool,
    pub ratings: Vec<RatingEntry>,
}

impl MatchRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            team_a: TeamRecord {
                name: "Team Alpha".to_string(),
                ..TeamRecord::default()
            },
            team_b: TeamRecord {
                name: "Team Beta".to_string(),
                ..TeamRecord::default()
            },
            goals: Vec::new(),
            is_streaming: false,
            streaming_user: None,
            ended: false,
            ratings: Vec::new(),
        }
    }

    pub fn score(&self) -> Score {
        Score {
            team_a: self.team_a.score,
            team_b: self.team_b.score,
        }
    }
}

/// 경기 기록 읽기/갱신 인터페이스
pub trait MatchRecords: Send + Sync {
    fn fetch(&self, match_id: &str) -> Option<MatchRecord>;

    fn set_streaming(
        &self,
        match_id: &str,
        streaming: bool,
        streamer: Option<&str>,
    ) -> Result<(), RecordError>;

    /// 골 기록 후 갱신된 스코어 반환
    fn record_goal(
        &self,
        match_id: &str,
        team: Side,
        scorer: &str,
        minute: u32,
    ) -> Result<Score, RecordError>;

    fn mark_ended(&self, match_id: &str) -> Result<(), RecordError>;

    /// 평점 일괄 저장. 저장된 개수 반환.
    fn save_ratings(
        &self,
        match_id: &str,
        rater: &str,
        ratings: &[PlayerRating],
    ) -> Result<usize, RecordError>;

    fn save_teams(
        &self,
        match_id: &str,
        team_a: &[String],
        team_b: &[String],
    ) -> Result<(), RecordError>;
}

/// 메모리 기반 경기 기록 (단일 프로세스용)
#[derive(Default)]
pub struct InMemoryMatchRecords {
    records: DashMap<String, MatchRecord>,
}

impl InMemoryMatchRecords {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<T>(&self, match_id: &str, f: impl FnOnce(&mut MatchRecord) -> T) -> T {
        let mut record = self
            .records
            .entry(match_id.to_string())
            .or_insert_with(|| MatchRecord::new(match_id));
        f(record.value_mut())
    }
}

impl MatchRecords for InMemoryMatchRecords {
    fn fetch(&self, match_id: &str) -> Option<MatchRecord> {
        self.records.get(match_id).map(|r| r.value().clone())
    }

    fn set_streaming(
        &self,
        match_id: &str,
        streaming: bool,
        streamer: Option<&str>,
    ) -> Result<(), RecordError> {
        self.update(match_id, |record| {
            record.is_streaming = streaming;
            record.streaming_user = if streaming {
                streamer.map(str::to_string)
            } else {
                None
            };
        });
        Ok(())
    }

    fn record_goal(
        &self,
        match_id: &str,
        team: Side,
        scorer: &str,
        minute: u32,
    ) -> Result<Score, RecordError> {
        Ok(self.update(match_id, |record| {
            record.goals.push(GoalEntry {
                team,
                scorer: scorer.to_string(),
                minute,
                timestamp: unix_millis(),
            });
            match team {
                Side::A => record.team_a.score += 1,
                Side::B => record.team_b.score += 1,
            }
            record.score()
        }))
    }

    fn mark_ended(&self, match_id: &str) -> Result<(), RecordError> {
        self.update(match_id, |record| record.ended = true);
        Ok(())
    }

    fn save_ratings(
        &self,
        match_id: &str,
        rater: &str,
        ratings: &[PlayerRating],
    ) -> Result<usize, RecordError> {
        if let Some(bad) = ratings.iter().find(|r| !(1..=5).contains(&r.rating)) {
            return Err(RecordError::InvalidRating(bad.rating));
        }
        let rated_at = unix_millis();
        self.update(match_id, |record| {
            record.ratings.extend(ratings.iter().map(|r| RatingEntry {
                player: r.player.clone(),
                rating: r.rating,
                rated_by: rater.to_string(),
                rated_at,
            }));
        });
        Ok(ratings.len())
    }

    fn save_teams(
        &self,
        match_id: &str,
        team_a: &[String],
        team_b: &[String],
    ) -> Result<(), RecordError> {
        self.update(match_id, |record| {
            record.team_a.players = team_a.to_vec();
            record.team_b.players = team_b.to_vec();
        });
        Ok(())
    }
}
