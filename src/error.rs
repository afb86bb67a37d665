//! 거부 사유 정의
//!
//! 세션 상태에 맞지 않는 요청은 에러로 돌려주고 호출 측이 조용히 버리거나
//! (`REJECTION_ACKS=true` 일 때) `rejected` 응답으로 알린다.

use thiserror::Error;

/// 드래프트 요청 거부 사유
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("no draft session for match")]
    NoSession,
    #[error("both captain seats are taken")]
    SeatsFull,
    #[error("connection does not hold a captain seat")]
    NotACaptain,
    #[error("claimed role does not match the seat held")]
    RoleMismatch,
    #[error("only captain A may toss")]
    TossReserved,
    #[error("action not allowed while draft is {0}")]
    WrongPhase(&'static str),
    #[error("not this captain's turn")]
    NotYourTurn,
    #[error("player {0} is not in the remaining pool")]
    UnknownPlayer(String),
    #[error("player {0} has already been picked")]
    AlreadyPicked(String),
    #[error("empty chat message")]
    EmptyMessage,
}

/// 방송 중계 요청 거부 사유
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("no broadcast session for match")]
    NoSession,
    #[error("connection is not the broadcaster")]
    NotBroadcaster,
    #[error("connection is not a viewer")]
    NotViewer,
    #[error("no broadcaster bound")]
    NoBroadcaster,
    #[error("event not supported in {0} mode")]
    WrongMode(&'static str),
    #[error("segment payload is not valid base64")]
    BadPayload,
    #[error("segment of {size} bytes exceeds limit of {limit}")]
    SegmentTooLarge { size: usize, limit: usize },
}

/// 경기 이벤트 버스 거부 사유
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("connection has not joined the match room")]
    NotAMember,
}

/// 경기 기록 저장소 에러
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("rating {0} is outside 1..=5")]
    InvalidRating(u8),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}
