//! 클라이언트-서버 메시지 프로토콜 정의

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 드래프트 좌석 / 팀 구분
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// 방송 참여 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    Broadcaster,
    Viewer,
}

/// 드래프트 진행 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftPhase {
    AwaitingCaptains,
    TossPending,
    Picking,
    Completed,
}

/// 선수 평점 (1~5)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub player: String,
    pub rating: u8,
}

/// 현재 스코어
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub team_a: u32,
    pub team_b: u32,
}

/// 주장 간 채팅 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub sender: String,
    pub text: String,
    pub timestamp: u64,
}

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    // Connection
    Heartbeat,

    // Captain Draft
    JoinDraft {
        match_id: String,
        user: Option<String>,
        players: Option<Vec<String>>,
    },
    RequestCaptain {
        match_id: String,
        user: Option<String>,
    },
    LeaveDraft {
        match_id: String,
    },
    RequestToss {
        match_id: String,
    },
    SelectPlayer {
        match_id: String,
        player: String,
        team: Side,
        role: Side,
    },
    CaptainMessage {
        match_id: String,
        sender: Option<String>,
        text: String,
    },

    // Broadcast Relay
    JoinBroadcast {
        match_id: String,
        role: StreamRole,
        user: Option<String>,
    },
    PushSegment {
        match_id: String,
        /// base64 인코딩된 영상 데이터
        data: String,
    },
    RequestSegmentUpdates {
        match_id: String,
    },
    StopBroadcast {
        match_id: String,
    },
    LeaveBroadcast {
        match_id: String,
    },

    // WebRTC Signaling (peer 모드)
    Offer {
        match_id: String,
        sdp: Value,
        target: Option<String>,
    },
    Answer {
        match_id: String,
        sdp: Value,
    },
    IceCandidate {
        match_id: String,
        candidate: Value,
        target: Option<String>,
    },
    RequestIceServers {
        match_id: String,
        /// 아직 유효하면 재발급하지 않음
        current_username: Option<String>,
    },

    // Match Events
    JoinMatchRoom {
        match_id: String,
    },
    LeaveMatchRoom {
        match_id: String,
    },
    EmitGoal {
        match_id: String,
        team: Side,
        scorer: String,
        minute: Option<u32>,
    },
    EmitStreamStatus {
        match_id: String,
        streaming: bool,
        streamer: Option<String>,
    },
    JoinGlobal {
        user: String,
    },
    AnnounceMatchEnded {
        match_id: String,
        user: String,
    },
    SubmitRatings {
        match_id: String,
        rater: String,
        ratings: Vec<PlayerRating>,
    },
}

impl ClientMessage {
    /// 로그와 `rejected` 응답에 쓰는 이벤트 이름
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Heartbeat => "heartbeat",
            ClientMessage::JoinDraft { .. } => "join-draft",
            ClientMessage::RequestCaptain { .. } => "request-captain",
            ClientMessage::LeaveDraft { .. } => "leave-draft",
            ClientMessage::RequestToss { .. } => "request-toss",
            ClientMessage::SelectPlayer { .. } => "select-player",
            ClientMessage::CaptainMessage { .. } => "captain-message",
            ClientMessage::JoinBroadcast { .. } => "join-broadcast",
            ClientMessage::PushSegment { .. } => "push-segment",
            ClientMessage::RequestSegmentUpdates { .. } => "request-segment-updates",
            ClientMessage::StopBroadcast { .. } => "stop-broadcast",
            ClientMessage::LeaveBroadcast { .. } => "leave-broadcast",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::RequestIceServers { .. } => "request-ice-servers",
            ClientMessage::JoinMatchRoom { .. } => "join-match-room",
            ClientMessage::LeaveMatchRoom { .. } => "leave-match-room",
            ClientMessage::EmitGoal { .. } => "emit-goal",
            ClientMessage::EmitStreamStatus { .. } => "emit-stream-status",
            ClientMessage::JoinGlobal { .. } => "join-global",
            ClientMessage::AnnounceMatchEnded { .. } => "announce-match-ended",
            ClientMessage::SubmitRatings { .. } => "submit-ratings",
        }
    }
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    // Connection
    Connected { socket_id: String },
    HeartbeatAck,
    Error { code: String, message: String },
    Rejected { event: String, reason: String },

    // Captain Draft
    CaptainAssigned {
        match_id: String,
        role: Side,
    },
    BothCaptainsReady {
        match_id: String,
    },
    CaptainLeft {
        match_id: String,
        role: Side,
    },
    TossResult {
        match_id: String,
        winner: Side,
    },
    PlayerSelected {
        match_id: String,
        player: String,
        team: Side,
        next_turn: Side,
    },
    SelectionCompleted {
        match_id: String,
        team_a: Vec<String>,
        team_b: Vec<String>,
    },
    DraftSnapshot {
        match_id: String,
        phase: DraftPhase,
        current_turn: Side,
        team_a: Vec<String>,
        team_b: Vec<String>,
        remaining: Option<Vec<String>>,
        chat: Vec<ChatEntry>,
    },
    CaptainMessage {
        match_id: String,
        sender: String,
        text: String,
        timestamp: u64,
    },

    // Broadcast Relay
    ReadyToStream {
        match_id: String,
    },
    StreamAvailable {
        match_id: String,
    },
    StreamStarted {
        match_id: String,
    },
    StreamEnded {
        match_id: String,
    },
    VideoUpdate {
        match_id: String,
        video_url: String,
        sequence: u64,
    },

    // WebRTC Signaling
    Offer {
        match_id: String,
        from: String,
        sdp: Value,
    },
    Answer {
        match_id: String,
        from: String,
        sdp: Value,
    },
    IceCandidate {
        match_id: String,
        from: String,
        candidate: Value,
    },
    IceServers {
        success: bool,
        data: Option<IceConfigData>,
        error: Option<String>,
    },

    // Match Events
    JoinedMatch {
        match_id: String,
        viewers: usize,
    },
    GoalUpdate {
        match_id: String,
        team: Side,
        scorer: String,
        minute: u32,
        score: Option<Score>,
    },
    StreamStatus {
        match_id: String,
        streaming: bool,
        streamer: Option<String>,
    },
    MatchEnded {
        match_id: String,
        exclude_user: String,
    },
    RatingsSaved {
        match_id: String,
        count: usize,
    },
}

/// ICE 설정 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceConfigData {
    pub ice_servers: Vec<IceServer>,
    pub ttl: u64,
    pub timestamp: u64,
    pub match_id: String,
}

/// ICE 서버 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<String>,
}
