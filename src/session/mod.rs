//! 경기별 임시 세션 상태
//!
//! 세션 타입은 전송 계층을 모른다. 모든 변경 연산은 상대 연결로 보낼
//! [`Delivery`] 목록을 돌려주고, 실제 전송은 락을 놓은 뒤 호출 측이 한다.

pub mod broadcast;
pub mod bus;
pub mod draft;

pub use broadcast::{BroadcastSession, SegmentTarget};
pub use draft::DraftSession;

use crate::protocol::ServerMessage;
use std::time::{SystemTime, UNIX_EPOCH};

/// 연결 식별자 (전송 계층이 발급)
pub type ConnId = String;

/// 경기 식별자 (외부 경기 기록의 키)
pub type MatchId = String;

/// 한 연결로 보낼 메시지
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnId,
    pub message: ServerMessage,
}

impl Delivery {
    pub fn new(to: impl Into<ConnId>, message: ServerMessage) -> Self {
        Self {
            to: to.into(),
            message,
        }
    }
}

/// 같은 메시지를 여러 연결에 복제
pub fn fan_out<'a>(
    recipients: impl IntoIterator<Item = &'a ConnId>,
    message: &ServerMessage,
) -> Vec<Delivery> {
    recipients
        .into_iter()
        .map(|to| Delivery::new(to.clone(), message.clone()))
        .collect()
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
