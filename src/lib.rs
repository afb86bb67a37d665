//! Squad Live 실시간 경기 조율 서버
//!
//! 주장 드래프트, 경기 생중계 중계, 경기 이벤트 전파를 하나의
//! WebSocket 엔드포인트로 제공한다.

pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod records;
pub mod registry;
pub mod segments;
pub mod server;
pub mod session;
pub mod state;
pub mod turn;
