//! 핸들러 모듈

pub mod broadcast;
pub mod connection;
pub mod draft;
pub mod events;
pub mod signaling;

pub use broadcast::*;
pub use connection::*;
pub use draft::*;
pub use events::*;
pub use signaling::*;

#[cfg(test)]
pub(crate) mod testing {
    use crate::protocol::ServerMessage;
    use crate::session::ConnId;
    use crate::state::AppState;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    /// 가짜 연결 등록. `connected` 인사는 미리 비워 둔다.
    pub fn connect(state: &Arc<AppState>) -> (ConnId, UnboundedReceiver<ServerMessage>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = super::handle_connection(state, tx);
        drain(&mut rx);
        (conn_id, rx)
    }

    /// 지금까지 도착한 메시지 전부
    pub fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// 다음 메시지를 최대 2초 기다림
    pub async fn next_message(rx: &mut UnboundedReceiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
    }
}
