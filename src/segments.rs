//! 영상 조각 저장
//!
//! 파일 이름은 `{match_id}-{생성 시각}.{확장자}` 이다. 방송자가 등록될 때
//! 위치를 정하고, 이후 업로드는 같은 파일을 덮어쓴다. 경기마다 writer
//! 태스크 하나가 `watch` 채널의 최신 값만 기록하므로 쓰기 중에 들어온
//! 업로드는 자연스럽게 합쳐진다. 조각은 옆의 `.part` 파일에 먼저 쓴 뒤
//! rename 으로 교체하므로 정적 경로는 쓰다 만 파일을 내보내지 않는다.

use crate::session::{unix_millis, MatchId, SegmentTarget};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// 정적 파일로 노출되는 경로 접두사
pub const RECORDINGS_ROUTE: &str = "/recordings";

/// 기록 대기 중인 조각
#[derive(Debug, Clone)]
pub struct PendingSegment {
    pub target: SegmentTarget,
    pub data: Arc<Vec<u8>>,
}

type SegmentSlot = watch::Sender<Option<PendingSegment>>;

pub struct SegmentStore {
    dir: PathBuf,
    extension: String,
    last_stamp: AtomicU64,
    writers: DashMap<MatchId, SegmentSlot>,
}

/// 파일 이름에 쓸 수 없는 문자를 `_` 로 치환
fn file_safe(match_id: &str) -> String {
    let cleaned: String = match_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "match".to_string()
    } else {
        cleaned
    }
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            last_stamp: AtomicU64::new(0),
            writers: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// 프로세스 안에서 항상 증가하는 밀리초 타임스탬프
    fn next_stamp(&self) -> u64 {
        let now = unix_millis();
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// 새 방송의 저장 위치 할당
    pub fn allocate(&self, match_id: &str) -> SegmentTarget {
        let file = format!(
            "{}-{}.{}",
            file_safe(match_id),
            self.next_stamp(),
            self.extension
        );
        SegmentTarget {
            path: self.dir.join(&file),
            url: format!("{RECORDINGS_ROUTE}/{file}"),
        }
    }

    /// 조각 기록 요청. 이미 writer 가 있으면 최신 값만 교체한다.
    pub fn submit<F>(&self, match_id: &str, segment: PendingSegment, on_written: F)
    where
        F: Fn(&str, &SegmentTarget) + Send + 'static,
    {
        let pending = match self.writers.get(match_id) {
            Some(slot) => match slot.send(Some(segment)) {
                Ok(()) => return,
                Err(watch::error::SendError(value)) => value,
            },
            None => Some(segment),
        };
        let Some(segment) = pending else {
            return;
        };

        let (tx, rx) = watch::channel(Some(segment));
        self.writers.insert(match_id.to_string(), tx);
        tokio::spawn(run_writer(match_id.to_string(), rx, on_written));
    }

    /// 방송 종료 시 writer 정리. 진행 중인 쓰기는 끝까지 마친다.
    pub fn release(&self, match_id: &str) {
        if self.writers.remove(match_id).is_some() {
            tracing::debug!(match_id = %match_id, "Segment writer released");
        }
    }

    pub fn active_writers(&self) -> usize {
        self.writers.len()
    }
}

/// 임시 파일에 쓴 뒤 rename 으로 교체
async fn write_segment(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, data).await?;
    if let Err(e) = tokio::fs::rename(&partial, path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    Ok(())
}

async fn run_writer<F>(
    match_id: String,
    mut rx: watch::Receiver<Option<PendingSegment>>,
    on_written: F,
) where
    F: Fn(&str, &SegmentTarget) + Send + 'static,
{
    loop {
        let pending = rx.borrow_and_update().clone();
        if let Some(segment) = pending {
            match write_segment(&segment.target.path, segment.data.as_slice()).await {
                Ok(()) => {
                    tracing::debug!(
                        match_id = %match_id,
                        path = %segment.target.path.display(),
                        size = segment.data.len(),
                        "Segment written"
                    );
                    on_written(&match_id, &segment.target);
                }
                Err(e) => {
                    tracing::warn!(
                        match_id = %match_id,
                        path = %segment.target.path.display(),
                        error = %e,
                        "Failed to write segment"
                    );
                }
            }
        }

        if rx.changed().await.is_err() {
            break;
        }
    }
}
