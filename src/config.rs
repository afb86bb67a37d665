//! 환경 변수 기반 설정 관리

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub broadcast: BroadcastConfig,
    pub turn: TurnConfig,
    /// 잘못된 요청에 `rejected` 응답을 보낼지 여부 (기본: 조용히 무시)
    pub rejection_acks: bool,
    pub log_level: String,
}

/// 방송 중계 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// 방송자가 주기적으로 영상 조각을 올리고 서버가 시청자에게 위치를 알림
    Segment,
    /// 서버는 offer/answer/ICE 만 중계하고 영상은 피어 간 직접 전송
    Peer,
}

impl BroadcastMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Segment => "segment",
            Self::Peer => "peer",
        }
    }
}

impl FromStr for BroadcastMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segment" => Ok(Self::Segment),
            "peer" => Ok(Self::Peer),
            other => Err(format!("unknown broadcast mode: {other}")),
        }
    }
}

/// 방송 설정
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub mode: BroadcastMode,
    pub recordings_dir: PathBuf,
    pub segment_extension: String,
    pub max_segment_bytes: usize,
    /// 0 이면 시청자 폴링 타이머를 만들지 않음
    pub viewer_poll_interval_ms: u64,
    /// 0 이면 비활성 방송 정리를 하지 않음
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

/// TURN 서버 설정
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub url: String,
    pub secret: String,
    pub realm: String,
    pub enable_tls: bool,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub ports: TurnPorts,
    pub credential_ttl: u64,
    pub fallback_servers: Vec<String>,
}

/// TURN 포트 설정
#[derive(Debug, Clone)]
pub struct TurnPorts {
    pub udp: u16,
    pub tcp: u16,
    pub tls: u16,
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn list(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            port: parsed("PORT", 5000),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cors_origins: list("CORS_ORIGINS", "*"),
            broadcast: BroadcastConfig {
                mode: parsed("BROADCAST_MODE", BroadcastMode::Segment),
                recordings_dir: env::var("RECORDINGS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("recordings")),
                segment_extension: env::var("SEGMENT_EXTENSION")
                    .unwrap_or_else(|_| "webm".to_string()),
                max_segment_bytes: parsed("MAX_SEGMENT_BYTES", 32 * 1024 * 1024),
                viewer_poll_interval_ms: parsed("VIEWER_POLL_INTERVAL_MS", 5000),
                idle_timeout_secs: parsed("BROADCAST_IDLE_TIMEOUT_SECS", 0),
                sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS", 30),
            },
            turn: TurnConfig {
                url: env::var("TURN_SERVER_URL").unwrap_or_default(),
                secret: env::var("TURN_SECRET").unwrap_or_default(),
                realm: env::var("TURN_REALM").unwrap_or_default(),
                enable_tls: flag("TURN_ENABLE_TLS", false),
                enable_udp: env::var("TURN_ENABLE_UDP")
                    .map(|v| v != "false")
                    .unwrap_or(true),
                enable_tcp: env::var("TURN_ENABLE_TCP")
                    .map(|v| v != "false")
                    .unwrap_or(true),
                ports: TurnPorts {
                    udp: parsed("TURN_PORT_UDP", 3478),
                    tcp: parsed("TURN_PORT_TCP", 3478),
                    tls: parsed("TURN_PORT_TLS", 443),
                },
                credential_ttl: parsed("TURN_CREDENTIAL_TTL", 3600),
                fallback_servers: list("TURN_FALLBACK_SERVERS", ""),
            },
            rejection_acks: flag("REJECTION_ACKS", false),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// 테스트와 임베딩용 기본값 (환경 변수를 읽지 않음)
    pub fn with_recordings_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            port: 0,
            host: "127.0.0.1".to_string(),
            cors_origins: vec!["*".to_string()],
            broadcast: BroadcastConfig {
                mode: BroadcastMode::Segment,
                recordings_dir: dir.into(),
                segment_extension: "webm".to_string(),
                max_segment_bytes: 32 * 1024 * 1024,
                viewer_poll_interval_ms: 5000,
                idle_timeout_secs: 0,
                sweep_interval_secs: 30,
            },
            turn: TurnConfig {
                url: String::new(),
                secret: String::new(),
                realm: String::new(),
                enable_tls: false,
                enable_udp: true,
                enable_tcp: true,
                ports: TurnPorts {
                    udp: 3478,
                    tcp: 3478,
                    tls: 443,
                },
                credential_ttl: 3600,
                fallback_servers: Vec::new(),
            },
            rejection_acks: false,
            log_level: "info".to_string(),
        }
    }
}
