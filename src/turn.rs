//! TURN 자격증명 생성 (RFC 5766 REST API 방식, HMAC-SHA1)
//!
//! peer 모드에서 방송자와 시청자가 NAT 를 넘을 수 있도록 시간 제한이 있는
//! TURN 계정을 발급한다.

use crate::config::TurnConfig;
use crate::protocol::{IceConfigData, IceServer};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("TURN server not configured")]
    NotConfigured,
    #[error("invalid TURN secret")]
    InvalidSecret,
}

/// ICE 서버 목록과 자격증명 생성
pub fn ice_config(
    config: &TurnConfig,
    match_id: &str,
    now: u64,
    nonce: u64,
) -> Result<IceConfigData, TurnError> {
    if config.url.is_empty() || config.secret.is_empty() {
        return Err(TurnError::NotConfigured);
    }

    let expiry_time = now + config.credential_ttl;
    let username = format!("user_{now}_{nonce:x}:{expiry_time}");
    let password = hmac_password(&username, &config.secret)?;

    Ok(IceConfigData {
        ice_servers: build_ice_servers(config, &username, &password),
        ttl: config.credential_ttl,
        timestamp: now,
        match_id: match_id.to_string(),
    })
}

fn hmac_password(username: &str, secret: &str) -> Result<String, TurnError> {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).map_err(|_| TurnError::InvalidSecret)?;
    mac.update(username.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn build_ice_servers(config: &TurnConfig, username: &str, password: &str) -> Vec<IceServer> {
    let mut turn_urls = Vec::new();

    if config.enable_udp {
        turn_urls.push(format!("turn:{}:{}", config.url, config.ports.udp));
    }
    if config.enable_tcp {
        turn_urls.push(format!(
            "turn:{}:{}?transport=tcp",
            config.url, config.ports.tcp
        ));
    }
    if config.enable_tls {
        turn_urls.push(format!(
            "turns:{}:{}?transport=tcp",
            config.url, config.ports.tls
        ));
    }
    for fallback in &config.fallback_servers {
        if config.enable_tls {
            turn_urls.push(format!("turns:{}:{}?transport=tcp", fallback, config.ports.tls));
        } else {
            turn_urls.push(format!("turn:{}:{}", fallback, config.ports.udp));
        }
    }

    let mut servers: Vec<IceServer> = turn_urls
        .into_iter()
        .map(|url| IceServer {
            urls: vec![url],
            username: Some(username.to_string()),
            credential: Some(password.to_string()),
            credential_type: Some("password".to_string()),
        })
        .collect();

    // STUN 은 인증 불필요
    if config.enable_udp {
        servers.push(IceServer {
            urls: vec![format!("stun:{}:{}", config.url, config.ports.udp)],
            username: None,
            credential: None,
            credential_type: None,
        });
    }

    servers
}

/// 사용자 이름에 포함된 만료 시각이 아직 지나지 않았는지
pub fn credentials_valid(username: &str, now: u64) -> bool {
    username
        .rsplit(':')
        .next()
        .and_then(|expiry| expiry.parse::<u64>().ok())
        .is_some_and(|expiry| expiry > now)
}
