//! Requester identity as forwarded by the upstream auth/session layer.
use axum::extract::{ConnectInfo, FromRequestParts};
use http::{header, request::Parts, HeaderMap};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_KEY_HEADER: &str = "x-session-key";
pub const SESSION_COOKIE: &str = "sessionid";
const SESSION_KEY_MAX: usize = 40;

#[derive(Debug, Clone, Default)]
pub struct Requester {
    pub user_id: Option<Uuid>,
    pub ip: Option<String>,
    pub session_key: String,
    pub user_agent: String,
}

impl Requester {
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Result<Self, AppError> {
        let user_id = match header_str(headers, USER_ID_HEADER) {
            Some(raw) => Some(
                Uuid::parse_str(raw.trim())
                    .map_err(|_| AppError::Validation("Malformed user id header".to_string()))?,
            ),
            None => None,
        };

        let ip = header_str(headers, "x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(|hop| hop.trim().to_string())
            .filter(|hop| !hop.is_empty())
            .or_else(|| peer.map(|addr| addr.ip().to_string()));

        let session_key = header_str(headers, SESSION_KEY_HEADER)
            .map(str::to_string)
            .or_else(|| session_cookie(headers))
            .unwrap_or_default()
            .chars()
            .take(SESSION_KEY_MAX)
            .collect();

        let user_agent = header_str(headers, header::USER_AGENT.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            user_id,
            ip,
            session_key,
            user_agent,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Requester::from_headers(&parts.headers, peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_forwarded_for_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let requester = Requester::from_headers(&headers, Some(peer)).unwrap();
        assert_eq!(requester.ip.as_deref(), Some("203.0.113.9"));

        let requester = Requester::from_headers(&HeaderMap::new(), Some(peer)).unwrap();
        assert_eq!(requester.ip.as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn test_session_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sessionid=abc123; other=1"),
        );
        let requester = Requester::from_headers(&headers, None).unwrap();
        assert_eq!(requester.session_key, "abc123");
        assert!(requester.user_id.is_none());
    }

    #[test]
    fn test_malformed_user_id_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(Requester::from_headers(&headers, None).is_err());
    }
}
