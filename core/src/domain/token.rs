// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Access token value object: the provider bearer credential shared
//! process-wide by the Provider Client (§4.1, §9).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Refresh this far ahead of expiry so an in-flight request never races
/// the token going stale mid-call.
pub const REFRESH_MARGIN: Duration = Duration::minutes(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(access_token: String, refresh_token: String, expires_in: Duration) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + expires_in,
        }
    }

    /// True once fewer than [`REFRESH_MARGIN`] remains before expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < REFRESH_MARGIN
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_does_not_need_refresh() {
        let token = AccessToken::new("a".into(), "r".into(), Duration::minutes(60));
        assert!(!token.needs_refresh(Utc::now()));
    }

    #[test]
    fn token_inside_margin_needs_refresh() {
        let token = AccessToken::new("a".into(), "r".into(), Duration::minutes(60));
        let almost_expired = token.expires_at - Duration::minutes(1);
        assert!(token.needs_refresh(almost_expired));
    }

    #[test]
    fn token_exactly_at_margin_needs_refresh() {
        let token = AccessToken::new("a".into(), "r".into(), Duration::minutes(60));
        let at_margin = token.expires_at - REFRESH_MARGIN;
        assert!(token.needs_refresh(at_margin));
    }

    #[test]
    fn bearer_header_formats_access_token() {
        let token = AccessToken::new("xyz".into(), "r".into(), Duration::minutes(60));
        assert_eq!(token.bearer_header(), "Bearer xyz");
    }
}
