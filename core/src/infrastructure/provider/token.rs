// Copyright (c) 2026 emma.ms
// SPDX-License-Identifier: Apache-2.0

//! Token manager: serialises refresh of the shared provider bearer token
//! through a single-writer critical section (§4.1, §5, §9).

use chrono::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::token::AccessToken;
use crate::infrastructure::provider::error::ProviderError;
use crate::infrastructure::provider::models::{IssueTokenRequest, RefreshTokenRequest, TokenResponse};

pub struct TokenManager {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, base_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            base_url,
            client_id,
            client_secret,
            token: RwLock::new(None),
        }
    }

    /// Return a bearer header value, refreshing the token first if it has
    /// fewer than five minutes of remaining lifetime.
    pub async fn bearer_header(&self) -> Result<String, ProviderError> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if !token.needs_refresh(chrono::Utc::now()) {
                    return Ok(token.bearer_header());
                }
            }
        }
        self.refresh().await
    }

    /// Force a refresh regardless of current expiry; used after an
    /// unexpected 401 (§4.1).
    pub async fn force_refresh(&self) -> Result<String, ProviderError> {
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.write().await;

        // Double-check: another writer may have refreshed while we waited.
        if let Some(token) = guard.as_ref() {
            if !token.needs_refresh(chrono::Utc::now()) {
                return Ok(token.bearer_header());
            }
        }

        let refresh_token = guard.as_ref().map(|t| t.refresh_token.clone());

        let issued = if let Some(refresh_token) = refresh_token {
            match self.refresh_with_token(&refresh_token).await {
                Ok(issued) => issued,
                Err(err) => {
                    warn!(error = %err, "refresh-token grant failed, falling back to credentials");
                    self.issue_with_credentials().await?
                }
            }
        } else {
            self.issue_with_credentials().await?
        };

        let token = AccessToken::new(
            issued.access_token,
            issued.refresh_token,
            Duration::seconds(issued.expires_in),
        );
        let header = token.bearer_header();
        info!("provider access token refreshed");
        *guard = Some(token);
        Ok(header)
    }

    async fn issue_with_credentials(&self) -> Result<TokenResponse, ProviderError> {
        let url = format!("{}/v1/issue-token", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&IssueTokenRequest {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
            })
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Self::parse_token_response(response).await
    }

    async fn refresh_with_token(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        let url = format!("{}/v1/refresh-token", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&RefreshTokenRequest { refresh_token: refresh_token.to_string() })
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Self::parse_token_response(response).await
    }

    async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ProviderError::Internal(format!("malformed token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issues_token_from_credentials() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/issue-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"accessToken":"a1","refreshToken":"r1","expiresIn":3600}"#)
            .create_async()
            .await;

        let manager = TokenManager::new(
            reqwest::Client::new(),
            server.url(),
            "id".into(),
            "secret".into(),
        );

        let header = manager.bearer_header().await.unwrap();
        assert_eq!(header, "Bearer a1");
    }

    #[tokio::test]
    async fn reuses_token_within_validity_window() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/issue-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"accessToken":"a1","refreshToken":"r1","expiresIn":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let manager = TokenManager::new(
            reqwest::Client::new(),
            server.url(),
            "id".into(),
            "secret".into(),
        );

        manager.bearer_header().await.unwrap();
        manager.bearer_header().await.unwrap();
        mock.assert_async().await;
    }
}
