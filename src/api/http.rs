use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::{
    ApiError, ApiResult, BatchContentRequest, BatchContentResponse, DiscographyPage, RemoteApi,
    SyncEventsPage, SyncSnapshot,
};
use crate::config::ServerConfig;

/// [`RemoteApi`] over HTTP against the catalog server's `/v1` routes.
pub struct HttpRemoteApi {
    http_client: HttpClient,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemoteApi {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(classify_status(status))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Unknown(format!("failed to decode response: {e}")))
    }
}

/// Map a non-success status onto the closed error set.
pub fn classify_status(status: StatusCode) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::GONE => ApiError::EventsPruned,
        other => ApiError::Unknown(format!("HTTP {}", other.as_u16())),
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_decode() {
        ApiError::Unknown(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn get_sync_state(&self) -> ApiResult<SyncSnapshot> {
        let request = self.http_client.get(self.url("/sync/state"));
        self.get_json(request).await
    }

    async fn get_sync_events(&self, since: u64) -> ApiResult<SyncEventsPage> {
        let request = self
            .http_client
            .get(self.url("/sync/events"))
            .query(&[("since", since)]);
        self.get_json(request).await
    }

    async fn get_batch_content(&self, request: &BatchContentRequest) -> ApiResult<BatchContentResponse> {
        let request = self
            .http_client
            .post(self.url("/content/batch"))
            .json(request);
        self.get_json(request).await
    }

    async fn get_artist_discography(
        &self,
        artist_id: &str,
        offset: usize,
        limit: usize,
    ) -> ApiResult<DiscographyPage> {
        let request = self
            .http_client
            .get(self.url(&format!("/content/artist/{}/discography", artist_id)))
            .query(&[("offset", offset), ("limit", limit)]);
        self.get_json(request).await
    }

    async fn mark_notification_read(&self, notification_id: &str) -> ApiResult<()> {
        let request = self
            .http_client
            .post(self.url(&format!("/user/notifications/{}/read", notification_id)));
        self.send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ApiError::Unauthorized);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ApiError::Unauthorized);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), ApiError::NotFound);
        assert_eq!(classify_status(StatusCode::GONE), ApiError::EventsPruned);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::Unknown("HTTP 500".to_string())
        );
    }

    #[test]
    fn test_url_building_strips_trailing_slash() {
        let config = ServerConfig {
            base_url: "https://music.example.org/".to_string(),
            ..ServerConfig::default()
        };
        let api = HttpRemoteApi::new(&config).unwrap();
        assert_eq!(api.url("/sync/state"), "https://music.example.org/v1/sync/state");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let config = ServerConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            auth_token: Some("t".to_string()),
            request_timeout_secs: 2,
        };
        let api = HttpRemoteApi::new(&config).unwrap();
        let result = api.get_sync_events(0).await;
        assert!(matches!(result, Err(ApiError::Network(_))));
    }
}
