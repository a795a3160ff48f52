//! Shared HTTP plumbing for source adapters

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use robodigest_common::config::FetchConfig;
use robodigest_common::metrics::record_upstream;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::errors::FetchError;

/// Build the client every adapter shares
pub fn build_client(config: &FetchConfig) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {e}")))
}

/// Send a request and return the body text of a successful response.
///
/// Non-success statuses are mapped onto the fetch error taxonomy and
/// every outcome is counted per provider.
pub async fn send_text(provider: &str, request: RequestBuilder) -> Result<String, FetchError> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            record_upstream(provider, "error");
            return Err(FetchError::from_reqwest(provider, e));
        }
    };

    let status = response.status();
    record_upstream(provider, status.as_str());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited {
            provider: provider.to_string(),
            retry_after: retry_after(response.headers()),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(provider, e))?;

    if !status.is_success() {
        return Err(FetchError::from_status(
            provider,
            status.as_u16(),
            crate::errors::body_sample(&body),
        ));
    }
    Ok(body)
}

/// Send a request and decode a JSON body
pub async fn send_json<T: DeserializeOwned>(provider: &str, request: RequestBuilder) -> Result<T, FetchError> {
    let body = send_text(provider, request).await?;
    parse_json(provider, &body)
}

pub fn parse_json<T: DeserializeOwned>(provider: &str, body: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|e| {
        let err = FetchError::malformed(provider, e.to_string(), body);
        if let FetchError::MalformedResponse { sample, .. } = &err {
            tracing::warn!(source = provider, error = %e, sample = %sample, "Malformed JSON response");
        }
        err
    })
}

/// `Retry-After` in delta-seconds form
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client() -> Client {
        build_client(&FetchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_send_text_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/ok");
                then.status(200).body("hello");
            })
            .await;

        let body = send_text("test", client().get(server.url("/ok"))).await.unwrap();
        assert_eq!(body, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_429_carries_retry_after() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/busy");
                then.status(429).header("Retry-After", "7");
            })
            .await;

        let err = send_text("test", client().get(server.url("/busy"))).await.unwrap_err();
        match err {
            FetchError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_keeps_sample() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/bad");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let err = send_json::<serde_json::Value>("test", client().get(server.url("/bad")))
            .await
            .unwrap_err();
        match err {
            FetchError::MalformedResponse { sample, .. } => assert!(sample.contains("not json")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
