use reqwest::StatusCode;
use reqwest::header;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = "flagsman/0.1";

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("unexpected status {0} from {1}")]
    Status(StatusCode, Url),

    #[error("request to {0} timed out")]
    Timeout(Url),

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// A 404 from a settings endpoint means no settings are published for
    /// that application; callers downgrade it from the error log.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Status(status, _) if *status == StatusCode::NOT_FOUND)
    }
}

/// Shared HTTP client for all upstream GETs. Every request carries the
/// service User-Agent and the configured timeout.
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    timeout: Duration,
}

impl Transport {
    pub fn new(timeout: Duration) -> Self {
        Transport {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TransportError> {
        let response = self.send(url).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn get_text(&self, url: Url) -> Result<String, TransportError> {
        let response = self.send(url).await?;
        Ok(response.text().await?)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::Timeout(url.clone())
                } else {
                    TransportError::Http(err)
                }
            })?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status(), url));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Deserialize)]
    struct Payload {
        value: String,
    }

    fn test_url(server: &MockServer, path: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), path)).unwrap()
    }

    #[tokio::test]
    async fn test_get_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": "ok"})),
            )
            .mount(&server)
            .await;

        let transport = Transport::new(Duration::from_secs(5));
        let payload: Payload = transport.get_json(test_url(&server, "/data")).await.unwrap();
        assert_eq!(payload.value, "ok");
    }

    #[tokio::test]
    async fn test_get_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("line one\nline two"))
            .mount(&server)
            .await;

        let transport = Transport::new(Duration::from_secs(5));
        let body = transport.get_text(test_url(&server, "/list")).await.unwrap();
        assert_eq!(body, "line one\nline two");
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = Transport::new(Duration::from_secs(5));
        let result = transport.get_text(test_url(&server, "/missing")).await;

        let err = result.unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, TransportError::Status(s, _) if s == StatusCode::NOT_FOUND));

        let result = transport.get_text(test_url(&server, "/unmocked")).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let transport = Transport::new(Duration::from_millis(50));
        let result = transport.get_text(test_url(&server, "/slow")).await;
        assert!(matches!(result.unwrap_err(), TransportError::Timeout(_)));
    }
}
