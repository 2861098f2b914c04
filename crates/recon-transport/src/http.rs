use std::time::Duration;

use async_trait::async_trait;
use recon_core::RawReply;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::{CredentialBundle, GqlRequest, Transport, TransportError};

/// POSTs GraphQL requests to one endpoint with a fixed credential bundle.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    credentials: CredentialBundle,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        credentials: CredentialBundle,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(ua) = user_agent {
            builder = builder.user_agent(ua.to_string());
        }
        let client = builder.build().map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credentials,
            timeout,
        })
    }

    fn headers(&self, privileged: bool) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();
        for (name, value) in self.credentials.headers_for(privileged) {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader(name.as_str().to_string()))?;
            value.set_sensitive(true);
            map.insert(name, value);
        }
        Ok(map)
    }

    fn classify_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            TransportError::Network(self.credentials.redact(&e.to_string()))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &GqlRequest) -> Result<RawReply, TransportError> {
        tracing::debug!(label = %request.label, privileged = request.privileged, "sending request");
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers(request.privileged)?)
            .json(&request.body())
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify_error(e))?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: self.credentials.redact(&body),
            });
        }
        serde_json::from_str::<RawReply>(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::{classify, Classification};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer, timeout: Duration) -> HttpTransport {
        let creds = CredentialBundle::new()
            .with_header("Authorization", "Basic YWRtaW46YWRtaW4=")
            .with_privileged_header("Saleor-App-Token", "app-token-0123456789");
        HttpTransport::new(format!("{}/graphql/", server.uri()), creds, timeout, Some("recon-test/1.0")).unwrap()
    }

    #[tokio::test]
    async fn posts_query_with_credentials() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql/"))
            .and(header("Authorization", "Basic YWRtaW46YWRtaW4="))
            .and(header("user-agent", "recon-test/1.0"))
            .and(body_json(json!({"query": "query { shop { name } }", "variables": {}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"shop": {"name": "Trattoria"}}})))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&server, Duration::from_secs(5));
        let reply = t.send(&GqlRequest::new("Check Shop", "query { shop { name } }")).await?;
        assert_eq!(classify(&reply, "shop"), Classification::Ok(json!({"name": "Trattoria"})));
        Ok(())
    }

    #[tokio::test]
    async fn overlay_header_only_on_privileged_requests() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Saleor-App-Token", "app-token-0123456789"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"who": "privileged"}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"who": "plain"}})))
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&server, Duration::from_secs(5));
        let plain = t.send(&GqlRequest::new("plain", "query { who }")).await?;
        let elevated = t.send(&GqlRequest::new("elevated", "query { who }").privileged(true)).await?;
        assert_eq!(plain.data, Some(json!({"who": "plain"})));
        assert_eq!(elevated.data, Some(json!({"who": "privileged"})));
        Ok(())
    }

    #[tokio::test]
    async fn application_errors_come_back_as_replies() -> Result<(), Box<dyn std::error::Error>> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{"message": "User does not have permission to perform this action"}]
            })))
            .mount(&server)
            .await;

        let t = transport(&server, Duration::from_secs(5));
        let reply = t.send(&GqlRequest::new("Create Category", "mutation { x }")).await?;
        assert!(matches!(classify(&reply, "categoryCreate"), Classification::Denied(_)));
        Ok(())
    }

    #[tokio::test]
    async fn non_2xx_is_a_transport_error_with_redacted_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token app-token-0123456789"))
            .mount(&server)
            .await;

        let t = transport(&server, Duration::from_secs(5));
        let err = t
            .send(&GqlRequest::new("x", "query { shop { name } }").privileged(true))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Status { status: 401, body: "bad token ***".into() });
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let t = transport(&server, Duration::from_millis(100));
        let err = t.send(&GqlRequest::new("x", "query { shop { name } }")).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout { timeout_ms: 100 });
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let t = transport(&server, Duration::from_secs(5));
        let err = t.send(&GqlRequest::new("x", "query { a }")).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
