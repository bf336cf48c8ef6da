use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use url::Url;

use crate::config::ClientConfig;
use crate::environment::EnvironmentInfo;
use crate::error::Error;
use crate::request::{self, RequestParameters, SignedRequest};
use crate::response::{self, Payload};
use crate::transport::{ReqwestTransport, Transport, TransportRequest};

/// Client for the MWS API.
///
/// Configuration is validated once at construction and never changes
/// afterwards, so a client can be shared freely between tasks.
#[derive(Debug, Clone)]
pub struct MwsClient<T: Transport = ReqwestTransport> {
    config: Arc<ClientConfig>,
    base_url: Url,
    environment: EnvironmentInfo,
    user_agent: String,
    user_agent_header: HeaderValue,
    transport: T,
}

impl MwsClient<ReqwestTransport> {
    /// Creates a client using the default reqwest transport and the
    /// environment of the running host.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the base URL, application name or
    /// application version is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::with_transport(config, EnvironmentInfo::detect(), ReqwestTransport::new())
    }

    /// Creates a client from `MWS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the loaded
    /// configuration is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ClientConfig::from_env()?)
    }
}

#[allow(clippy::missing_errors_doc)]
impl<T: Transport> MwsClient<T> {
    /// Creates a client with an explicit environment description and transport.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if:
    /// - the base URL does not point at an MWS endpoint
    /// - the application name or version is empty
    /// - the resulting User-Agent is not a valid header value
    pub fn with_transport(
        config: ClientConfig,
        environment: EnvironmentInfo,
        transport: T,
    ) -> Result<Self, Error> {
        let base_url = config.validate()?;

        let user_agent =
            environment.user_agent(&config.application_name, &config.application_version);
        let user_agent_header = HeaderValue::from_str(&user_agent).map_err(|e| {
            Error::configuration(format!("Invalid User-Agent \"{user_agent}\": {e}"))
        })?;

        tracing::debug!(
            "MWS client configured for {} with {} marketplace id(s)",
            base_url,
            config.marketplace_ids.len()
        );

        Ok(Self {
            config: Arc::new(config),
            base_url,
            environment,
            user_agent,
            user_agent_header,
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn environment(&self) -> &EnvironmentInfo {
        &self.environment
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `<name>/<version> (Language=<language>; Platform=<os>/<arch>/<release>)`
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Builds and signs a request timestamped two minutes before now.
    ///
    /// `optional_params` may contain `MarketplaceId` to skip marketplace id
    /// expansion, and `xml` to send an XML document as the body.
    pub fn build_request(
        &self,
        action: &str,
        version_uri: &str,
        optional_params: &RequestParameters,
    ) -> Result<SignedRequest, Error> {
        self.build_request_at(action, version_uri, optional_params, Utc::now())
    }

    /// Same as [`MwsClient::build_request`], with an explicit clock reading.
    pub fn build_request_at(
        &self,
        action: &str,
        version_uri: &str,
        optional_params: &RequestParameters,
        now: DateTime<Utc>,
    ) -> Result<SignedRequest, Error> {
        request::build_signed_request(
            &self.config,
            &self.base_url,
            action,
            version_uri,
            optional_params,
            now,
        )
    }

    /// Signs and sends a request, then classifies the response.
    ///
    /// # Errors
    ///
    /// - `Error::Service` if the response body is an error document
    /// - `Error::Transport` (or whatever the transport reports) on network failure
    /// - `Error::InvalidRequest` / `Error::UrlParse` if the request cannot be built
    pub async fn send(
        &self,
        action: &str,
        version_uri: &str,
        optional_params: &RequestParameters,
    ) -> Result<Payload, Error> {
        let signed = self.build_request(action, version_uri, optional_params)?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent_header.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(signed.content_type()));

        tracing::debug!(
            "Sending {} to {} ({} body)",
            action,
            signed.url,
            if signed.is_xml() { "xml" } else { "form" }
        );

        let response = self
            .transport
            .post(TransportRequest {
                url: signed.target_url(),
                headers,
                body: signed.body().to_string(),
            })
            .await?;

        tracing::debug!(
            "{} returned status {} with {} byte(s)",
            action,
            response.status,
            response.body.len()
        );

        response::classify(&response.body, &response.headers).map_err(|err| {
            tracing::warn!("{} failed with service error: {}", action, err);
            Error::from(err)
        })
    }
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<MwsClient>;
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{FORM_CONTENT_TYPE, XML_CONTENT_TYPE};
    use crate::signer::SIGNATURE_KEY;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Records requests and answers with a canned body.
    #[derive(Debug, Default)]
    struct StubTransport {
        body: Vec<u8>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl StubTransport {
        fn answering(body: &str) -> Self {
            Self {
                body: body.as_bytes().to_vec(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn post(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
            self.requests.lock().unwrap().push(request);
            Ok(TransportResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: self.body.clone(),
            })
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new(
            "AKIAEXAMPLE",
            "secret",
            "A1SELLER",
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            "amzn.mws.token",
        )
        .with_application("TestApp", "3.1")
    }

    fn environment() -> EnvironmentInfo {
        EnvironmentInfo::new("Rust/1.75", "linux", "x86_64", "6.1.0")
    }

    fn client(body: &str) -> MwsClient<StubTransport> {
        MwsClient::with_transport(config(), environment(), StubTransport::answering(body)).unwrap()
    }

    #[test]
    fn test_user_agent() {
        assert_eq!(
            client("").user_agent(),
            "TestApp/3.1 (Language=Rust/1.75; Platform=linux/x86_64/6.1.0)"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = MwsClient::with_transport(
            config().with_base_url("https://example.com"),
            environment(),
            StubTransport::default(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_control_characters_in_user_agent_rejected() {
        let result = MwsClient::with_transport(
            config().with_application("App\n", "1.0"),
            environment(),
            StubTransport::default(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_timestamp_within_skew_window() {
        let client = client("");
        let before = Utc::now();
        let request = client
            .build_request("ListOrders", "/Orders/2013-09-01", &RequestParameters::new())
            .unwrap();
        let after = Utc::now();

        let timestamp = DateTime::parse_from_rfc3339(request.parameters.get("Timestamp").unwrap())
            .unwrap()
            .with_timezone(&Utc);
        assert!(timestamp >= before - Duration::seconds(121));
        assert!(timestamp <= after - Duration::seconds(119));
    }

    #[test]
    fn test_build_request_at_is_reproducible() {
        let client = client("");
        let now = Utc::now();
        let first = client
            .build_request_at("ListOrders", "/Orders/2013-09-01", &RequestParameters::new(), now)
            .unwrap();
        let second = client
            .build_request_at("ListOrders", "/Orders/2013-09-01", &RequestParameters::new(), now)
            .unwrap();
        assert_eq!(first, second);
        assert!(first.parameters.get(SIGNATURE_KEY).is_some());
    }

    #[tokio::test]
    async fn test_send_form_request() {
        let client = client("<GetServiceStatusResponse><GetServiceStatusResult><Status>GREEN</Status></GetServiceStatusResult></GetServiceStatusResponse>");

        let payload = client
            .send("GetServiceStatus", "/Orders/2013-09-01", &RequestParameters::new())
            .await
            .unwrap();
        assert_eq!(
            payload.as_xml().and_then(|root| root.find(&["GetServiceStatusResult", "Status"])).map(|n| n.text.as_str()),
            Some("GREEN")
        );

        let requests = client.transport().requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.url.as_str(), "https://mws.amazonservices.com/Orders/2013-09-01");
        assert_eq!(request.headers[CONTENT_TYPE], FORM_CONTENT_TYPE);
        assert_eq!(request.headers[USER_AGENT], client.user_agent());
        assert!(request.body.contains("Action=GetServiceStatus"));
        assert!(request.body.contains("MarketplaceIdList.Id.3=C"));
        assert!(request.body.contains("Signature="));
    }

    #[tokio::test]
    async fn test_send_xml_request() {
        let client = client("<SubmitFeedResponse><SubmitFeedResult/></SubmitFeedResponse>");
        let xml = "<AmazonEnvelope><Message/></AmazonEnvelope>";
        let optional: RequestParameters = [("FeedType", "_POST_INVENTORY_AVAILABILITY_DATA_"), ("xml", xml)]
            .into_iter()
            .collect();

        client.send("SubmitFeed", "/", &optional).await.unwrap();

        let requests = client.transport().requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.headers[CONTENT_TYPE], XML_CONTENT_TYPE);
        assert_eq!(request.body, xml);
        let query = request.url.query().unwrap();
        assert!(query.contains("Action=SubmitFeed"));
        assert!(query.contains("ContentMD5Value="));
        assert!(!query.contains("xml="));
    }

    #[tokio::test]
    async fn test_send_surfaces_service_error() {
        let client = client("<ErrorResponse><Error><Type>Sender</Type><Code>AccessDenied</Code><Message>denied</Message></Error><RequestID>r-1</RequestID></ErrorResponse>");

        let err = client
            .send("ListOrders", "/Orders/2013-09-01", &RequestParameters::new())
            .await
            .unwrap_err();
        let service = err.as_service_error().expect("service error");
        assert_eq!(service.code(), Some("AccessDenied"));
        assert_eq!(service.message(), "denied");
        assert_eq!(service.request_id(), Some("r-1"));
    }

    #[tokio::test]
    async fn test_send_returns_raw_for_flat_files() {
        let client = client("sku\tquantity\nABC\t3\n");
        let payload = client
            .send("GetReport", "/", &RequestParameters::from_iter([("ReportId", "42")]))
            .await
            .unwrap();
        assert_eq!(payload.as_raw(), Some(&b"sku\tquantity\nABC\t3\n"[..]));
    }
}
