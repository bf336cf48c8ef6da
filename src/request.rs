use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::signer::{self, SIGNATURE_METHOD, SIGNATURE_VERSION};

/// Reserved optional parameter carrying a raw XML body. Its presence selects
/// XML mode; it is sent as the body and never signed.
pub const XML_PAYLOAD_KEY: &str = "xml";

/// When supplied by the caller, marketplace ids are not expanded.
pub const MARKETPLACE_ID_KEY: &str = "MarketplaceId";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
pub const XML_CONTENT_TYPE: &str = "text/xml";

/// Request parameters with unique keys, kept in insertion order.
///
/// Inserting a key that already exists replaces its value in place. Sorting
/// only happens on demand via [`RequestParameters::sorted`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters {
    entries: Vec<(String, String)>,
}

impl RequestParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Inserts every entry of `other`; values from `other` win.
    pub fn merge(&mut self, other: RequestParameters) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// Copy ordered by byte-wise comparison of the keys.
    pub fn sorted(&self) -> RequestParameters {
        let mut entries = self.entries.clone();
        entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
        RequestParameters { entries }
    }

    /// `key=value&key=value` with both sides percent-encoded, in current order.
    pub fn to_encoded_string(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", signer::percent_encode(k), signer::percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut parameters = RequestParameters::new();
        for (key, value) in iter {
            parameters.insert(key, value);
        }
        parameters
    }
}

/// How the signed parameters travel to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Parameters are the url-encoded body
    Form(String),
    /// Parameters go in the query string, the XML document is the body
    Xml(String),
}

/// A fully signed request, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// Absolute URL of the endpoint, without query string
    pub url: Url,
    /// Final parameters including `Timestamp` and `Signature`
    pub parameters: RequestParameters,
    pub body: RequestBody,
}

impl SignedRequest {
    pub fn content_type(&self) -> &'static str {
        match self.body {
            RequestBody::Form(_) => FORM_CONTENT_TYPE,
            RequestBody::Xml(_) => XML_CONTENT_TYPE,
        }
    }

    pub fn is_xml(&self) -> bool {
        matches!(self.body, RequestBody::Xml(_))
    }

    /// Encoded parameters for the URL, only used in XML mode
    pub fn query_string(&self) -> Option<String> {
        match self.body {
            RequestBody::Xml(_) => Some(self.parameters.to_encoded_string()),
            RequestBody::Form(_) => None,
        }
    }

    pub fn body(&self) -> &str {
        match &self.body {
            RequestBody::Form(body) | RequestBody::Xml(body) => body,
        }
    }

    /// Endpoint URL with the query string attached in XML mode
    pub fn target_url(&self) -> Url {
        let mut url = self.url.clone();
        if let Some(query) = self.query_string() {
            url.set_query(Some(&query));
        }
        url
    }
}

/// Final segment of the version path, e.g. `2013-09-01` for `/Orders/2013-09-01`
pub fn version_from_uri(version_uri: &str) -> &str {
    version_uri.rsplit('/').next().unwrap_or_default()
}

/// Parameters every call carries. Marketplace ids are expanded to
/// `MarketplaceIdList.Id.1`, `.2`, ... unless `expand_marketplaces` is false.
pub fn required_parameters(
    config: &ClientConfig,
    action: &str,
    version_uri: &str,
    expand_marketplaces: bool,
) -> RequestParameters {
    let mut parameters = RequestParameters::new();
    parameters.insert("AWSAccessKeyId", config.access_key.as_str());
    parameters.insert("Action", action);
    parameters.insert("SellerId", config.seller_id.as_str());
    parameters.insert("MWSAuthToken", config.mws_auth_token());
    parameters.insert("SignatureVersion", SIGNATURE_VERSION);
    parameters.insert("Version", version_from_uri(version_uri));
    parameters.insert("SignatureMethod", SIGNATURE_METHOD);

    if expand_marketplaces {
        for (index, marketplace_id) in config.marketplace_ids.iter().enumerate() {
            parameters.insert(
                format!("MarketplaceIdList.Id.{}", index + 1),
                marketplace_id.as_str(),
            );
        }
    }

    parameters
}

/// Builds and signs a request for `action` against `base_url`.
///
/// Optional parameters are merged first and required ones on top, so the
/// required values win on collisions. The timestamp is `now` minus two minutes.
///
/// # Errors
///
/// Returns `Error::InvalidRequest` if `action` is empty and `Error::UrlParse`
/// if `version_uri` cannot be joined onto `base_url`.
pub fn build_signed_request(
    config: &ClientConfig,
    base_url: &Url,
    action: &str,
    version_uri: &str,
    optional_params: &RequestParameters,
    now: DateTime<Utc>,
) -> Result<SignedRequest, Error> {
    if action.is_empty() {
        return Err(Error::invalid_request("Action cannot be empty"));
    }

    let url = base_url.join(version_uri)?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::configuration(format!("Base URL \"{base_url}\" has no host")))?
        .to_string();

    let expand_marketplaces = !optional_params.contains_key(MARKETPLACE_ID_KEY);
    let mut parameters = optional_params.clone();
    parameters.merge(required_parameters(
        config,
        action,
        version_uri,
        expand_marketplaces,
    ));

    parameters.insert("Timestamp", signer::skewed_timestamp(now));

    let xml = parameters.remove(XML_PAYLOAD_KEY);
    if let Some(xml) = &xml {
        parameters.insert("ContentMD5Value", signer::content_md5(xml.as_bytes()));
    }

    // Url keeps its path escaped; the signer encodes each segment itself.
    let path = percent_decode_str(url.path()).decode_utf8_lossy();
    signer::sign_parameters(&mut parameters, &host, &path, config.secret_key());

    let body = match xml {
        Some(xml) => RequestBody::Xml(xml),
        None => RequestBody::Form(parameters.to_encoded_string()),
    };

    Ok(SignedRequest {
        url,
        parameters,
        body,
    })
}
