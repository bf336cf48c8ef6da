use std::env;
use std::fmt;

use secrecy::{ExposeSecret, Secret};
use url::Url;

use crate::error::Error;

/// Application name reported in the User-Agent when none is configured
pub const DEFAULT_APPLICATION_NAME: &str = "MwsRustClient";
pub const DEFAULT_APPLICATION_VERSION: &str = "1.0";
/// North America endpoint
pub const DEFAULT_BASE_URL: &str = "https://mws.amazonservices.com";

/// Every MWS endpoint starts with this prefix, e.g. `https://mws.amazonservices.co.uk`
pub const BASE_URL_PREFIX: &str = "https://mws.amazonservices";

/// Credentials and identity of a seller account, fixed for the lifetime of a client.
pub struct ClientConfig {
    /// Also known as "AWS Access Key ID"
    pub access_key: String,
    pub secret_key: Secret<String>,
    pub seller_id: String,
    /// Expanded in order into `MarketplaceIdList.Id.N`
    pub marketplace_ids: Vec<String>,
    pub mws_auth_token: Secret<String>,
    pub application_name: String,
    pub application_version: String,
    pub base_url: String,
}

impl ClientConfig {
    /// Creates a configuration with the default application identity and endpoint.
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        seller_id: impl Into<String>,
        marketplace_ids: Vec<String>,
        mws_auth_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: Secret::new(secret_key.into()),
            seller_id: seller_id.into(),
            marketplace_ids,
            mws_auth_token: Secret::new(mws_auth_token.into()),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            application_version: DEFAULT_APPLICATION_VERSION.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Loads the configuration from environment variables.
    ///
    /// Required:
    /// - `MWS_ACCESS_KEY`
    /// - `MWS_SECRET_KEY`
    /// - `MWS_SELLER_ID`
    /// - `MWS_MARKETPLACE_IDS`: comma-separated, order is kept
    /// - `MWS_AUTH_TOKEN`
    ///
    /// Optional: `MWS_APPLICATION_NAME`, `MWS_APPLICATION_VERSION`, `MWS_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingEnvVar` for the first required variable that is not
    /// set. The values themselves are checked by [`ClientConfig::validate`].
    pub fn from_env() -> Result<Self, Error> {
        let access_key = required_var("MWS_ACCESS_KEY")?;
        let secret_key = required_var("MWS_SECRET_KEY")?;
        let seller_id = required_var("MWS_SELLER_ID")?;
        let marketplace_ids = required_var("MWS_MARKETPLACE_IDS")?
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        let mws_auth_token = required_var("MWS_AUTH_TOKEN")?;

        let mut config = Self::new(
            access_key,
            secret_key,
            seller_id,
            marketplace_ids,
            mws_auth_token,
        );

        if let Ok(name) = env::var("MWS_APPLICATION_NAME") {
            config.application_name = name;
        }
        if let Ok(version) = env::var("MWS_APPLICATION_VERSION") {
            config.application_version = version;
        }
        if let Ok(base_url) = env::var("MWS_BASE_URL") {
            config.base_url = base_url;
        }

        Ok(config)
    }

    /// Sets the application name and version reported in the User-Agent
    pub fn with_application(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.application_name = name.into();
        self.application_version = version.into();
        self
    }

    /// Sets the regional endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Checks the configuration and returns the parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if:
    /// - the base URL does not contain [`BASE_URL_PREFIX`] or is not a valid URL with a host
    /// - the application name is empty
    /// - the application version is empty
    pub fn validate(&self) -> Result<Url, Error> {
        if !self.base_url.contains(BASE_URL_PREFIX) {
            return Err(Error::configuration(format!(
                "Base URL must contain \"{BASE_URL_PREFIX}\", received \"{}\"",
                self.base_url
            )));
        }

        if self.application_name.is_empty() {
            return Err(Error::configuration("Application name cannot be empty"));
        }

        if self.application_version.is_empty() {
            return Err(Error::configuration("Application version cannot be empty"));
        }

        let base_url = Url::parse(&self.base_url).map_err(|e| {
            Error::configuration(format!("Invalid base URL \"{}\": {e}", self.base_url))
        })?;
        if base_url.host_str().is_none() {
            return Err(Error::configuration(format!(
                "Base URL \"{}\" has no host",
                self.base_url
            )));
        }

        Ok(base_url)
    }

    pub(crate) fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }

    pub(crate) fn mws_auth_token(&self) -> &str {
        self.mws_auth_token.expose_secret()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("seller_id", &self.seller_id)
            .field("marketplace_ids", &self.marketplace_ids)
            .field("mws_auth_token", &"[REDACTED]")
            .field("application_name", &self.application_name)
            .field("application_version", &self.application_version)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn required_var(name: &str) -> Result<String, Error> {
    env::var(name).map_err(|_| Error::MissingEnvVar(name.to_string()))
}
