use url::Url;

use crate::device::{Device, SetupError};

pub const COAP_SCHEME: &str = "coap";
pub const URL_PARAM: &str = "url";

pub const DEFAULT_DISCOVERY_PATH: &str = "/.well-known/core";
pub const DEFAULT_OBSERVE_SUFFIX: &str = "/obs";
pub const DEFAULT_UPLOAD_SUFFIX: &str = "/test";

/// Resource layout expected on the remote CoAP server.  Every resource is addressed relative to
/// the device's `url` parameter.
#[derive(Debug, Clone)]
pub struct CoapClientConfig {
    discovery_path: String,
    observe_suffix: String,
    upload_suffix: String,
}

impl Default for CoapClientConfig {
    fn default() -> Self {
        Self {
            discovery_path: DEFAULT_DISCOVERY_PATH.to_string(),
            observe_suffix: DEFAULT_OBSERVE_SUFFIX.to_string(),
            upload_suffix: DEFAULT_UPLOAD_SUFFIX.to_string(),
        }
    }
}

impl CoapClientConfig {
    /// Absolute path (same authority as the device) queried during setup.
    pub fn discovery_path(mut self, path: impl Into<String>) -> Self {
        self.discovery_path = path.into();
        self
    }

    /// Appended to the device url's path to form the observable notification resource.
    pub fn observe_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.observe_suffix = suffix.into();
        self
    }

    /// Appended to the device url's path to form the upload resource.
    pub fn upload_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.upload_suffix = suffix.into();
        self
    }

    pub fn discovery_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.set_path(&self.discovery_path);
        url.set_query(None);
        url
    }

    pub fn observe_url(&self, base: &Url) -> Url {
        with_suffix(base, &self.observe_suffix)
    }

    pub fn upload_url(&self, base: &Url) -> Url {
        with_suffix(base, &self.upload_suffix)
    }
}

fn with_suffix(base: &Url, suffix: &str) -> Url {
    let mut url = base.clone();
    let path = format!("{}{suffix}", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url
}

/// Extract and validate the `url` parameter of a CoAP client device.
pub fn parse_device_url(device: &Device) -> Result<Url, SetupError> {
    let raw = device
        .param_value(URL_PARAM)
        .ok_or(SetupError::MissingParam(URL_PARAM))?
        .as_str()
        .ok_or(SetupError::InvalidParam(URL_PARAM))?;
    let url = Url::parse(raw)?;
    if url.scheme() != COAP_SCHEME {
        return Err(SetupError::InvalidScheme {
            found: url.scheme().to_string(),
            expected: COAP_SCHEME,
        });
    }
    Ok(url)
}
