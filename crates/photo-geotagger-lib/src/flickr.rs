//! Flickr REST client
//!
//! Implements [`PhotoHost`] on top of `flickr.photos.search` and
//! `flickr.photos.geo.setLocation`. The client is handed credentials obtained
//! elsewhere; it does not run the authorization flow itself.

use crate::host::{HostError, HostPhoto, PhotoHost, PhotoSearch};
use crate::utils::TAKEN_DATE_FORMAT;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const FLICKR_ENDPOINT: &str = "https://api.flickr.com/services/rest/";
const USER_AGENT: &str = concat!("photo-geotagger/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials of an already authorized Flickr user
#[derive(Clone)]
pub struct FlickrCredentials {
    pub api_key: String,
    pub auth_token: Option<String>,
}

impl FlickrCredentials {
    pub fn new(api_key: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            auth_token,
        }
    }
}

impl std::fmt::Debug for FlickrCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlickrCredentials")
            .field("api_key", &"<redacted>")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Blocking Flickr API client
#[derive(Debug)]
pub struct FlickrClient {
    http_client: Client,
    endpoint: String,
    credentials: FlickrCredentials,
}

/// `{"stat": "ok" | "fail", ...}` wrapper around every response
#[derive(Debug, Deserialize)]
struct Envelope {
    stat: String,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    photos: PhotoPage,
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default)]
    photo: Vec<HostPhoto>,
}

impl FlickrClient {
    pub fn new(credentials: FlickrCredentials) -> Result<Self, HostError> {
        Self::with_endpoint(FLICKR_ENDPOINT, credentials, DEFAULT_TIMEOUT)
    }

    /// Client against a custom endpoint with a per-request timeout
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        credentials: FlickrCredentials,
        timeout: Duration,
    ) -> Result<Self, HostError> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Parameters shared by every call
    fn base_params(&self, method: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("method", method.to_string()),
            ("api_key", self.credentials.api_key.clone()),
            ("format", "json".to_string()),
            ("nojsoncallback", "1".to_string()),
        ];
        if let Some(token) = &self.credentials.auth_token {
            params.push(("auth_token", token.clone()));
        }
        params
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<T, HostError> {
        tracing::debug!(method, "Calling Flickr API");

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(HostError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text()?;
        decode_response(&body)
    }
}

/// Check the response envelope, then decode the payload
fn decode_response<T: DeserializeOwned>(body: &str) -> Result<T, HostError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let envelope = Envelope::deserialize(&value)?;
    if envelope.stat != "ok" {
        return Err(HostError::Api {
            code: envelope.code,
            message: envelope.message,
        });
    }
    Ok(T::deserialize(value)?)
}

/// Query parameters for `flickr.photos.search`
fn search_params(query: &PhotoSearch) -> Vec<(&'static str, String)> {
    vec![
        ("user_id", query.user_id.clone()),
        (
            "min_taken_date",
            query.min_taken_date.format(TAKEN_DATE_FORMAT).to_string(),
        ),
        (
            "max_taken_date",
            query.max_taken_date.format(TAKEN_DATE_FORMAT).to_string(),
        ),
        ("per_page", query.per_page.to_string()),
        ("extras", query.extras.join(",")),
    ]
}

impl PhotoHost for FlickrClient {
    fn search(&self, query: &PhotoSearch) -> Result<Vec<HostPhoto>, HostError> {
        const METHOD: &str = "flickr.photos.search";

        let mut params = self.base_params(METHOD);
        params.extend(search_params(query));

        let request = self.http_client.get(self.endpoint.as_str()).query(&params);
        let response: SearchResponse = self.send(METHOD, request)?;

        tracing::debug!(photos = response.photos.photo.len(), "Flickr search returned");
        Ok(response.photos.photo)
    }

    fn set_location(
        &self,
        photo_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), HostError> {
        const METHOD: &str = "flickr.photos.geo.setLocation";

        let mut params = self.base_params(METHOD);
        params.push(("photo_id", photo_id.to_string()));
        params.push(("lat", latitude.to_string()));
        params.push(("lon", longitude.to_string()));

        let request = self.http_client.post(self.endpoint.as_str()).form(&params);
        let _: serde_json::Value = self.send(METHOD, request)?;
        Ok(())
    }
}
