//! Photo host abstraction
//!
//! The matcher only needs two capabilities from the photo host: searching the
//! authenticated user's photos by capture date and setting a photo's location.
//! Authentication happens before a `PhotoHost` is handed to the matcher.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Search parameters for the user's photos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoSearch {
    /// Owner of the photos, `me` for the authenticated user
    pub user_id: String,
    /// Earliest capture time, local to the photos' timezone
    pub min_taken_date: NaiveDateTime,
    /// Latest capture time, local to the photos' timezone
    pub max_taken_date: NaiveDateTime,
    pub per_page: u32,
    /// Extra metadata fields to include in every result
    pub extras: Vec<String>,
}

/// A photo as returned by the host search
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HostPhoto {
    pub id: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub title: String,
    /// Capture time as `YYYY-MM-DD HH:MM:SS`, local time
    #[serde(default)]
    pub datetaken: String,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub url_s: Option<String>,
    #[serde(default)]
    pub url_t: Option<String>,
    #[serde(default)]
    pub pathalias: Option<String>,
}

impl HostPhoto {
    /// Whether the host already stores a location for this photo
    ///
    /// The host reports photos without a location as `0, 0`.
    pub fn has_existing_geo(&self) -> bool {
        matches!(
            (self.latitude, self.longitude),
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0
        )
    }

    /// Path alias if the owner has one, otherwise the owner id
    pub fn owner_alias(&self) -> Option<&str> {
        self.pathalias
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .or(self.owner.as_deref())
    }
}

/// Capabilities consumed from the photo host
pub trait PhotoHost {
    /// Photos matching `query`, at most `query.per_page` of them
    fn search(&self, query: &PhotoSearch) -> Result<Vec<HostPhoto>, HostError>;

    /// Store a location for a photo
    fn set_location(&self, photo_id: &str, latitude: f64, longitude: f64)
    -> Result<(), HostError>;
}

impl<H: PhotoHost + ?Sized> PhotoHost for &H {
    fn search(&self, query: &PhotoSearch) -> Result<Vec<HostPhoto>, HostError> {
        (**self).search(query)
    }

    fn set_location(
        &self,
        photo_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), HostError> {
        (**self).set_location(photo_id, latitude, longitude)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Coordinates come back as numbers or as numeric strings depending on the call
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<NumberOrText>::deserialize(deserializer)? {
            Some(NumberOrText::Number(value)) => Some(value),
            Some(NumberOrText::Text(text)) => text.trim().parse().ok(),
            None => None,
        },
    )
}
