//! Photo Geotagger Library - Time Correlation of Photos and GPS Tracks
//!
//! This library assigns a location to every photo taken during a recorded GPS
//! track. A photo's capture time (local, in a user-chosen timezone) is converted
//! to UTC and matched against the nearest-in-time track point. The match can then
//! be written back to the photo host.
//!
//! # Architecture
//!
//! - **[`TrackSource`]**: Ordered, timestamped points with nearest-in-time lookup
//! - **[`GpxTrack`]**: `TrackSource` backed by a parsed GPX document
//! - **[`PhotoMatcher`]**: Fetches candidate photos, matches them and writes back
//! - **[`MatchCache`]**: Memo of derived collections, cleared on timezone change
//! - **[`PhotoHost`]**: Search and write-back capability of the photo host
//! - **[`FlickrClient`]**: `PhotoHost` over the Flickr REST API
//!
//! # Example
//!
//! ```no_run
//! use photo_geotagger_lib::{FlickrClient, FlickrCredentials, GpxTrack, PhotoMatcher};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let track = GpxTrack::open("trip.gpx")?;
//! let client = FlickrClient::new(FlickrCredentials::new("api-key", Some("token".into())))?;
//! let mut matcher = PhotoMatcher::new(client, track, chrono_tz::Europe::Madrid);
//!
//! for photo in matcher.localized_photos()?.iter() {
//!     println!("{} -> ({}, {})", photo.id, photo.latitude, photo.longitude);
//! }
//! matcher.save_locations(None, false)?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod flickr;
mod host;
mod matcher;
mod track;
pub mod utils;

// Public API exports
pub use cache::{CacheKey, CachedValue, MatchCache};
pub use flickr::{FLICKR_ENDPOINT, FlickrClient, FlickrCredentials};
pub use host::{HostError, HostPhoto, PhotoHost, PhotoSearch};
pub use matcher::{MatchedPhoto, PhotoMatcher, SaveSummary};
pub use track::{GpxTrack, TrackBounds, TrackPoint, TrackSource};

/// Error types for the geotagging core
#[derive(Debug, thiserror::Error)]
pub enum GeotagError {
    #[error("GPX parsing error: {0}")]
    TrackParse(#[from] gpx::errors::GpxError),

    #[error("Track contains no timestamped points")]
    EmptyTrack,

    #[error("Invalid capture time {value:?}: {source}")]
    TakenDateParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Local time {local} does not exist in {timezone}")]
    NonexistentLocalTime {
        local: chrono::NaiveDateTime,
        timezone: chrono_tz::Tz,
    },

    #[error("Photo host error: {0}")]
    Host(#[from] HostError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GeotagError>;
