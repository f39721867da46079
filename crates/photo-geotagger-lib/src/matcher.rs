//! PhotoMatcher - Matches the user's photos against a track
//!
//! The matcher asks the photo host for every photo taken while the track was
//! recording, converts each capture time to UTC and tags the photo with the
//! track point closest in time. Derived collections are memoized in a
//! [`MatchCache`] until the timezone changes.

use crate::cache::{CacheKey, CachedValue, MatchCache};
use crate::host::{HostPhoto, PhotoHost, PhotoSearch};
use crate::track::{TrackBounds, TrackPoint, TrackSource};
use crate::{Result, utils};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Maximum number of photos requested from the host in a single pass
pub const SEARCH_PAGE_SIZE: u32 = 500;

/// Metadata requested with every search result
pub const SEARCH_EXTRAS: [&str; 5] = ["geo", "url_t", "url_s", "date_taken", "path_alias"];

const PHOTO_PAGE_URL: &str = "http://flickr.com/photos";

/// A photo with the location of the nearest track point
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchedPhoto {
    pub id: String,
    pub title: String,
    /// Capture time converted to UTC
    pub taken_at: DateTime<Utc>,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub canonical_url: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Whether the host already had a location before matching
    pub has_existing_geo: bool,
}

impl MatchedPhoto {
    fn from_host(photo: HostPhoto, taken_at: DateTime<Utc>, location: TrackPoint) -> Self {
        let has_existing_geo = photo.has_existing_geo();
        let canonical_url = match photo.owner_alias() {
            Some(alias) => format!("{}/{}/{}", PHOTO_PAGE_URL, alias, photo.id),
            None => format!("http://flickr.com/photo.gne?id={}", photo.id),
        };

        Self {
            id: photo.id,
            title: photo.title,
            taken_at,
            url: photo.url_s,
            thumbnail_url: photo.url_t,
            canonical_url,
            latitude: location.latitude,
            longitude: location.longitude,
            has_existing_geo,
        }
    }
}

/// Outcome of a write-back
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Photos whose location was sent to the host
    pub written: usize,
    /// Photos left untouched because they already had a location
    pub skipped: usize,
}

/// Matches photos from a [`PhotoHost`] against a [`TrackSource`]
pub struct PhotoMatcher<H, T> {
    host: H,
    track: T,
    timezone: Tz,
    cache: MatchCache,
}

impl<H: PhotoHost, T: TrackSource> PhotoMatcher<H, T> {
    /// Create a matcher reading capture times as local time in `timezone`
    pub fn new(host: H, track: T, timezone: Tz) -> Self {
        Self {
            host,
            track,
            timezone,
            cache: MatchCache::new(),
        }
    }

    #[inline]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    #[inline]
    pub fn host(&self) -> &H {
        &self.host
    }

    #[inline]
    pub fn track(&self) -> &T {
        &self.track
    }

    #[inline]
    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    /// Change the timezone of the photos' capture times
    ///
    /// Every cached result is dropped.
    pub fn set_timezone(&mut self, timezone: Tz) {
        self.cache.clear();
        self.timezone = timezone;
        tracing::debug!(%timezone, "Timezone changed, cache cleared");
    }

    /// Photos taken during the track, each tagged with the nearest track point
    ///
    /// The host is queried once per timezone; later calls return the cached
    /// result. A capture time the host reports in an unexpected format aborts
    /// the pass.
    pub fn localized_photos(&mut self) -> Result<Arc<[MatchedPhoto]>> {
        if let Some(photos) = self.cache.photos(CacheKey::LocalizedPhotos) {
            return Ok(photos);
        }

        let photos: Arc<[MatchedPhoto]> = self.match_photos()?.into();
        self.cache.insert(
            CacheKey::LocalizedPhotos,
            CachedValue::Photos(Arc::clone(&photos)),
        );
        Ok(photos)
    }

    /// Number of matched photos that already had a location on the host
    pub fn count_geotagged(&mut self) -> Result<usize> {
        if let Some(count) = self.cache.count(CacheKey::GeotaggedCount) {
            return Ok(count);
        }

        let count = self
            .localized_photos()?
            .iter()
            .filter(|photo| photo.has_existing_geo)
            .count();
        self.cache
            .insert(CacheKey::GeotaggedCount, CachedValue::Count(count));
        Ok(count)
    }

    /// Number of matched photos without a location on the host
    pub fn count_not_geotagged(&mut self) -> Result<usize> {
        if let Some(count) = self.cache.count(CacheKey::NotGeotaggedCount) {
            return Ok(count);
        }

        let total = self.localized_photos()?.len();
        let count = total - self.count_geotagged()?;
        self.cache
            .insert(CacheKey::NotGeotaggedCount, CachedValue::Count(count));
        Ok(count)
    }

    /// Write matched locations back to the host
    ///
    /// Defaults to [`Self::localized_photos`] when `photos` is `None`. Photos
    /// that already have a location are skipped unless `override_existing_geo`
    /// is set. The first failed write stops the batch and its error is
    /// returned; photos written before it stay written.
    pub fn save_locations(
        &mut self,
        photos: Option<&[MatchedPhoto]>,
        override_existing_geo: bool,
    ) -> Result<SaveSummary> {
        let localized;
        let photos = match photos {
            Some(photos) => photos,
            None => {
                localized = self.localized_photos()?;
                &localized[..]
            }
        };

        let mut summary = SaveSummary::default();
        for photo in photos {
            if photo.has_existing_geo && !override_existing_geo {
                tracing::debug!(photo_id = %photo.id, "Keeping existing location");
                summary.skipped += 1;
                continue;
            }

            if let Err(err) = self
                .host
                .set_location(&photo.id, photo.latitude, photo.longitude)
            {
                tracing::error!(
                    photo_id = %photo.id,
                    written = summary.written,
                    "Failed to save location, aborting remaining photos: {err}"
                );
                return Err(err.into());
            }
            summary.written += 1;
        }

        tracing::info!(
            written = summary.written,
            skipped = summary.skipped,
            "Saved photo locations"
        );
        Ok(summary)
    }

    /// Search window: the track bounds as wall-clock time in the timezone
    fn search_query(&self, bounds: TrackBounds) -> PhotoSearch {
        PhotoSearch {
            user_id: "me".to_string(),
            min_taken_date: utils::utc_to_local(bounds.start, self.timezone),
            max_taken_date: utils::utc_to_local(bounds.end, self.timezone),
            per_page: SEARCH_PAGE_SIZE,
            extras: SEARCH_EXTRAS.iter().map(|extra| extra.to_string()).collect(),
        }
    }

    fn match_photos(&self) -> Result<Vec<MatchedPhoto>> {
        let bounds = self.track.bounds();
        let candidates = self.host.search(&self.search_query(bounds))?;
        let candidate_count = candidates.len();

        let mut matched = Vec::with_capacity(candidate_count);
        for photo in candidates {
            let local = utils::parse_taken_date(&photo.datetaken)?;
            let taken_at = utils::local_to_utc(local, self.timezone)?;

            // The host's date filter is not authoritative
            if !bounds.contains(taken_at) {
                tracing::debug!(photo_id = %photo.id, %taken_at, "Photo outside track bounds");
                continue;
            }

            let Some(location) = self.track.nearest_point_at(taken_at) else {
                tracing::debug!(photo_id = %photo.id, %taken_at, "No track point for photo");
                continue;
            };

            matched.push(MatchedPhoto::from_host(photo, taken_at, location));
        }

        tracing::info!(
            candidates = candidate_count,
            matched = matched.len(),
            timezone = %self.timezone,
            "Matched photos against track"
        );
        Ok(matched)
    }
}

impl<H, T: TrackSource> fmt::Debug for PhotoMatcher<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoMatcher")
            .field("timezone", &self.timezone)
            .field("bounds", &self.track.bounds())
            .field("cached", &self.cache.keys())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostError;
    use crate::{GeotagError, GpxTrack};
    use chrono::NaiveDate;
    use std::cell::{Cell, RefCell};

    /// In-memory host recording every call
    #[derive(Default)]
    struct FakeHost {
        photos: Vec<HostPhoto>,
        queries: RefCell<Vec<PhotoSearch>>,
        writes: RefCell<Vec<(String, f64, f64)>>,
        fail_write_for: Option<String>,
        search_calls: Cell<usize>,
    }

    impl FakeHost {
        fn with_photos(photos: Vec<HostPhoto>) -> Self {
            Self {
                photos,
                ..Default::default()
            }
        }

        fn written_ids(&self) -> Vec<String> {
            self.writes.borrow().iter().map(|(id, _, _)| id.clone()).collect()
        }
    }

    impl PhotoHost for FakeHost {
        fn search(&self, query: &PhotoSearch) -> std::result::Result<Vec<HostPhoto>, HostError> {
            self.search_calls.set(self.search_calls.get() + 1);
            self.queries.borrow_mut().push(query.clone());
            Ok(self.photos.clone())
        }

        fn set_location(
            &self,
            photo_id: &str,
            latitude: f64,
            longitude: f64,
        ) -> std::result::Result<(), HostError> {
            if self.fail_write_for.as_deref() == Some(photo_id) {
                return Err(HostError::Api {
                    code: 1,
                    message: "Photo not found".into(),
                });
            }
            self.writes
                .borrow_mut()
                .push((photo_id.to_string(), latitude, longitude));
            Ok(())
        }
    }

    /// Track source that never finds a point
    struct EmptyLookupTrack {
        bounds: TrackBounds,
    }

    impl TrackSource for EmptyLookupTrack {
        fn bounds(&self) -> TrackBounds {
            self.bounds
        }

        fn points(&self) -> &[TrackPoint] {
            &[]
        }

        fn nearest_point_at(&self, _timestamp: DateTime<Utc>) -> Option<TrackPoint> {
            None
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_utc()
    }

    fn create_test_track() -> GpxTrack {
        GpxTrack::from_points(vec![
            TrackPoint::new(10.0, 20.0, at(10, 0)),
            TrackPoint::new(11.0, 21.0, at(12, 0)),
        ])
        .unwrap()
    }

    fn create_test_photo(id: &str, taken: &str, geo: Option<(f64, f64)>) -> HostPhoto {
        HostPhoto {
            id: id.to_string(),
            owner: Some("12345678@N00".to_string()),
            title: format!("Photo {id}"),
            datetaken: taken.to_string(),
            latitude: Some(geo.map_or(0.0, |(lat, _)| lat)),
            longitude: Some(geo.map_or(0.0, |(_, lon)| lon)),
            url_s: Some(format!("https://example.com/{id}_m.jpg")),
            url_t: Some(format!("https://example.com/{id}_t.jpg")),
            pathalias: Some("traveller".to_string()),
        }
    }

    fn mixed_photos() -> Vec<HostPhoto> {
        vec![
            create_test_photo("early", "2020-01-01 10:10:00", None),
            create_test_photo("tagged", "2020-01-01 10:50:00", Some((40.0, -3.0))),
            create_test_photo("late", "2020-01-01 11:40:00", None),
        ]
    }

    #[test]
    fn test_photo_between_two_points() {
        let host = FakeHost::with_photos(vec![create_test_photo(
            "1",
            "2020-01-01 11:00:00",
            None,
        )]);
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let photos = matcher.localized_photos().unwrap();
        assert_eq!(photos.len(), 1);

        let photo = &photos[0];
        assert_eq!(photo.taken_at, at(11, 0));
        // Equidistant from both points: the later one wins
        assert_eq!((photo.latitude, photo.longitude), (11.0, 21.0));
        assert!(!photo.has_existing_geo);
        assert_eq!(photo.canonical_url, "http://flickr.com/photos/traveller/1");
        assert_eq!(photo.url.as_deref(), Some("https://example.com/1_m.jpg"));
        assert_eq!(photo.title, "Photo 1");
    }

    #[test]
    fn test_search_window_uses_local_time() {
        let host = FakeHost::default();
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::Europe::Madrid);
        matcher.localized_photos().unwrap();

        let queries = matcher.host().queries.borrow();
        let query = &queries[0];
        let day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert_eq!(query.user_id, "me");
        assert_eq!(query.min_taken_date, day.and_hms_opt(11, 0, 0).unwrap());
        assert_eq!(query.max_taken_date, day.and_hms_opt(13, 0, 0).unwrap());
        assert_eq!(query.per_page, 500);
        assert_eq!(
            query.extras,
            vec!["geo", "url_t", "url_s", "date_taken", "path_alias"]
        );
    }

    #[test]
    fn test_capture_time_converted_from_timezone() {
        // 11:10 in Madrid is 10:10 UTC, nearest to the 10:00 point
        let host = FakeHost::with_photos(vec![create_test_photo(
            "1",
            "2020-01-01 11:10:00",
            None,
        )]);
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::Europe::Madrid);

        let photos = matcher.localized_photos().unwrap();
        assert_eq!(photos[0].taken_at, at(10, 10));
        assert_eq!(photos[0].latitude, 10.0);
    }

    #[test]
    fn test_photos_outside_bounds_are_dropped() {
        let host = FakeHost::with_photos(vec![
            create_test_photo("before", "2020-01-01 09:59:59", None),
            create_test_photo("start", "2020-01-01 10:00:00", None),
            create_test_photo("end", "2020-01-01 12:00:00", None),
            create_test_photo("after", "2020-01-01 12:00:01", None),
        ]);
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let photos = matcher.localized_photos().unwrap();
        let ids: Vec<&str> = photos.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["start", "end"]);
    }

    #[test]
    fn test_photos_without_nearest_point_are_excluded() {
        let host = FakeHost::with_photos(mixed_photos());
        let track = EmptyLookupTrack {
            bounds: create_test_track().bounds(),
        };
        let mut matcher = PhotoMatcher::new(host, track, chrono_tz::UTC);

        assert!(matcher.localized_photos().unwrap().is_empty());
        assert_eq!(matcher.count_geotagged().unwrap(), 0);
        assert_eq!(matcher.count_not_geotagged().unwrap(), 0);
    }

    #[test]
    fn test_malformed_capture_time_aborts_pass() {
        let host = FakeHost::with_photos(vec![
            create_test_photo("good", "2020-01-01 10:30:00", None),
            create_test_photo("bad", "2020-01-01T10:30:00Z", None),
        ]);
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let result = matcher.localized_photos();
        assert!(matches!(result, Err(GeotagError::TakenDateParse { .. })));
        assert!(!matcher.cache().contains(CacheKey::LocalizedPhotos));
    }

    #[test]
    fn test_search_failure_propagates() {
        struct FailingHost;

        impl PhotoHost for FailingHost {
            fn search(&self, _: &PhotoSearch) -> std::result::Result<Vec<HostPhoto>, HostError> {
                Err(HostError::Api {
                    code: 98,
                    message: "Invalid auth token".into(),
                })
            }

            fn set_location(&self, _: &str, _: f64, _: f64) -> std::result::Result<(), HostError> {
                unreachable!()
            }
        }

        let mut matcher = PhotoMatcher::new(FailingHost, create_test_track(), chrono_tz::UTC);
        assert!(matches!(
            matcher.localized_photos(),
            Err(GeotagError::Host(HostError::Api { code: 98, .. }))
        ));
    }

    #[test]
    fn test_counts_add_up() {
        let host = FakeHost::with_photos(mixed_photos());
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let geotagged = matcher.count_geotagged().unwrap();
        let not_geotagged = matcher.count_not_geotagged().unwrap();
        assert_eq!(geotagged, 1);
        assert_eq!(not_geotagged, 2);
        assert_eq!(
            geotagged + not_geotagged,
            matcher.localized_photos().unwrap().len()
        );
        assert_eq!(matcher.host().search_calls.get(), 1);
    }

    #[test]
    fn test_localized_photos_are_cached() {
        let host = FakeHost::with_photos(mixed_photos());
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let first = matcher.localized_photos().unwrap();
        let second = matcher.localized_photos().unwrap();

        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(matcher.host().search_calls.get(), 1);
    }

    #[test]
    fn test_set_timezone_forces_recomputation() {
        let host = FakeHost::with_photos(mixed_photos());
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let utc_photos = matcher.localized_photos().unwrap();
        matcher.count_geotagged().unwrap();
        assert_eq!(matcher.host().search_calls.get(), 1);

        matcher.set_timezone(chrono_tz::Europe::London);
        assert!(matcher.cache().is_empty());
        assert_eq!(matcher.timezone(), chrono_tz::Europe::London);

        let london_photos = matcher.localized_photos().unwrap();
        assert_eq!(matcher.host().search_calls.get(), 2);
        assert!(!Arc::ptr_eq(&utc_photos, &london_photos));
    }

    #[test]
    fn test_save_skips_photos_with_existing_geo() {
        let host = FakeHost::with_photos(mixed_photos());
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let summary = matcher.save_locations(None, false).unwrap();

        assert_eq!(summary, SaveSummary { written: 2, skipped: 1 });
        assert_eq!(matcher.host().written_ids(), vec!["early", "late"]);
        let writes = matcher.host().writes.borrow();
        assert_eq!(writes[0], ("early".to_string(), 10.0, 20.0));
        assert_eq!(writes[1], ("late".to_string(), 11.0, 21.0));
    }

    #[test]
    fn test_save_with_override_writes_everything() {
        let host = FakeHost::with_photos(mixed_photos());
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let summary = matcher.save_locations(None, true).unwrap();

        assert_eq!(summary, SaveSummary { written: 3, skipped: 0 });
        assert_eq!(matcher.host().written_ids(), vec!["early", "tagged", "late"]);
    }

    #[test]
    fn test_save_explicit_selection() {
        let host = FakeHost::with_photos(mixed_photos());
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let photos = matcher.localized_photos().unwrap();
        let selection: Vec<MatchedPhoto> = photos
            .iter()
            .filter(|photo| photo.id != "early")
            .cloned()
            .collect();
        let summary = matcher.save_locations(Some(&selection), false).unwrap();

        assert_eq!(summary, SaveSummary { written: 1, skipped: 1 });
        assert_eq!(matcher.host().written_ids(), vec!["late"]);
        assert_eq!(matcher.host().search_calls.get(), 1);
    }

    #[test]
    fn test_failed_write_aborts_batch() {
        let host = FakeHost {
            photos: mixed_photos(),
            fail_write_for: Some("tagged".to_string()),
            ..Default::default()
        };
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);

        let result = matcher.save_locations(None, true);

        assert!(matches!(result, Err(GeotagError::Host(HostError::Api { .. }))));
        assert_eq!(matcher.host().written_ids(), vec!["early"]);
    }

    #[test]
    fn test_canonical_url_without_alias() {
        let mut photo = create_test_photo("42", "2020-01-01 10:30:00", None);
        photo.pathalias = None;
        let location = create_test_track().points()[0];
        let with_owner = MatchedPhoto::from_host(photo.clone(), at(10, 30), location);
        assert_eq!(
            with_owner.canonical_url,
            "http://flickr.com/photos/12345678@N00/42"
        );

        photo.owner = None;
        let anonymous = MatchedPhoto::from_host(photo, at(10, 30), location);
        assert_eq!(anonymous.canonical_url, "http://flickr.com/photo.gne?id=42");
    }

    #[test]
    fn test_debug_lists_cached_keys() {
        let host = FakeHost::with_photos(mixed_photos());
        let mut matcher = PhotoMatcher::new(host, create_test_track(), chrono_tz::UTC);
        matcher.count_not_geotagged().unwrap();

        let debug = format!("{:?}", matcher);
        assert!(debug.contains("LocalizedPhotos"));
        assert!(debug.contains("NotGeotaggedCount"));
        assert!(debug.contains("UTC"));
    }
}
