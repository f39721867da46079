//! Track storage and nearest-in-time lookup
//!
//! This module provides the `TrackSource` trait and its GPX-backed
//! implementation, `GpxTrack`, which keeps every timestamped point alongside a
//! time-sorted index for lookups.

use crate::{GeotagError, Result, utils};
use chrono::{DateTime, TimeDelta, Utc};
use std::io::Read;
use std::path::Path;

/// A single timestamped location of a track
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// Location as a geo point (x = longitude, y = latitude)
    #[inline]
    pub fn position(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

/// Time interval covered by a track, `start <= end`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TrackBounds {
    /// Whether `instant` lies inside the bounds (both ends inclusive)
    #[inline]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    #[inline]
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// Source of timestamped track points
pub trait TrackSource {
    /// Time interval spanned by the track
    fn bounds(&self) -> TrackBounds;

    /// All points, in the order they were recorded in the source data
    fn points(&self) -> &[TrackPoint];

    /// The point closest in time to `timestamp`, or `None` for a track without points
    fn nearest_point_at(&self, timestamp: DateTime<Utc>) -> Option<TrackPoint>;
}

/// A GPS track parsed from GPX data
#[derive(Clone, Debug)]
pub struct GpxTrack {
    /// Timestamped points in document order
    points: Vec<TrackPoint>,
    /// Indices into `points`, sorted by timestamp (stable)
    by_time: Vec<usize>,
    /// Earliest and latest timestamp
    bounds: TrackBounds,
}

impl GpxTrack {
    /// Parse GPX data from a reader
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let gpx_data = gpx::read(reader)?;
        Self::from_gpx(gpx_data)
    }

    /// Parse a GPX file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        Self::parse(reader)
    }

    /// Build a track from an already parsed GPX document
    ///
    /// Points without a timestamp cannot be matched and are skipped. Fails with
    /// [`GeotagError::EmptyTrack`] if no point carries a timestamp.
    pub fn from_gpx(gpx_data: gpx::Gpx) -> Result<Self> {
        let mut points = Vec::new();

        for track in &gpx_data.tracks {
            for segment in &track.segments {
                for waypoint in &segment.points {
                    let point = waypoint.point();
                    let Some(timestamp) = waypoint.time.as_ref().and_then(gpx_time_to_utc)
                    else {
                        tracing::warn!(
                            "Skipping track point without usable time: ({}, {})",
                            point.y(),
                            point.x()
                        );
                        continue;
                    };
                    points.push(TrackPoint::new(point.y(), point.x(), timestamp));
                }
            }
        }

        Self::from_points(points)
    }

    /// Build a track from points given in recording order
    pub fn from_points(points: Vec<TrackPoint>) -> Result<Self> {
        let mut by_time: Vec<usize> = (0..points.len()).collect();
        by_time.sort_by_key(|&i| points[i].timestamp);

        let (Some(&first), Some(&last)) = (by_time.first(), by_time.last()) else {
            return Err(GeotagError::EmptyTrack);
        };
        let bounds = TrackBounds {
            start: points[first].timestamp,
            end: points[last].timestamp,
        };

        tracing::debug!(
            points = points.len(),
            start = %bounds.start,
            end = %bounds.end,
            "Loaded track"
        );

        Ok(Self {
            points,
            by_time,
            bounds,
        })
    }

    /// Number of timestamped points
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the track has no timestamped points
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Length of the track in meters, following points in recording order
    pub fn total_distance(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| {
                utils::haversine_distance(
                    (pair[0].latitude, pair[0].longitude),
                    (pair[1].latitude, pair[1].longitude),
                )
            })
            .sum()
    }
}

impl TrackSource for GpxTrack {
    #[inline]
    fn bounds(&self) -> TrackBounds {
        self.bounds
    }

    #[inline]
    fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Binary search over the time-sorted index.
    ///
    /// When both neighbours are equally far the later one wins. Points sharing
    /// a timestamp resolve to the first recorded.
    fn nearest_point_at(&self, timestamp: DateTime<Utc>) -> Option<TrackPoint> {
        let split = self
            .by_time
            .partition_point(|&i| self.points[i].timestamp < timestamp);

        // The last entry before the split may end a run of equal timestamps
        let before = split.checked_sub(1).map(|i| {
            let run_timestamp = self.points[self.by_time[i]].timestamp;
            let first = self
                .by_time
                .partition_point(|&j| self.points[j].timestamp < run_timestamp);
            self.points[self.by_time[first]]
        });
        let after = self.by_time.get(split).map(|&i| self.points[i]);

        match (before, after) {
            (Some(before), Some(after)) => {
                let before_gap = timestamp - before.timestamp;
                let after_gap = after.timestamp - timestamp;
                if after_gap <= before_gap {
                    Some(after)
                } else {
                    Some(before)
                }
            }
            (before, after) => after.or(before),
        }
    }
}

/// Convert a GPX timestamp to a chrono UTC instant
fn gpx_time_to_utc(time: &gpx::Time) -> Option<DateTime<Utc>> {
    let instant = time::OffsetDateTime::from(time.clone());
    DateTime::from_timestamp(instant.unix_timestamp(), instant.nanosecond())
}
