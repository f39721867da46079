use crate::metadata::log_version_info;
use crate::settings::Settings;
use photo_geotagger_lib::{
    FlickrClient, FlickrCredentials, GeotagError, GpxTrack, MatchedPhoto, PhotoMatcher,
    TrackSource,
};
use std::io::Write;
use std::time::Duration;

/// Install the fmt subscriber, honouring `RUST_LOG` and defaulting to `info`
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Match the user's photos against the track and optionally save the locations
pub fn run(settings: Settings) -> Result<(), GeotagError> {
    log_version_info();

    let track = GpxTrack::open(&settings.gpx)?;
    let bounds = track.bounds();
    tracing::info!(
        file = %settings.gpx.display(),
        points = track.len(),
        distance_km = track.total_distance() / 1000.0,
        start = %bounds.start,
        end = %bounds.end,
        "Loaded GPX track"
    );

    let credentials = FlickrCredentials::new(settings.api_key, settings.auth_token);
    let client = FlickrClient::with_endpoint(
        settings.endpoint,
        credentials,
        Duration::from_secs(settings.timeout_secs),
    )?;

    let mut matcher = PhotoMatcher::new(client, track, settings.timezone);
    let photos = matcher.localized_photos()?;

    let mut stdout = std::io::stdout().lock();
    if settings.json {
        serde_json::to_writer_pretty(&mut stdout, &*photos).map_err(std::io::Error::from)?;
        writeln!(stdout)?;
    } else {
        for photo in photos.iter() {
            writeln!(stdout, "{}", describe(photo))?;
        }
    }

    tracing::info!(
        matched = photos.len(),
        geotagged = matcher.count_geotagged()?,
        not_geotagged = matcher.count_not_geotagged()?,
        "Matching finished"
    );

    if settings.save {
        let summary = matcher.save_locations(None, settings.override_geo)?;
        writeln!(
            stdout,
            "Saved {} location(s), kept {} existing",
            summary.written, summary.skipped
        )?;
    }

    Ok(())
}

/// One line per photo: id, UTC capture time, location and page
fn describe(photo: &MatchedPhoto) -> String {
    format!(
        "{}\t{}\t{:.6},{:.6}\t{}{}",
        photo.id,
        photo.taken_at.format("%Y-%m-%d %H:%M:%SZ"),
        photo.latitude,
        photo.longitude,
        photo.canonical_url,
        if photo.has_existing_geo {
            "\t(already geotagged)"
        } else {
            ""
        }
    )
}
