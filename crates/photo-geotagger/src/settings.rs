use chrono_tz::Tz;
use clap::Parser;
use photo_geotagger_lib::{FLICKR_ENDPOINT, utils::parse_timezone};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Photo Geotagger - Locate your Flickr photos using the GPX track of the same trip
pub struct Settings {
    /// GPX track recorded during the trip
    #[clap(short, long, value_name = "FILE")]
    pub gpx: PathBuf,

    /// Timezone the camera clock was set to (IANA name)
    #[clap(
        short,
        long,
        env = "GEOTAGGER_TIMEZONE",
        default_value = "UTC",
        value_parser = parse_timezone
    )]
    pub timezone: Tz,

    /// Flickr API key
    #[clap(long, env = "FLICKR_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Token of an already authorized Flickr session
    #[clap(long, env = "FLICKR_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Flickr REST endpoint
    #[clap(long, default_value = FLICKR_ENDPOINT)]
    pub endpoint: String,

    /// Request timeout in seconds
    #[clap(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Write the matched locations back to Flickr
    #[clap(long, default_value = "false")]
    pub save: bool,

    /// Also overwrite photos that already have a location (requires --save)
    #[clap(long, default_value = "false", requires = "save")]
    pub override_geo: bool,

    /// Print matched photos as JSON
    #[clap(long, default_value = "false")]
    pub json: bool,
}
