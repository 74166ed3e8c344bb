//! CLI surfaces for both binaries.

use clap::Parser;

pub const DEFAULT_PORT: u16 = 8637;
pub const DEFAULT_QUERY_PORT: u16 = 8638;

/// store trip data in memory
#[derive(Parser, Debug)]
#[command(
    name = "tripstore",
    version,
    about,
    long_about = "store trip data in memory\n\n\
                   REPORT3 timestamps sent on the query port are parsed as \
                   YYYY-MM-DD HH:MM:SS in this process's local time zone, \
                   then converted to UTC before comparison against stored \
                   trip summaries."
)]
pub struct ServerArgs {
    /// port to listen on for tripgen
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// port to listen on for queries
    #[arg(short = 'q', long = "query-port", default_value_t = DEFAULT_QUERY_PORT)]
    pub query_port: u16,
}

const DEFAULT_MIN_LONG: f32 = -122.30817;
const DEFAULT_MAX_LONG: f32 = -122.22542;
const DEFAULT_MIN_LAT: f32 = 37.42445;
const DEFAULT_MAX_LAT: f32 = 37.48479;
const DEFAULT_MIN_MINUTES: f32 = 2.0;
const DEFAULT_MAX_MINUTES: f32 = 10.0;
const DEFAULT_THREADS: usize = 16;

/// generate trip data
#[derive(Parser, Debug, Clone)]
#[command(name = "tripgen", version, about, long_about = None)]
pub struct GeneratorArgs {
    /// host to connect to
    #[arg(short = 'H', long = "host", default_value = "127.0.0.1")]
    pub host: String,

    /// port to connect to
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// minimum longitude value (minute.second encoded)
    #[arg(short = 'x', long = "minlong", default_value_t = DEFAULT_MIN_LONG)]
    pub min_long: f32,

    /// maximum longitude value
    #[arg(short = 'X', long = "maxlong", default_value_t = DEFAULT_MAX_LONG)]
    pub max_long: f32,

    /// minimum latitude value
    #[arg(short = 'y', long = "minlat", default_value_t = DEFAULT_MIN_LAT)]
    pub min_lat: f32,

    /// maximum latitude value
    #[arg(short = 'Y', long = "maxlat", default_value_t = DEFAULT_MAX_LAT)]
    pub max_lat: f32,

    /// minimum trip duration in minutes
    #[arg(short = 'm', long = "minmins", default_value_t = DEFAULT_MIN_MINUTES)]
    pub min_trip_minutes: f32,

    /// maximum trip duration in minutes
    #[arg(short = 'M', long = "maxmins", default_value_t = DEFAULT_MAX_MINUTES)]
    pub max_trip_minutes: f32,

    /// how many concurrent generator threads to run
    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,
}
