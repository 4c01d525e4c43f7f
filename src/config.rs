//! Provide configuration for the tidepool executable.
//!
//! A handful of settings come from an optional TOML file, hyphenated keys at
//! the top level:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4318
//! window-ms = 900000
//! bucket-size-ms = 5000
//! ```
//!
//! Anything absent takes its default. Verbosity only comes from the command
//! line.

use clap::{App, Arg};
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use toml;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

/// Configuration of one tidepool run.
#[derive(Clone, Debug, PartialEq)]
pub struct Args {
    /// Interface the HTTP server binds.
    pub host: String,
    /// Port the HTTP server binds.
    pub port: u16,
    /// Retention window in milliseconds.
    pub window_ms: i64,
    /// Bucket width in milliseconds.
    pub bucket_size_ms: i64,
    /// The verbosity setting. The higher the value the more chatty tidepool
    /// gets.
    pub verbose: u64,
    /// Tidepool version string. This is set automatically.
    pub version: String,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            host: "0.0.0.0".into(),
            port: 4318,
            window_ms: 15 * 60 * 1_000,
            bucket_size_ms: 5_000,
            verbose: 0,
            version: VERSION.unwrap_or("unknown").to_string(),
        }
    }
}

impl Args {
    /// `host:port`, as handed to the HTTP server.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Failure to load configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Io(String, io::Error),
    /// The config file is not valid TOML.
    Toml(toml::de::Error),
    /// A key holds a value of the wrong type or out of range.
    Invalid {
        /// The offending key.
        key: &'static str,
        /// What the key needs to be.
        expected: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::Io(ref path, ref e) => {
                write!(f, "could not read config file {}: {}", path, e)
            }
            ConfigError::Toml(ref e) => write!(f, "could not parse config file: {}", e),
            ConfigError::Invalid { key, expected } => write!(f, "{} must be {}", key, expected),
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            ConfigError::Io(_, ref e) => Some(e),
            ConfigError::Toml(ref e) => Some(e),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> ConfigError {
        ConfigError::Toml(e)
    }
}

/// Parse the command line
///
/// Reads the process arguments and, when `-C` names one, the config file.
/// See `tidepool --help`.
pub fn parse_args() -> Result<Args, ConfigError> {
    let args = App::new("tidepool")
        .version(VERSION.unwrap_or("unknown"))
        .about("in-memory OTLP metrics collection and range queries")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .help("The config file to feed in.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .get_matches();

    let verb = if args.is_present("verbose") {
        args.occurrences_of("verbose")
    } else {
        0
    };

    match args.value_of("config-file") {
        Some(filename) => read_config_file(filename, verb),
        None => Ok(Args {
            verbose: verb,
            ..Args::default()
        }),
    }
}

/// Read and parse the config file at `path`.
pub fn read_config_file(path: &str, verbosity: u64) -> Result<Args, ConfigError> {
    let mut buffer = String::new();
    File::open(path)
        .and_then(|mut fp| fp.read_to_string(&mut buffer))
        .map_err(|e| ConfigError::Io(path.to_string(), e))?;
    parse_config_file(&buffer, verbosity)
}

/// Parse the tidepool configuration file.
pub fn parse_config_file(buffer: &str, verbosity: u64) -> Result<Args, ConfigError> {
    let mut args = Args::default();
    let value: toml::Value = toml::from_str(buffer)?;

    args.verbose = verbosity;

    if let Some(host) = value.get("host") {
        args.host = host
            .as_str()
            .filter(|h| !h.is_empty())
            .ok_or(ConfigError::Invalid {
                key: "host",
                expected: "a non-empty string",
            })?
            .to_string();
    }

    if let Some(port) = value.get("port") {
        args.port = port
            .as_integer()
            .filter(|p| *p >= 0 && *p <= i64::from(::std::u16::MAX))
            .ok_or(ConfigError::Invalid {
                key: "port",
                expected: "an integer between 0 and 65535",
            })? as u16;
    }

    args.window_ms = positive_millis(&value, "window-ms")?.unwrap_or(args.window_ms);
    args.bucket_size_ms = positive_millis(&value, "bucket-size-ms")?.unwrap_or(args.bucket_size_ms);

    Ok(args)
}

fn positive_millis(value: &toml::Value, key: &'static str) -> Result<Option<i64>, ConfigError> {
    match value.get(key) {
        None => Ok(None),
        Some(v) => v.as_integer()
            .filter(|ms| *ms > 0)
            .map(Some)
            .ok_or(ConfigError::Invalid {
                key: key,
                expected: "a positive integer of milliseconds",
            }),
    }
}
