use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

/// Control server that devices report to unless configured otherwise.
pub const DEFAULT_ENDPOINT: &str = "wss://cd.api.yingzhu.net/screen.io";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub endpoint: Url,

    pub identity_file: PathBuf,
    pub cache_dir: PathBuf,

    /// Player program overriding the platform default.
    pub player: Option<PathBuf>,

    pub device: DeviceProfile,

    #[serde(skip)]
    pub timing: Timing,
}

/// Fixed metadata reported in every status payload.
#[derive(Clone, Debug, Deserialize, Hash, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceProfile {
    pub app_version: String,
    pub device_name: String,
    pub brand_name: String,
    pub device_type: u32,
}

/// Delays and bounds of the session lifecycle.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct Timing {
    /// Wait between a failed or ended session and the next dial.
    pub reconnect_delay: Duration,
    /// Period of liveness pings after the status report.
    pub heartbeat_interval: Duration,
    /// Wait between status report attempts.
    pub status_retry_delay: Duration,
    /// Total number of status report attempts per session.
    pub status_attempts: u32,
    pub connect_timeout: Option<Duration>,
    /// Upper bound on sending the close frame at teardown.
    pub close_timeout: Duration,
}

impl Config {
    /// Config files are small; anything larger is not ours.
    const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Loads a TOML config file. Missing keys take their default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config = toml::from_str::<Self>(&contents)?;
        trace!("config from {}: {config:#?}", path.display());

        Ok(config)
    }

    /// `User-Agent` sent with media downloads.
    #[must_use]
    pub fn user_agent(&self) -> String {
        let app_name = env!("CARGO_PKG_NAME");
        let app_version = env!("CARGO_PKG_VERSION");

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.contains(['/', ';']))
            .unwrap_or_else(|| String::from("0"));

        format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("invalid default endpoint"),
            identity_file: PathBuf::from("cache.txt"),
            cache_dir: PathBuf::from("audio_cache"),
            player: None,
            device: DeviceProfile::default(),
            timing: Timing::default(),
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            app_version: "V1.0.0.0".to_owned(),
            device_name: "智能功放".to_owned(),
            brand_name: "赢筑".to_owned(),
            device_type: 90014,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            status_retry_delay: Duration::from_secs(2),
            status_attempts: 3,
            connect_timeout: Some(Duration::from_secs(30)),
            close_timeout: Duration::from_secs(5),
        }
    }
}
