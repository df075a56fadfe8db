//! Persistent device identity.
//!
//! The control server knows a device only by the token it reports in the
//! `mac_address` field of its status payload. The token is generated on first
//! start, written to a plain text file and read back on every later start, so
//! that a device keeps its place in the server's device list across restarts.
//!
//! # Example
//!
//! ```no_run
//! use amplink::identity::DeviceId;
//!
//! let device_id = DeviceId::load_or_create("cache.txt")?;
//! println!("reporting as {device_id}");
//! # Ok::<(), amplink::error::Error>(())
//! ```

use std::{fmt, fs, io, path::Path, str::FromStr};

use serde::Serialize;

use crate::{
    error::{Error, Result},
    util,
};

/// Opaque token identifying this device to the control server.
///
/// Generated tokens are twelve random decimal digits followed by the Unix
/// timestamp of their creation.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Identity files hold a single short token.
    const MAX_FILE_SIZE: u64 = 1024;

    /// Exclusive upper bound of the random part, giving twelve digits.
    const RANDOM_BOUND: u64 = 1_000_000_000_000;

    /// Generates a fresh token.
    #[must_use]
    pub fn generate() -> Self {
        let random = fastrand::u64(..Self::RANDOM_BOUND);
        Self(format!("{random:012}{}", util::now_from_epoch()))
    }

    /// Reads the token from `path`, or generates and persists one when the
    /// file does not exist or is empty.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read, is larger than 1 KiB,
    /// or when a new token cannot be written. The device cannot identify
    /// itself in that case, so callers should treat this as fatal.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(device_id) = Self::read(path)? {
            info!("device identity {device_id} loaded from {}", path.display());
            return Ok(device_id);
        }

        let device_id = Self::generate();
        device_id.save(path)?;
        info!("device identity {device_id} written to {}", path.display());

        Ok(device_id)
    }

    fn read(path: &Path) -> Result<Option<Self>> {
        let file_size = match fs::metadata(path) {
            Ok(attributes) => attributes.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        match contents.parse() {
            Ok(device_id) => Ok(Some(device_id)),
            Err(e) => {
                warn!("{} holds no identity ({e}); generating one", path.display());
                Ok(None)
            }
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, &self.0).map_err(Into::into)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Parses a persisted token, ignoring surrounding whitespace.
impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        if token.is_empty() {
            return Err(Error::invalid_argument("device identity is empty"));
        }

        Ok(Self(token.to_owned()))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn generated_tokens_are_digits() {
        let device_id = DeviceId::generate();
        let token = device_id.as_str();

        // Twelve random digits plus at least ten timestamp digits.
        assert!(token.len() >= 22, "{token} is too short");
        assert!(token.chars().all(|chr| chr.is_ascii_digit()));
    }

    #[test]
    fn loading_twice_yields_the_same_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.txt");

        let first = DeviceId::load_or_create(&path).unwrap();
        let second = DeviceId::load_or_create(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&path).unwrap(), first.as_str());
    }

    #[test]
    fn existing_token_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.txt");
        fs::write(&path, "  0042123456781700000000\n").unwrap();

        let device_id = DeviceId::load_or_create(&path).unwrap();
        assert_eq!(device_id.as_str(), "0042123456781700000000");
    }

    #[test]
    fn empty_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.txt");
        fs::write(&path, "\n").unwrap();

        let device_id = DeviceId::load_or_create(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), device_id.as_str());
    }

    #[test]
    fn missing_parent_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("cache.txt");

        let device_id = DeviceId::load_or_create(&path).unwrap();
        assert_eq!(DeviceId::load_or_create(&path).unwrap(), device_id);
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.txt");
        fs::write(&path, "7".repeat(4096)).unwrap();

        let err = DeviceId::load_or_create(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn serializes_as_plain_string() {
        let device_id: DeviceId = "0042123456781700000000".parse().unwrap();
        assert_eq!(
            serde_json::to_string(&device_id).unwrap(),
            "\"0042123456781700000000\""
        );
    }
}
