use std::net::IpAddr;

use serde::Serialize;

use crate::{config::DeviceProfile, error::Result, identity::DeviceId};

/// Liveness probe sent between status reports.
pub const PING: &str = "ping";

/// Outbound event, serialized as `{"event": <tag>, "data": <payload>}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum Report {
    /// Full presence report sent at the start of every session.
    Device(DeviceStatus),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub app_version: String,
    pub device_ip: String,
    pub device_name: String,
    pub brand_name: String,
    pub device_type: u32,
    /// Carries the device identity; the server keys devices on it.
    pub mac_address: DeviceId,
    /// Always `1`: the report itself is the proof of presence.
    online: u8,
}

impl DeviceStatus {
    #[must_use]
    pub fn new(profile: &DeviceProfile, device_ip: IpAddr, device_id: &DeviceId) -> Self {
        Self {
            app_version: profile.app_version.clone(),
            device_ip: device_ip.to_string(),
            device_name: profile.device_name.clone(),
            brand_name: profile.brand_name.clone(),
            device_type: profile.device_type,
            mac_address: device_id.clone(),
            online: 1,
        }
    }
}

impl Report {
    /// Serializes the report into the text of a frame.
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}
