//! Wire format of the control server.
//!
//! All frames are websocket text frames:
//!
//! * [`status`] - what the device sends: a JSON status report once per
//!   session, followed by bare `ping` frames
//! * [`command`] - what the server sends: JSON objects whose `data.type`
//!   selects the command
//!
//! ```json
//! {"event":"device","data":{"device_ip":"192.168.1.20","mac_address":"...","online":1}}
//! {"data":{"type":"play","audio":"https://cdn.example.com/chime/clip.mp3"}}
//! ```

pub mod command;
pub mod status;

pub use command::Command;
pub use status::{DeviceStatus, Report, PING};
