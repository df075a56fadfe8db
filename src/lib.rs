//! Persistent control client for networked amplifiers.
//!
//! `amplink` keeps a websocket session open with a control server, reports
//! the device's presence when each session starts, pings while it lasts and
//! plays audio on command:
//!
//! * [`remote::Controller`] dials, runs and tears down sessions, reconnecting
//!   after a fixed delay
//! * [`heartbeat::Heartbeat`] owns the write half: one status report, then
//!   periodic pings
//! * [`dispatcher::dispatch`] owns the read half and executes `play` commands
//!   through the [`cache::MediaCache`] and the [`player::Player`]
//! * [`identity::DeviceId`] is the token the server knows the device by,
//!   persisted across restarts
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod http;
pub mod identity;
pub mod player;
pub mod protocol;
pub mod remote;
pub mod session;
pub mod signal;
pub mod util;

#[cfg(test)]
mod test_fixtures;
