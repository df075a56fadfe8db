//! Process signals that stop amplink.
//!
//! Ctrl-C stops it on every platform. On Unix, SIGTERM from a service
//! manager does the same. Either one cancels the session loop, which then
//! closes the open session before the process exits.

use std::fmt;

use crate::error::Result;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Which signal asked the process to stop.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Shutdown {
    Interrupt,
    Terminate,
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        })
    }
}

/// Registered listeners for the stop signals.
pub struct Signals {
    #[cfg(unix)]
    terminate: Signal,
}

impl Signals {
    /// Installs the listeners. Must be called from within the runtime.
    pub fn register() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Resolves when the first stop signal arrives.
    pub async fn recv(&mut self) -> Shutdown {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => Shutdown::Interrupt,
                _ = self.terminate.recv() => Shutdown::Terminate,
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            Shutdown::Interrupt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_display_by_name() {
        assert_eq!(Shutdown::Interrupt.to_string(), "SIGINT");
        assert_eq!(Shutdown::Terminate.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn listeners_register_inside_runtime() {
        assert!(Signals::register().is_ok());
    }
}
