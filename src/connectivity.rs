//! Connectivity state shared between the session loop and the heartbeat.
//!
//! The flag is `true` only while a session is open and believed healthy.
//! The [`Controller`](crate::remote::Controller) raises it after a successful
//! dial and lowers it whenever a session ends; the dispatcher lowers it early
//! on abnormal closure. The heartbeat reads it before every write.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cloneable handle to the process-wide connectivity flag.
#[derive(Clone, Debug, Default)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    /// Creates a flag that starts offline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Marks the session as healthy. Returns whether the flag changed.
    pub fn set_online(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Marks the session as gone. Returns whether the flag changed.
    pub fn set_offline(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_offline() {
        assert!(!Connectivity::new().is_online());
    }

    #[test]
    fn clones_share_state() {
        let controller = Connectivity::new();
        let heartbeat = controller.clone();

        assert!(controller.set_online());
        assert!(heartbeat.is_online());

        assert!(heartbeat.set_offline());
        assert!(!controller.is_online());
    }

    #[test]
    fn reports_only_changes() {
        let connectivity = Connectivity::new();
        assert!(!connectivity.set_offline());
        assert!(connectivity.set_online());
        assert!(!connectivity.set_online());
    }
}
