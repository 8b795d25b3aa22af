//! Host services injected into the recorder and its timer
//!
//! Everything that depends on the surrounding environment (current time, engine
//! behaviour) is passed in at construction instead of being looked up globally.

use std::sync::Arc;
use tokio::time::Instant;

/// Source of the current time
///
/// Timer and watchdog scheduling runs on tokio time, so implementations should
/// stay consistent with [`tokio::time::Instant::now`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's time driver (follows `tokio::time::pause` in tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Behavioural profile of the capture engine hosting the recorder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostProfile {
    /// The engine does not reliably deliver pause/resume acknowledgments,
    /// so the recorder synthesizes them from timer ticks.
    pub synthesize_pause_acks: bool,
}

impl HostProfile {
    /// Derive the profile from a user-agent string
    ///
    /// Gecko-based engines are the ones known to drop pause/resume notifications.
    pub fn from_user_agent(user_agent: &str) -> Self {
        Self {
            synthesize_pause_acks: user_agent.contains("Firefox"),
        }
    }
}

/// Bundle of services handed to [`crate::Recorder::new`]
#[derive(Clone)]
pub struct HostServices {
    pub clock: Arc<dyn Clock>,
    pub profile: HostProfile,
}

impl HostServices {
    pub fn new(clock: Arc<dyn Clock>, profile: HostProfile) -> Self {
        Self { clock, profile }
    }

    pub fn with_profile(profile: HostProfile) -> Self {
        Self::new(Arc::new(TokioClock), profile)
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::with_profile(HostProfile::default())
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_user_agent() {
        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
        let chrome = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

        assert!(HostProfile::from_user_agent(firefox).synthesize_pause_acks);
        assert!(!HostProfile::from_user_agent(chrome).synthesize_pause_acks);
        assert!(!HostProfile::default().synthesize_pause_acks);
    }
}
