//! Admission control seam used by the dispatcher before any model work.

/// Decides whether a caller identified by `key` may start a turn now.
pub trait RateGate: Send + Sync {
    fn allow(&self, key: &str) -> bool;
}

/// A gate that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl RateGate for OpenGate {
    fn allow(&self, _key: &str) -> bool {
        true
    }
}
