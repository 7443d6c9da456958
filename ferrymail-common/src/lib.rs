pub mod address;
pub mod error;
pub mod logging;
pub mod status;

/// Phases of the two-step server shutdown, broadcast to the accept loop
/// and to every in-flight session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop accepting new connections. Sessions already running continue.
    Shutdown,
    /// Force-terminate running sessions; each says goodbye and exits.
    Quit,
}
