//! Tracing targets used by this crate.
//!
//! The crate only emits events; install a subscriber in the host application
//! to see them:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_lattice_query::recycler=trace")
//!     .init();
//! ```

/// Target names for log filtering.
pub mod targets {
    /// Crate root target.
    pub const QUERY: &str = "horizon_lattice_query";
    /// Mount, update and unmount transitions.
    pub const LIFECYCLE: &str = "horizon_lattice_query::lifecycle";
    /// Handle pooling.
    pub const RECYCLER: &str = "horizon_lattice_query::recycler";
    /// Snapshot projection and unread-error warnings.
    pub const PROJECTION: &str = "horizon_lattice_query::projection";
    /// Engine client changes.
    pub const PROVIDER: &str = "horizon_lattice_query::provider";
    /// Render-notification signals.
    pub const SIGNAL: &str = "horizon_lattice_query::signal";
    /// Unread-error timer queue.
    pub const TIMER: &str = "horizon_lattice_query::timer";
}

#[cfg(test)]
mod tests {
    use super::targets;

    #[test]
    fn test_targets_share_crate_prefix() {
        for target in [
            targets::LIFECYCLE,
            targets::RECYCLER,
            targets::PROJECTION,
            targets::PROVIDER,
            targets::SIGNAL,
            targets::TIMER,
        ] {
            assert!(target.starts_with(targets::QUERY));
        }
    }
}
