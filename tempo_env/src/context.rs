//! Core time context trait for the Tempo timeline driver.

use async_trait::async_trait;
use std::time::Duration;

/// The central interface for reading and waiting on time.
///
/// This trait abstracts the "real world" clock so that the frame loop
/// driving a timeline can run in both production and simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `std::time::Instant` and `tokio::time`
/// - **Simulation**: `SimContext` - a virtual clock advanced by the harness
///
/// # Determinism
///
/// For DST, every source of elapsed time is owned by the implementation.
/// A simulation context never consults the host clock.
#[async_trait]
pub trait TimeContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;
    
    /// Suspends the caller for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);
    
    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
