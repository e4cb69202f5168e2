//! Simulation context implementing TimeContext for deterministic testing.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempo_env::TimeContext;

/// Simulation context backed by a virtual clock and a seeded RNG.
///
/// - `now()` reads a virtual nanosecond counter
/// - `sleep()` advances that counter instead of blocking
/// - `jittered()` perturbs frame durations from a seeded ChaCha8 stream
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Deterministic RNG for frame jitter
    rng: Arc<Mutex<ChaCha8Rng>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        *lock(&self.virtual_time_ns) += duration.as_nanos() as u64;
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        *lock(&self.virtual_time_ns) = time_ns;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *lock(&self.virtual_time_ns)
    }

    /// A frame duration around `base` with relative standard deviation
    /// `spread`, never negative.
    pub fn jittered(&self, base: Duration, spread: f64) -> Duration {
        let base_secs = base.as_secs_f64();
        let sigma = (base_secs * spread).abs();
        if sigma == 0.0 {
            return base;
        }
        let sample = match Normal::new(base_secs, sigma) {
            Ok(normal) => normal.sample(&mut *lock(&self.rng)),
            Err(_) => base_secs,
        };
        Duration::from_secs_f64(sample.max(0.0))
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            rng: Arc::clone(&self.rng),
        }
    }
}

#[async_trait]
impl TimeContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        // Sleeping advances virtual time; nothing blocks
        self.advance_time(duration);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
