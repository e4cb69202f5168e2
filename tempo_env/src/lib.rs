//! Tempo Environment Abstraction Layer
//!
//! This crate provides the seam that lets the Tempo timeline run against
//! both a **wall clock** (tokio) and a **virtual clock** (simulation).
//!
//! # Core Concept: Time as an Input
//!
//! The timeline never reads the system clock itself. Frame durations come
//! from a [`TimeContext`], and a [`StepPacer`] folds them into whole fixed
//! steps. Swapping the context for a seeded virtual clock makes every run
//! reproducible from its seed number.
//!
//! # Example
//!
//! ```ignore
//! use tempo_env::{StepPacer, TimeContext};
//!
//! async fn frame_loop<Ctx: TimeContext>(ctx: &Ctx, pacer: &mut StepPacer) {
//!     let mut last = ctx.now();
//!     loop {
//!         ctx.sleep(Duration::from_millis(16)).await;
//!         let now = ctx.now();
//!         let frame = pacer.frame(now - last, 1.0);
//!         last = now;
//!         for _ in 0..frame.steps {
//!             step(frame.wall_dt_per_step);
//!         }
//!     }
//! }
//! ```

mod context;
mod error;
mod pacer;
mod tokio_impl;
mod types;

pub use context::TimeContext;
pub use error::EnvError;
pub use pacer::{PacedFrame, StepPacer};
pub use tokio_impl::TokioContext;
pub use types::{PlayerId, Tick, TrackId};
