//! Turnstile - Per-Identity Admission Control
//!
//! This crate decides, per caller identity, whether a unit of work may proceed
//! now under a configured quota. It ships four admission algorithms (token
//! bucket, fixed window, sliding window log, sliding window counter) behind a
//! single `allow` call, over a storage contract that can be served in-process
//! or by a shared external store.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod storage;

pub use error::{Result, TurnstileError};
pub use ratelimit::{Algorithm, Decision, Quota, RateLimited, RateLimiter};
