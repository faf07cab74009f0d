//! Rate limiting algorithms and the engine facade.

mod algorithm;
mod decision;
mod fixed_window;
mod limiter;
mod locks;
mod quota;
mod sliding_counter;
mod sliding_log;
mod token_bucket;
mod wrap;

pub use algorithm::Algorithm;
pub use decision::Decision;
pub use fixed_window::FixedWindow;
pub use limiter::{RateLimiter, RateLimiterBuilder};
pub use quota::Quota;
pub use sliding_counter::SlidingWindowCounter;
pub use sliding_log::SlidingWindowLog;
pub use token_bucket::TokenBucket;
pub use wrap::{rate_limit, CallKey, RateLimited, DEFAULT_IDENTITY};
