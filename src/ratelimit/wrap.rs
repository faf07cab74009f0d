//! Wrapping a unit of work with an admission check.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::algorithm::Algorithm;
use super::limiter::RateLimiter;
use super::quota::Quota;
use crate::error::{Result, TurnstileError};

/// Identity used when a call has no arguments.
pub const DEFAULT_IDENTITY: &str = "default";

/// Derives the default identity from a call's arguments.
///
/// Arguments are passed as a tuple; the identity is the first element's string
/// form, or [`DEFAULT_IDENTITY`] for `()`.
pub trait CallKey {
    fn call_key(&self) -> String;
}

impl CallKey for () {
    fn call_key(&self) -> String {
        DEFAULT_IDENTITY.to_string()
    }
}

impl CallKey for String {
    fn call_key(&self) -> String {
        self.clone()
    }
}

impl CallKey for &str {
    fn call_key(&self) -> String {
        (*self).to_string()
    }
}

macro_rules! impl_call_key_for_tuple {
    ($first:ident $(, $rest:ident)*) => {
        impl<$first: fmt::Display $(, $rest)*> CallKey for ($first, $($rest,)*) {
            fn call_key(&self) -> String {
                self.0.to_string()
            }
        }
    };
}

impl_call_key_for_tuple!(A);
impl_call_key_for_tuple!(A, B);
impl_call_key_for_tuple!(A, B, C);
impl_call_key_for_tuple!(A, B, C, D);

type KeyFn<A> = Box<dyn Fn(&A) -> String + Send + Sync>;

/// A function that only runs when its caller is admitted.
///
/// Each [`call`](RateLimited::call) checks the limiter under an identity taken
/// from the arguments. A denied call returns
/// [`TurnstileError::RateLimited`] with the decision and never runs the
/// function; an admitted call runs it exactly once.
pub struct RateLimited<A, F> {
    limiter: Arc<RateLimiter>,
    key_fn: KeyFn<A>,
    func: F,
}

impl<A: CallKey + 'static, F> RateLimited<A, F> {
    /// Wrap `func`, keying calls by their first argument.
    pub fn new(limiter: Arc<RateLimiter>, func: F) -> Self {
        Self {
            limiter,
            key_fn: Box::new(|args: &A| args.call_key()),
            func,
        }
    }
}

impl<A, F> RateLimited<A, F> {
    /// Wrap `func`, keying calls with `key_fn`.
    pub fn with_key_fn<K>(limiter: Arc<RateLimiter>, key_fn: K, func: F) -> Self
    where
        K: Fn(&A) -> String + Send + Sync + 'static,
    {
        Self {
            limiter,
            key_fn: Box::new(key_fn),
            func,
        }
    }

    /// Replace the key extractor.
    pub fn key_fn<K>(mut self, key_fn: K) -> Self
    where
        K: Fn(&A) -> String + Send + Sync + 'static,
    {
        self.key_fn = Box::new(key_fn);
        self
    }

    /// Run the function if the caller is admitted.
    pub fn call<R>(&self, args: A) -> Result<R>
    where
        F: Fn(A) -> R,
    {
        let identity = (self.key_fn)(&args);
        let decision = self.limiter.allow(&identity)?;
        if !decision.admitted {
            return Err(TurnstileError::RateLimited(decision));
        }
        Ok((self.func)(args))
    }

    /// The limiter guarding this function.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// Wrap `func` with its own in-memory limiter.
///
/// Calls are keyed by their first argument; use [`RateLimited::key_fn`] to
/// change that.
pub fn rate_limit<A, F, R>(
    max_admissions: u64,
    window: Duration,
    algorithm: Algorithm,
    func: F,
) -> Result<RateLimited<A, F>>
where
    A: CallKey + 'static,
    F: Fn(A) -> R,
{
    let limiter = RateLimiter::builder()
        .algorithm(algorithm)
        .quota(Quota::new(max_admissions, window)?)
        .build()?;
    Ok(RateLimited::new(Arc::new(limiter), func))
}
