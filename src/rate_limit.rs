//! Call-rate limiting for the publish path.

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::time::Instant;
use tonic::Code;

use crate::config::PublishLimits;

/// A limiter was asked for more tokens than it can hand out.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum RateLimitError {
    /// Not enough tokens are available right now.
    #[error("rate limit exhausted: requested {requested}, available {available:.2}")]
    Exhausted {
        /// Tokens requested.
        requested: u32,
        /// Tokens available at the time of the request.
        available: f64,
    },

    /// The request can never be served because it exceeds the bucket size.
    #[error("rate ({requested}) exceeds burst size ({burst})")]
    ExceedsBurst {
        /// Tokens requested.
        requested: u32,
        /// Size of the bucket.
        burst: u32,
    },
}

impl RateLimitError {
    /// Returns the status code callers should fail with.
    pub fn code(&self) -> Code {
        Code::ResourceExhausted
    }
}

/// Process-wide limiter shared by every caller of a rate-limited operation.
///
/// `acquire` must be atomic: two concurrent callers can never both consume the last
/// available token.
pub trait RateLimiter: Send + Sync + Debug {
    /// Consumes `tokens` tokens or fails without consuming any.
    ///
    /// # Errors
    ///
    /// Returns a [`RateLimitError`] when the tokens are not available.
    fn acquire(&self, tokens: u32) -> Result<(), RateLimitError>;
}

/// Token bucket limiter.
///
/// The bucket holds at most `burst` tokens and refills continuously at `per_second`
/// tokens per second. It starts full.
#[derive(Debug)]
pub struct TokenBucket {
    per_second: f64,
    burst: u32,
    state: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(per_second: u32, burst: u32) -> Self {
        Self {
            per_second: f64::from(per_second),
            burst,
            state: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Returns the number of whole tokens currently available.
    pub fn available(&self) -> u32 {
        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);
        // `tokens` is within [0, burst]
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = bucket.tokens.floor() as u32;
        whole
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.per_second).min(f64::from(self.burst));
        bucket.last_refill = now;
    }
}

impl From<PublishLimits> for TokenBucket {
    fn from(limits: PublishLimits) -> Self {
        Self::new(limits.per_second, limits.burst)
    }
}

impl RateLimiter for TokenBucket {
    fn acquire(&self, tokens: u32) -> Result<(), RateLimitError> {
        if tokens > self.burst {
            return Err(RateLimitError::ExceedsBurst {
                requested: tokens,
                burst: self.burst,
            });
        }

        let mut bucket = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);

        let requested = f64::from(tokens);
        if bucket.tokens < requested {
            return Err(RateLimitError::Exhausted {
                requested: tokens,
                available: bucket.tokens,
            });
        }

        bucket.tokens -= requested;
        Ok(())
    }
}
