//! Authentication endpoints and their supporting storage.

pub mod cleanup;
pub mod password_reset;
pub mod profile;
pub mod rate_limit;
pub mod session;
pub mod signin;
pub mod signup;
pub mod state;
pub mod tokens;
pub mod types;
pub mod utils;
pub mod verification;

pub use rate_limit::{FixedWindowLimiter, NoopRateLimiter, RateLimitAction, RateLimiter};
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
pub(crate) mod test_support;
