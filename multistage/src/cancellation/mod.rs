//! Structured cancellation utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative, awaitable cancellation
//! - CancellationScope for supervising reactions to cancellation

mod scope;
mod token;

pub use scope::CancellationScope;
pub use token::CancellationToken;
