//! Core domain model types for the executor.
//!
//! This module contains the small enums shared across the crate:
//! - Test phases and their ordering
//! - Pod phases as reported by the cluster
//! - Container lifecycle events

mod event;
mod status;

pub use event::ContainerEvent;
pub use status::{Phase, PodPhase};
