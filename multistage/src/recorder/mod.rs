//! Dry-run recording.
//!
//! In dry-run mode nothing is sent to the cluster. Every object that would
//! have been created is handed to a [`DryLogger`] instead.

mod logger;

pub use logger::{CollectingDryLogger, DryLogger, RecordedObject, TracingDryLogger};
