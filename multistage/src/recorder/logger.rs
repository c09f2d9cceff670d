//! Dry-run logger trait and implementations.

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, Level};

/// Receives snapshots of objects a dry run would have sent to the cluster.
pub trait DryLogger: Send + Sync {
    /// Records one object.
    ///
    /// This method should never fail. Errors are logged but suppressed.
    fn add_object(&self, kind: &str, name: &str, object: serde_json::Value);
}

impl dyn DryLogger {
    /// Serializes and records an object.
    pub fn record<T: Serialize>(&self, kind: &str, name: &str, object: &T) {
        match serde_json::to_value(object) {
            Ok(value) => self.add_object(kind, name, value),
            Err(e) => tracing::warn!(kind = %kind, name = %name, "Failed to serialize dry-run object: {}", e),
        }
    }
}

/// A dry logger that writes objects to the tracing framework.
#[derive(Debug, Clone)]
pub struct TracingDryLogger {
    /// The log level to use.
    level: Level,
}

impl Default for TracingDryLogger {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl TracingDryLogger {
    /// Creates a new logger with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logger.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl DryLogger for TracingDryLogger {
    fn add_object(&self, kind: &str, name: &str, object: serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(kind = %kind, name = %name, object = %object, "Dry run: {} {}", kind, name);
        } else {
            info!(kind = %kind, name = %name, object = %object, "Dry run: {} {}", kind, name);
        }
    }
}

/// One object recorded by a [`CollectingDryLogger`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedObject {
    /// The object kind, e.g. `Pod`.
    pub kind: String,
    /// The object name.
    pub name: String,
    /// The serialized object.
    pub object: serde_json::Value,
}

/// A dry logger that keeps every object in memory, in recording order.
#[derive(Debug, Default)]
pub struct CollectingDryLogger {
    objects: RwLock<Vec<RecordedObject>>,
}

impl CollectingDryLogger {
    /// Creates a new collecting logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded objects.
    #[must_use]
    pub fn objects(&self) -> Vec<RecordedObject> {
        self.objects.read().clone()
    }

    /// Returns recorded objects of one kind.
    #[must_use]
    pub fn objects_of_kind(&self, kind: &str) -> Vec<RecordedObject> {
        self.objects
            .read()
            .iter()
            .filter(|o| o.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the number of recorded objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Renders every recorded object as a pretty JSON list.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let objects: Vec<_> = self.objects.read().iter().map(|o| o.object.clone()).collect();
        serde_json::to_string_pretty(&objects)
    }
}

impl DryLogger for CollectingDryLogger {
    fn add_object(&self, kind: &str, name: &str, object: serde_json::Value) {
        self.objects.write().push(RecordedObject {
            kind: kind.to_string(),
            name: name.to_string(),
            object,
        });
    }
}
