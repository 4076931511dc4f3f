//! Device type to store partition routing
//!
//! [`PartitionTable`] is the static configuration (device type → address),
//! built once at startup and never mutated. [`Router`] is its per-file
//! counterpart holding the sending half of each partition's write queue.

use std::collections::BTreeMap;
use std::fmt;

use crate::encoder::WriteTask;
use crate::error::ConfigError;

/// Static device type → store address mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    routes: BTreeMap<String, String>,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route; device types and addresses must be unique
    pub fn with_route(
        mut self,
        dev_type: impl Into<String>,
        addr: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let dev_type = dev_type.into();
        let addr = addr.into();

        if dev_type.trim().is_empty() {
            return Err(ConfigError::Route(dev_type, "empty device type"));
        }
        if addr.trim().is_empty() {
            return Err(ConfigError::Route(dev_type, "empty address"));
        }
        if self.routes.contains_key(&dev_type) {
            return Err(ConfigError::Route(dev_type, "duplicate device type"));
        }
        if self.routes.values().any(|a| *a == addr) {
            return Err(ConfigError::Route(
                dev_type,
                "address already used by another device type",
            ));
        }

        self.routes.insert(dev_type, addr);
        Ok(self)
    }

    pub fn address(&self, dev_type: &str) -> Option<&str> {
        self.routes.get(dev_type).map(String::as_str)
    }

    /// Routes in device type order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(t, a)| (t.as_str(), a.as_str()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Why a task could not be handed to a partition queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No partition configured for this device type
    Unknown(String),
    /// The partition's queue has no consumers left
    Closed(String),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Unknown(t) => write!(f, "unknown device type `{}`", t),
            RouteError::Closed(t) => write!(f, "write queue for `{}` is closed", t),
        }
    }
}

/// Per-file routing to the partition write queues
pub struct Router {
    queues: BTreeMap<String, flume::Sender<WriteTask>>,
}

impl Router {
    pub fn new(queues: BTreeMap<String, flume::Sender<WriteTask>>) -> Self {
        Self { queues }
    }

    /// Hand a task to its partition, blocking while the queue is full
    ///
    /// Must be called from a blocking context (parse worker thread).
    pub fn route(&self, dev_type: &str, task: WriteTask) -> Result<(), RouteError> {
        let queue = self
            .queues
            .get(dev_type)
            .ok_or_else(|| RouteError::Unknown(dev_type.to_string()))?;

        queue
            .send(task)
            .map_err(|_| RouteError::Closed(dev_type.to_string()))
    }
}
