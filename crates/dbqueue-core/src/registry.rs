//! Registry of job kinds, used to turn stored payloads back into jobs.

use std::collections::HashMap;

use crate::job::{Job, JobKind};

type Decoder = fn(serde_json::Value) -> Result<Box<dyn Job>, String>;

fn decode<T: JobKind>(data: serde_json::Value) -> Result<Box<dyn Job>, String> {
    let job: T = serde_json::from_value(data).map_err(|e| e.to_string())?;
    Ok(Box::new(job))
}

/// Maps kind tags to decoders.
#[derive(Default)]
pub struct JobRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job kind.
    pub fn register<T: JobKind>(&mut self) -> &mut Self {
        self.decoders.insert(T::KIND, decode::<T>);
        self
    }

    /// Check if a kind is registered.
    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.decoders.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build a job from its kind and fields.
    pub fn decode(&self, kind: &str, data: serde_json::Value) -> Result<Box<dyn Job>, String> {
        let decoder = self
            .decoders
            .get(kind)
            .ok_or_else(|| format!("job kind '{}' is not registered", kind))?;
        decoder(data).map_err(|e| format!("cannot decode '{}' job: {}", kind, e))
    }
}
