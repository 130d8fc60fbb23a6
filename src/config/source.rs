// (c) 2026 rupd contributors
//! Configuration provider for values given on the command line

use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};

/// Holds the configuration fields that were set on the command line
#[derive(Debug, Clone)]
pub(crate) struct CommandLineSource {
    data: Dict,
}

impl CommandLineSource {
    const META_NAME: &'static str = "command line";

    pub(crate) fn new() -> Self {
        Self { data: Dict::new() }
    }

    pub(crate) fn add<V: Into<Value>>(&mut self, key: &str, val: V) {
        let _ = self.data.insert(key.into(), val.into());
    }

    /// Adds the value only if present
    pub(crate) fn add_opt<V: Into<Value>>(&mut self, key: &str, val: Option<V>) {
        if let Some(v) = val {
            self.add(key, v);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Provider for CommandLineSource {
    fn metadata(&self) -> Metadata {
        Metadata::named(Self::META_NAME)
    }
    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut profile_map = Map::new();
        let _ = profile_map.insert(Profile::Default, self.data.clone());
        Ok(profile_map)
    }
}
