// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause
//! PCM definitions.
//!
//! A PCM is described by a configuration node, a flat set of fields such as
//! `type` and `comment`. Nodes can be built in code or loaded from YAML:
//!
//! ```yaml
//! # a single node
//! type: "null"
//! comment: "discards everything"
//! ```
//!
//! ```yaml
//! # a table of named nodes, see PcmConfig::lookup
//! sink:
//!   type: "null"
//! bench:
//!   type: "null"
//!   stream: capture
//! ```

use std::{collections::BTreeMap, path::Path};

use figment::{
    providers::{Format, Yaml},
    value::Value,
    Figment,
};
use serde::Deserialize;

use crate::{Error, Result};

/// A PCM configuration node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct PcmConfig(BTreeMap<String, Value>);

impl PcmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_owned(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The `type` field.
    ///
    /// An unquoted `type: null` is read by YAML as the null value; it names
    /// the null PCM all the same.
    pub fn pcm_type(&self) -> Option<&str> {
        match self.get("type")? {
            Value::Empty(..) => Some("null"),
            value => value.as_str(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Fails on the first field not listed in `allowed`.
    pub fn check(&self, allowed: &[&str]) -> Result<()> {
        match self.keys().find(|key| !allowed.contains(key)) {
            Some(key) => {
                log::error!("Unknown field {}", key);
                Err(Error::UnknownConfigField(key.to_owned()))
            }
            None => Ok(()),
        }
    }

    /// Loads a single node from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Figment::new().merge(Yaml::file(path)).extract()?)
    }

    /// Loads the node named `name` from a YAML file holding a table of
    /// nodes.
    pub fn lookup<P: AsRef<Path>>(path: P, name: &str) -> Result<Self> {
        let mut table: BTreeMap<String, Self> =
            Figment::new().merge(Yaml::file(path)).extract()?;
        table
            .remove(name)
            .ok_or_else(|| Error::UnknownPcm(name.to_owned()))
    }
}
