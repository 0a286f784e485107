/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration for counter bindings.
//!
//! Settings come from defaults, an optional YAML file, and environment
//! variables, in increasing order of precedence:
//!
//! ```no_run
//! # use sharded_counter::config::CounterConfig;
//! let config = CounterConfig::from_yaml("counter.yaml")?.with_env_overrides();
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::store::ReadSource;

/// Environment variable selecting the [`ReadSource`] used by `get`.
pub const READ_SOURCE_ENV: &str = "SHARDED_COUNTER_READ_SOURCE";

/// Environment variable bounding `get`, in humantime syntax (`500ms`,
/// `30s`), or `none` (alias `off`) for no bound.
pub const READ_TIMEOUT_ENV: &str = "SHARDED_COUNTER_READ_TIMEOUT";

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-binding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Where the fan-out reads of `get` are served from.
    pub read_source: ReadSource,
    /// Bound on a whole `get`; `None` waits indefinitely.
    #[serde(with = "humantime_option")]
    pub read_timeout: Option<Duration>,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            read_source: ReadSource::Default,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

impl CounterConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply any settings present in the environment on top of this
    /// configuration. Unparseable values are logged and ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = env::var(READ_SOURCE_ENV) {
            match val.parse::<ReadSource>() {
                Ok(source) => self.read_source = source,
                Err(err) => tracing::error!(
                    "failed to override read source from ${}={:?}: {}",
                    READ_SOURCE_ENV,
                    val,
                    err
                ),
            }
        }

        if let Ok(val) = env::var(READ_TIMEOUT_ENV) {
            match parse_timeout(&val) {
                Ok(timeout) => self.read_timeout = timeout,
                Err(err) => tracing::error!(
                    "failed to override read timeout from ${}={:?}: {}",
                    READ_TIMEOUT_ENV,
                    val,
                    err
                ),
            }
        }

        self
    }

    /// Load configuration from a YAML file. Missing keys take their
    /// default values.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

fn parse_timeout(val: &str) -> Result<Option<Duration>, humantime::DurationError> {
    match val.trim() {
        "none" | "off" => Ok(None),
        other => humantime::parse_duration(other).map(Some),
    }
}

mod humantime_option {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use serde::de::Error;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                serializer.serialize_str(&humantime::format_duration(*duration).to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(val) => super::parse_timeout(&val).map_err(D::Error::custom),
        }
    }
}
