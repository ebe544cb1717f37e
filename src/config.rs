// Copyright (C) 2026 The beatline authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Engine configuration: the scheduling knobs and audio settings.

use std::path::Path;
use std::time::Duration;

use config::{Config, File};
use serde::{Deserialize, Serialize};

/// Typed error for config load/parse failures so callers can distinguish
/// e.g. file-not-found from parse errors without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),
}

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,

    /// Look-ahead poll period in milliseconds.
    #[serde(default = "default_lookahead_ms")]
    lookahead_ms: u64,

    /// Scheduling overlap window in milliseconds. Samples starting within
    /// this window of now are scheduled; sized above the poll period so
    /// timer jitter cannot skip a sample at a tick boundary.
    #[serde(default = "default_overlap_ms")]
    overlap_ms: u64,

    /// Position publication period in milliseconds (the UI frame rate).
    #[serde(default = "default_position_update_ms")]
    position_update_ms: u64,
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_lookahead_ms() -> u64 {
    25
}

fn default_overlap_ms() -> u64 {
    100
}

fn default_position_update_ms() -> u64 {
    16
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: default_sample_rate(),
            lookahead_ms: default_lookahead_ms(),
            overlap_ms: default_overlap_ms(),
            position_update_ms: default_position_update_ms(),
        }
    }
}

impl EngineConfig {
    /// Deserializes a file from the path into an engine configuration.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?)
    }

    /// The output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The look-ahead poll period.
    pub fn lookahead_period(&self) -> Duration {
        Duration::from_millis(self.lookahead_ms)
    }

    /// The scheduling overlap window in seconds.
    pub fn overlap_window(&self) -> f64 {
        self.overlap_ms as f64 / 1000.0
    }

    /// The position publication period.
    pub fn position_update_period(&self) -> Duration {
        Duration::from_millis(self.position_update_ms)
    }
}
