//! Engine configuration: how many lanes exist and how deep each one is.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ids::LaneId;

/// Lane depth used by the physical lot the engine was built for.
pub const DEFAULT_LANE_CAPACITY: u32 = 3;
pub const DEFAULT_LANE_COUNT: u32 = 4;

/// Upper bound on lane depth. Lanes are scanned linearly, so depth stays small.
pub const MAX_LANE_CAPACITY: u32 = 64;

#[derive(Resource, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Number of lanes. Lanes are numbered `1..=lane_count`.
    pub lane_count: u32,
    /// Maximum occupants per lane, identical for every lane.
    pub lane_capacity: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            lane_count: DEFAULT_LANE_COUNT,
            lane_capacity: DEFAULT_LANE_CAPACITY,
        }
    }
}

impl AllocationConfig {
    pub fn new(lane_count: u32, lane_capacity: u32) -> Self {
        Self {
            lane_count,
            lane_capacity,
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lane_count == 0 {
            return Err(ConfigError::Invalid("lane_count must be at least 1".into()));
        }
        if self.lane_capacity == 0 || self.lane_capacity > MAX_LANE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "lane_capacity must be within 1..={MAX_LANE_CAPACITY}, got {}",
                self.lane_capacity
            )));
        }
        Ok(())
    }

    /// Lane ids in selection priority order.
    pub fn lane_ids(&self) -> impl Iterator<Item = LaneId> {
        (1..=self.lane_count).map(LaneId)
    }

    pub fn total_slots(&self) -> u64 {
        u64::from(self.lane_count) * u64::from(self.lane_capacity)
    }
}
