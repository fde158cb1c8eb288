// ---------------------------------------------------------------------------
// Error types for allocation, persistence and configuration
// ---------------------------------------------------------------------------

use std::fmt;

use crate::ids::{EntryId, LaneId, VehicleId};
use crate::waitlist::WaitlistStatus;

/// What an operation failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Lane(LaneId),
    /// The vehicle is not in the named lane.
    Vehicle { lane: LaneId, vehicle: VehicleId },
    Entry(EntryId),
}

/// Failures reported by the persistent store collaborator.
#[derive(Debug)]
pub enum StoreError {
    /// The backing store cannot be reached or refused the write.
    Unavailable(String),
    /// I/O error while reading or writing the backing file.
    Io(std::io::Error),
    /// Persisted bytes or rows violate the format or an engine invariant.
    Corrupt(String),
    /// A write op referenced a row that does not exist or already exists.
    Conflict(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
            StoreError::Corrupt(msg) => write!(f, "store state is corrupt: {msg}"),
            StoreError::Conflict(msg) => write!(f, "store write conflict: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<bitcode::Error> for StoreError {
    fn from(e: bitcode::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Errors returned by lane, waitlist, ledger and engine operations.
///
/// Every variant reaches the caller unchanged; the engine never turns a
/// failure into a silent no-op and never retries.
#[derive(Debug)]
pub enum AllocationError {
    NotFound(Missing),
    LaneFull {
        lane: LaneId,
        capacity: u32,
    },
    LaneEmpty {
        lane: LaneId,
    },
    /// The vehicle is in the lane but not at its accessible end.
    PositionMismatch {
        lane: LaneId,
        vehicle: VehicleId,
        position: u32,
        top: u32,
    },
    PositionNotFound {
        lane: LaneId,
        position: u32,
    },
    AlreadyParked {
        vehicle: VehicleId,
        lane: LaneId,
    },
    /// The ledger already holds an open record for this vehicle.
    AlreadyDisplaced {
        vehicle: VehicleId,
        lane: LaneId,
    },
    DuplicatePending {
        vehicle: VehicleId,
        entry: EntryId,
    },
    InvalidState {
        entry: EntryId,
        status: WaitlistStatus,
    },
    /// `return_displaced` stopped part way. `returned` were pushed back and
    /// committed; `remaining` are still held outside the lane.
    ReturnIncomplete {
        lane: LaneId,
        returned: Vec<VehicleId>,
        remaining: Vec<VehicleId>,
        cause: Box<AllocationError>,
    },
    StoreUnavailable(StoreError),
    InvalidConfig(ConfigError),
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::NotFound(Missing::Lane(lane)) => write!(f, "lane {lane} not found"),
            AllocationError::NotFound(Missing::Vehicle { lane, vehicle }) => {
                write!(f, "vehicle {vehicle} not found in lane {lane}")
            }
            AllocationError::NotFound(Missing::Entry(entry)) => {
                write!(f, "waitlist entry {entry} not found")
            }
            AllocationError::LaneFull { lane, capacity } => {
                write!(f, "lane {lane} is full ({capacity} of {capacity})")
            }
            AllocationError::LaneEmpty { lane } => write!(f, "lane {lane} is empty"),
            AllocationError::PositionMismatch {
                lane,
                vehicle,
                position,
                top,
            } => write!(
                f,
                "vehicle {vehicle} is at position {position} of lane {lane}, top is {top}"
            ),
            AllocationError::PositionNotFound { lane, position } => {
                write!(f, "no occupant at position {position} of lane {lane}")
            }
            AllocationError::AlreadyParked { vehicle, lane } => {
                write!(f, "vehicle {vehicle} is already parked in lane {lane}")
            }
            AllocationError::AlreadyDisplaced { vehicle, lane } => {
                write!(f, "vehicle {vehicle} is already displaced from lane {lane}")
            }
            AllocationError::DuplicatePending { vehicle, entry } => {
                write!(f, "vehicle {vehicle} already waiting as entry {entry}")
            }
            AllocationError::InvalidState { entry, status } => {
                write!(f, "waitlist entry {entry} is {status}, expected pending")
            }
            AllocationError::ReturnIncomplete {
                lane,
                returned,
                remaining,
                cause,
            } => write!(
                f,
                "return to lane {lane} stopped after {} of {} vehicles: {cause}",
                returned.len(),
                returned.len() + remaining.len()
            ),
            AllocationError::StoreUnavailable(e) => write!(f, "{e}"),
            AllocationError::InvalidConfig(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AllocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AllocationError::StoreUnavailable(e) => Some(e),
            AllocationError::InvalidConfig(e) => Some(e),
            AllocationError::ReturnIncomplete { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<StoreError> for AllocationError {
    fn from(e: StoreError) -> Self {
        AllocationError::StoreUnavailable(e)
    }
}

/// Errors raised while loading or validating [`crate::config::AllocationConfig`].
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {e}"),
            ConfigError::Parse(e) => write!(f, "cannot parse config: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}
