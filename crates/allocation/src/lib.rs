//! Stacked-lane parking allocation.
//!
//! Vehicles are placed into a fixed set of lanes, each a bounded stack with
//! one accessible end. Arrivals that find no room wait in a FIFO waitlist and
//! are promoted as slots free up. Reaching a buried vehicle temporarily
//! displaces the vehicles above it; they are recorded in a ledger and pushed
//! back later.
//!
//! [`AllocationEngine`] is the single entry point for every mutation. It
//! persists each operation as one atomic [`store::WriteBatch`] through an
//! [`AllocationStore`].

pub mod clock;
pub mod config;
pub mod displacement;
pub mod engine;
pub mod error;
pub mod ids;
pub mod lane;
pub mod plugin;
pub mod store;
pub mod waitlist;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AllocationConfig;
pub use displacement::{DisplacementLedger, DisplacementRecord};
pub use engine::{
    Admission, AllocationEngine, Departure, DisplacedVehicle, LaneView, LotView, Placement,
    Promotion, Retrieval, ReturnReport, ReturnedVehicle, VehicleStatus,
};
pub use error::{AllocationError, ConfigError, Missing, StoreError};
pub use ids::{EntryId, LaneId, RecordId, Timestamp, VehicleId};
pub use lane::{Lane, LaneRegistry, Occupancy};
pub use plugin::{AllocationPlugin, LaneBoard, LaneSummary, SharedEngine};
pub use store::{AllocationStore, MemoryStore, StoreSnapshot, WriteBatch, WriteOp};
pub use waitlist::{Waitlist, WaitlistEntry, WaitlistStatus};
