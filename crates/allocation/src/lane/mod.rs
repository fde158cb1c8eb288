//! Lanes and the lane registry.
//!
//! A lane is a bounded stack: vehicles enter and leave at the accessible
//! end. The registry owns the fixed ordered set of lanes, per-lane locking,
//! and the policy for choosing a lane for an arriving vehicle.

pub mod registry;
pub mod stack;

#[cfg(test)]
mod tests_stack;

pub use registry::*;
pub use stack::*;
