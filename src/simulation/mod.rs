//! Simulated surroundings for running the power limiter without hardware.

pub mod household;

pub use household::{HouseholdSimulator, HouseholdState};
