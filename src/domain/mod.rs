pub mod auto_power;
pub mod battery;
pub mod clock;
pub mod inverter;
pub mod meter;
pub mod solar;

pub use auto_power::*;
pub use battery::*;
pub use clock::*;
pub use inverter::*;
pub use meter::*;
pub use solar::*;
