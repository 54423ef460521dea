// Risk management module
pub mod cooldown;

pub use cooldown::{CooldownBlock, CooldownTracker};
