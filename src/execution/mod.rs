// Decision core: waiting entries, positions and the engine that drives them
pub mod engine;
pub mod position_manager;
pub mod waiting;

pub use engine::{EngineEvent, TradingEngine};
pub use position_manager::{ClosedTrade, ExitReason, Position, PositionManager, PositionParams};
pub use waiting::{ConversionTrigger, WaitingEntry, WaitingEntryManager, WaitingOutcome};
