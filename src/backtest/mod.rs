pub mod metrics;
pub mod resample;
pub mod runner;
pub mod synthetic;

pub use metrics::{EquitySample, PerformanceSummary, StatisticsEngine};
pub use runner::{BacktestResult, BacktestRunner, SweepReport};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
