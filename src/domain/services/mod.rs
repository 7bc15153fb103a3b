pub mod change_detection;
pub mod clock;
pub mod closing_period;
pub mod config_provider;
pub mod orchestrator;
pub mod scheduler;
