pub mod broadcast;
pub mod clock;
pub mod config;
pub mod history;
pub mod hydrate;
pub mod messages;
pub mod orchestrator;
pub mod probe;
pub mod records;
pub mod sanitize;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use orchestrator::{RoundOrchestrator, RoundSettings, RoundStatus};
pub use scheduler::SchedulerHandle;
