//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `scheduler`: Orchestratore del batch
//! - `task_optimizer`: Worker per singoli file
//! - `progress_tracker`: Stato del batch, heartbeat e totali
//! - `path_resolver`: Logica di calcolo path centralizzata

pub mod path_resolver;
pub mod progress_tracker;
pub mod scheduler;
pub mod task_optimizer;

pub use path_resolver::PathResolver;
pub use progress_tracker::ProgressTracker;
pub use scheduler::{BatchScheduler, BatchSummary};
pub use task_optimizer::{JobPlan, TaskOptimizer, TaskOutcome};
