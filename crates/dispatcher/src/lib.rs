pub mod assignment;
pub mod capacity;
pub mod lockdown;
pub mod queue;
pub mod task_service;
pub mod timeout_monitor;

pub use assignment::AssignmentEngine;
pub use capacity::CapacityManager;
pub use lockdown::{LockdownManager, LockdownReport, SecurityIncident};
pub use queue::TaskQueue;
pub use task_service::{ServiceQueueStats, TaskService};
pub use timeout_monitor::{MonitorHandle, TimeoutMonitor};
