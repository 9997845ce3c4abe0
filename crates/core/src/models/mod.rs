pub mod agent;
pub mod assignment;
pub mod capacity;
pub mod queue;
pub mod task;

pub use agent::{Agent, AgentCapability, AgentStatus, RegisterAgentRequest};
pub use assignment::{AssignmentRecommendation, AssignmentScore, AssignmentStrategy};
pub use capacity::CapacitySnapshot;
pub use queue::{QueueItem, QueueStats};
pub use task::{
    CreateTaskRequest, Task, TaskConstraints, TaskPriority, TaskResult, TaskStatus, TaskType,
};
