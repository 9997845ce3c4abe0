pub mod repository;
pub mod store;

pub use repository::{AgentRepository, TaskRepository};
pub use store::DurableStore;
