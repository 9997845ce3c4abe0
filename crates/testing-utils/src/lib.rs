//! 测试工具集
//!
//! 提供测试数据构造器与内存仓储Mock，供各crate的单元/集成测试使用，
//! 无需真实数据库或外部服务。

pub mod builders;
pub mod mocks;

pub use builders::{AgentBuilder, TaskBuilder};
pub use mocks::{FailingAgentRepository, MockAgentRepository, MockTaskRepository};
