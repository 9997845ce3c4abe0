pub mod auth;
pub mod registry;
pub mod security;

pub use auth::{Claims, TokenService};
pub use registry::AgentRegistry;
