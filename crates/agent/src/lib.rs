//! Agent runtime - the gated path between agents and the tools they invoke
//!
//! Every tool call an agent makes goes through one choke point that:
//! - Checks the call against the agent's allowlist, tenant and approval rules (`policy`)
//! - Throttles it against the agent's minute/hour/day budgets (`toolgate_core::rate_limit`)
//! - Executes it through a named handler, capturing duration and failures (`tools`)
//! - Records exactly one immutable audit entry per attempt (`toolgate_core::audit`)
//!
//! # Key Types
//!
//! - `ToolGateway` / `ToolSession` - the gated call path held by each agent (see `gateway`)
//! - `Agent` - the contract hosts invoke (see `agent`)
//! - `AgentRegistry` - id/role lookup for orchestrators (see `registry`)
//!
//! # Safety Principle
//!
//! Denials, pending approvals, rate limits and tool failures are values, not errors. A
//! misbehaving tool can never make `call_tool` fail or panic.

pub mod agent;
pub mod gateway;
pub mod policy;
pub mod registry;
pub mod tools;

pub use agent::{Agent, AgentResult};
pub use gateway::{GatewayServices, ToolGateway, ToolSession};
pub use policy::{PolicyDecider, PolicyEngine};
pub use registry::{AgentRegistry, RegistryError};
pub use tools::{ToolDispatcher, ToolHandler, ToolRouter};
