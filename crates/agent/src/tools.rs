use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use toolgate_core::{ToolCall, ToolResult};

/// A host-supplied implementation behind a tool name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Value) -> Result<ToolResult>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult>> + Send + 'static,
{
    async fn call(&self, input: Value) -> Result<ToolResult> {
        (self)(input).await
    }
}

/// Executes a call that has already cleared policy and rate limiting.
///
/// Implementations never fail outward: every problem becomes a `success == false` result.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> ToolResult;
}

#[derive(Default)]
pub struct ToolRouter {
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
    timeout: Option<Duration>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds every handler invocation; `Duration::ZERO` leaves invocations unbounded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Installs `handler` under `name`, replacing any previous handler.
    pub fn register_tool<H>(&self, name: impl Into<String>, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let name = name.into();
        let mut handlers = match self.handlers.write() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        if handlers.insert(name.clone(), Arc::new(handler)).is_some() {
            tracing::debug!(event_name = "router.tool.replaced", tool = %name, "tool handler replaced");
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.handler(name).is_some()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<_> = handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tool_names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.get(name).cloned()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRouter {
    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(handler) = self.handler(&call.tool) else {
            tracing::warn!(
                event_name = "router.tool.unknown",
                agent_id = %call.agent_id,
                tool = %call.tool,
                "no handler registered for allowlisted tool"
            );
            return ToolResult::failed(format!("unknown tool: {}", call.tool));
        };

        let started = Instant::now();
        let invocation = AssertUnwindSafe(handler.call(call.input.clone())).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        event_name = "router.tool.timed_out",
                        agent_id = %call.agent_id,
                        tool = %call.tool,
                        timeout_ms = limit.as_millis() as u64,
                        "tool handler exceeded its time budget"
                    );
                    return ToolResult::failed(format!(
                        "tool `{}` timed out after {}ms",
                        call.tool,
                        limit.as_millis()
                    ))
                    .with_duration_ms(elapsed_ms(started));
                }
            },
            None => invocation.await,
        };
        let duration_ms = elapsed_ms(started);

        match outcome {
            Ok(Ok(result)) => result.with_duration_ms(duration_ms),
            Ok(Err(error)) => {
                tracing::warn!(
                    event_name = "router.tool.failed",
                    agent_id = %call.agent_id,
                    tool = %call.tool,
                    error = %error,
                    "tool handler returned an error"
                );
                ToolResult::failed(format!("{error:#}")).with_duration_ms(duration_ms)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    event_name = "router.tool.panicked",
                    agent_id = %call.agent_id,
                    tool = %call.tool,
                    error = %message,
                    "tool handler panicked"
                );
                ToolResult::failed(format!("tool `{}` panicked: {message}", call.tool))
                    .with_duration_ms(duration_ms)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}
