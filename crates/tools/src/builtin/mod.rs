//! Builtin tools shipped with the runtime.

pub mod calculator;
pub mod clock;
pub mod http_fetch;

use std::sync::Arc;

use nexus_domain::error::Result;

use crate::ToolRegistry;

/// Register every builtin tool.
pub fn register_builtins(registry: &ToolRegistry) -> Result<()> {
    registry.register(Arc::new(calculator::CalculatorTool))?;
    registry.register(Arc::new(clock::ClockTool))?;
    registry.register(Arc::new(http_fetch::HttpFetchTool::new()))?;
    Ok(())
}
