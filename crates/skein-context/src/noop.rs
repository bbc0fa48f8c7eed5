use async_trait::async_trait;

use skein_core::errors::ContextError;

use crate::strategy::{ContextStrategy, StrategyRequest, StrategyResponse};

/// Pass-through strategy: the full history goes out every turn. Baseline for
/// comparison and debugging.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStrategy;

#[async_trait]
impl ContextStrategy for NoopStrategy {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn process(&self, request: StrategyRequest) -> Result<StrategyResponse, ContextError> {
        Ok(StrategyResponse {
            messages_to_send: request.messages.clone(),
            messages: request.messages,
        })
    }
}
