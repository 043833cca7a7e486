//! Agentic tool-calling loop.
//!
//! Sends the request to the model, executes any tool calls in the response,
//! appends the results, and repeats until the model answers in text or the
//! iteration limit is reached.  After the limit, one last call is made with
//! tool calls disabled.

use tracing::{debug, error, info, warn};

use crate::{
    base::prompts::{EMPTY_ANSWER_FALLBACK, FINAL_CALL_FAILED_FALLBACK, ITERATION_LIMIT_FALLBACK},
    service::{
        llm::{CompletionRequest, ContentBlock, GenericLlmClient, LlmError, ToolChoice, Turn},
        mcp::McpClient,
    },
};

/// Round-trips to the model that may execute tools.
pub const MAX_ITERATIONS: usize = 2;

/// Run the loop to a final, non-empty answer.
///
/// Only completion-backend errors from the tool-enabled rounds propagate; tool failures are
/// returned to the model as error-flagged results.
pub async fn agentic_loop(llm: &dyn GenericLlmClient, gateway: &McpClient, mut request: CompletionRequest) -> Result<String, LlmError> {
    for iteration in 1..=MAX_ITERATIONS {
        let response = llm.complete(&request).await?;

        info!(iteration, input_tokens = response.usage.input_tokens, output_tokens = response.usage.output_tokens, "Model responded.");

        let tool_uses = response.tool_uses();

        if tool_uses.is_empty() {
            debug!(iteration, "Agentic loop completed with a final text response.");
            return Ok(response.text().unwrap_or_else(|| EMPTY_ANSWER_FALLBACK.to_string()));
        }

        info!(iteration, tool_count = tool_uses.len(), "Executing tool calls.");

        request.messages.push(Turn::assistant(response.content));

        let mut results = Vec::with_capacity(tool_uses.len());

        for tool_use in tool_uses {
            let outcome = gateway.invoke(&tool_use.name, &tool_use.input).await;
            let (content, is_error) = outcome.into_content(&tool_use.name);

            debug!(tool = %tool_use.name, call_id = %tool_use.id, is_error, "Tool execution complete.");

            results.push(ContentBlock::ToolResult {
                tool_use_id: tool_use.id,
                content,
                is_error,
            });
        }

        request.messages.push(Turn::tool_results(results));
    }

    warn!("Hit the limit of {MAX_ITERATIONS} tool rounds; requesting a final answer without tools.");

    request.tool_choice = ToolChoice::None;

    match llm.complete(&request).await {
        Ok(response) => Ok(response.text().unwrap_or_else(|| ITERATION_LIMIT_FALLBACK.to_string())),
        Err(e) => {
            error!("Final completion after the iteration limit failed: {e}");
            Ok(FINAL_CALL_FAILED_FALLBACK.to_string())
        }
    }
}

// Tests.
