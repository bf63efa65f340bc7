//! Planner and model-client plug points.
//!
//! A planner is the LLM-driven decision function: given the transcript
//! and the turn's allowed tools, it returns either tool calls or a final
//! response. The model client is the lower-level provider interface
//! planners are typically built on; adapters live out of tree.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use arbor_domain::message::Message;
use arbor_domain::plan::{PlanRequest, PlanResult, ToolMetadata};
use arbor_domain::run::Usage;
use arbor_domain::stream::BoxStream;
use arbor_domain::{Error, Result};
use arbor_engine::ActivityContext;

#[async_trait]
pub trait Planner: Send + Sync {
    /// First planner call of a run.
    async fn plan_start(&self, ctx: ActivityContext, req: PlanRequest) -> Result<PlanResult>;

    /// Subsequent calls, with the previous turn's tool results in
    /// `req.tool_results`.
    async fn plan_resume(&self, ctx: ActivityContext, req: PlanRequest) -> Result<PlanResult>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolMetadata>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

/// Chunks yielded by a streaming completion.
#[derive(Debug, Clone)]
pub enum ModelChunk {
    Text { delta: String },
    ToolCall {
        call_id: String,
        tool_name: String,
        args_delta: String,
    },
    Thinking { delta: String },
    Usage { usage: Usage },
    Stop { reason: Option<String> },
}

pub type ModelStream = BoxStream<'static, Result<ModelChunk>>;

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming variant. Adapters without streaming keep the default.
    async fn stream(&self, _req: CompletionRequest) -> Result<ModelStream> {
        Err(Error::streaming_unsupported())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted planner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deterministic planner that replays a fixed script of plan results.
/// Used by tests, demos, and replay-determinism checks.
pub struct ScriptedPlanner {
    steps: Mutex<VecDeque<PlanResult>>,
}

impl ScriptedPlanner {
    pub fn new(steps: Vec<PlanResult>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
        }
    }

    fn next(&self) -> Result<PlanResult> {
        self.steps
            .lock()
            .pop_front()
            .ok_or_else(|| Error::execution("planner script exhausted"))
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan_start(&self, _ctx: ActivityContext, _req: PlanRequest) -> Result<PlanResult> {
        self.next()
    }

    async fn plan_resume(&self, _ctx: ActivityContext, _req: PlanRequest) -> Result<PlanResult> {
        self.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    struct CompleteOnly;

    #[async_trait]
    impl ModelClient for CompleteOnly {
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                message: Message::assistant("ok"),
                usage: None,
                stop_reason: Some("end_turn".into()),
            })
        }
    }

    struct Streaming;

    #[async_trait]
    impl ModelClient for Streaming {
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                message: Message::assistant("ok"),
                usage: None,
                stop_reason: None,
            })
        }

        async fn stream(&self, _req: CompletionRequest) -> Result<ModelStream> {
            let chunks = vec![
                Ok(ModelChunk::Text { delta: "he".into() }),
                Ok(ModelChunk::Text { delta: "llo".into() }),
                Ok(ModelChunk::Stop { reason: None }),
            ];
            Ok(Box::pin(futures_util::stream::iter(chunks)))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message::user("hi")],
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            model: None,
        }
    }

    #[tokio::test]
    async fn default_stream_is_unsupported() {
        let client = CompleteOnly;
        let err = match client.stream(request()).await {
            Ok(_) => panic!("expected streaming_unsupported error"),
            Err(e) => e,
        };
        assert_eq!(err.code, "streaming_unsupported");
    }

    #[tokio::test]
    async fn streaming_adapter_yields_chunks() {
        let client = Streaming;
        let mut stream = client.stream(request()).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            if let ModelChunk::Text { delta } = chunk.unwrap() {
                text.push_str(&delta);
            }
        }
        assert_eq!(text, "hello");
    }

    #[test]
    fn scripted_planner_exhaustion_errors() {
        let planner = ScriptedPlanner::new(vec![PlanResult::final_text("done")]);
        assert!(planner.next().is_ok());
        let err = planner.next().unwrap_err();
        assert_eq!(err.kind, arbor_domain::ErrorKind::ExecutionError);
    }
}
