//! Typed interrupt signal channels.
//!
//! A running workflow exposes five typed channels: pause, resume,
//! clarification answers, external tool results, and confirmation
//! decisions. `WorkflowHandle::signal` routes a named JSON payload to the
//! matching channel; the run loop polls pause non-blockingly between turns
//! and blocks on resume while paused.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use arbor_domain::message::Message;
use arbor_domain::tool::ToolResult;
use arbor_domain::{Error, Result};

pub const SIGNAL_PAUSE: &str = "pause";
pub const SIGNAL_RESUME: &str = "resume";
pub const SIGNAL_CLARIFICATION: &str = "clarification";
pub const SIGNAL_EXTERNAL_TOOLS: &str = "external_tools";
pub const SIGNAL_CONFIRMATION: &str = "confirmation";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PauseRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeRequest {
    /// Messages appended to the transcript before the next planner call.
    #[serde(default)]
    pub extra_messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationAnswer {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Results for tool calls executed outside the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResultsSet {
    #[serde(default)]
    pub results: Vec<ToolResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Receiver half of one typed signal channel. The mutex makes `recv`
/// usable from `&self`; within a run the loop is the only receiver.
pub struct SignalChannel<T> {
    rx: tokio::sync::Mutex<mpsc::Receiver<T>>,
}

impl<T> SignalChannel<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Non-blocking poll. `None` when no signal is queued (or the channel
    /// is momentarily held by a concurrent `recv`).
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Await the next signal. `None` when all senders are gone.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}

/// The five channels a workflow context exposes.
pub struct SignalChannels {
    pub pause: SignalChannel<PauseRequest>,
    pub resume: SignalChannel<ResumeRequest>,
    pub clarification: SignalChannel<ClarificationAnswer>,
    pub external_tools: SignalChannel<ToolResultsSet>,
    pub confirmation: SignalChannel<ConfirmationDecision>,
}

/// Sender half, held by the engine's run handle for signal routing.
#[derive(Clone)]
pub struct SignalSenders {
    pause: mpsc::Sender<PauseRequest>,
    resume: mpsc::Sender<ResumeRequest>,
    clarification: mpsc::Sender<ClarificationAnswer>,
    external_tools: mpsc::Sender<ToolResultsSet>,
    confirmation: mpsc::Sender<ConfirmationDecision>,
}

const SIGNAL_QUEUE_DEPTH: usize = 16;

/// Build the paired sender/receiver sets for one workflow execution.
pub fn signal_pair() -> (SignalSenders, SignalChannels) {
    let (pause_tx, pause_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);
    let (resume_tx, resume_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);
    let (clar_tx, clar_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);
    let (ext_tx, ext_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);
    let (conf_tx, conf_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);
    (
        SignalSenders {
            pause: pause_tx,
            resume: resume_tx,
            clarification: clar_tx,
            external_tools: ext_tx,
            confirmation: conf_tx,
        },
        SignalChannels {
            pause: SignalChannel::new(pause_rx),
            resume: SignalChannel::new(resume_rx),
            clarification: SignalChannel::new(clar_rx),
            external_tools: SignalChannel::new(ext_rx),
            confirmation: SignalChannel::new(conf_rx),
        },
    )
}

impl SignalSenders {
    /// Route a named JSON payload to its typed channel.
    pub async fn route(&self, name: &str, payload: Value) -> Result<()> {
        match name {
            SIGNAL_PAUSE => {
                let signal: PauseRequest = serde_json::from_value(payload)?;
                self.pause.send(signal).await.map_err(send_failure)
            }
            SIGNAL_RESUME => {
                let signal: ResumeRequest = serde_json::from_value(payload)?;
                self.resume.send(signal).await.map_err(send_failure)
            }
            SIGNAL_CLARIFICATION => {
                let signal: ClarificationAnswer = serde_json::from_value(payload)?;
                self.clarification.send(signal).await.map_err(send_failure)
            }
            SIGNAL_EXTERNAL_TOOLS => {
                let signal: ToolResultsSet = serde_json::from_value(payload)?;
                self.external_tools.send(signal).await.map_err(send_failure)
            }
            SIGNAL_CONFIRMATION => {
                let signal: ConfirmationDecision = serde_json::from_value(payload)?;
                self.confirmation.send(signal).await.map_err(send_failure)
            }
            other => Err(Error::engine_failure(format!("unknown signal: {other}"))),
        }
    }
}

fn send_failure<T>(_: mpsc::error::SendError<T>) -> Error {
    Error::engine_failure("workflow no longer receiving signals")
}
