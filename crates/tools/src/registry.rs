//! Toolset registry.
//!
//! Maps fully qualified tool ids to specs and their owning toolset. The
//! registry is populated during startup registration and only read after
//! that; lookups never block writers in steady state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use arbor_domain::ids::tool_tail;
use arbor_domain::plan::ToolMetadata;
use arbor_domain::tool::{ToolInvocation, ToolResult};
use arbor_domain::{Error, Result};
use arbor_engine::ActivityContext;

use crate::codec::{Codec, SchemaCodec};
use crate::hints::HintTemplate;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool spec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Prompt configuration for one agent tool: how the nested agent's
/// initial user message is built from the decoded payload, and how its
/// final response is folded back into a tool result. A tool sets either
/// `text` or `template`, never both.
#[derive(Debug, Clone, Default)]
pub struct AgentPrompt {
    pub system_prompt: String,
    pub text: Option<String>,
    pub template: Option<HintTemplate>,
    /// Optional finalizer template rendered against `{"final": ...}`.
    /// Absent means the final text is JSON-encoded as-is.
    pub finalizer: Option<HintTemplate>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("payload_schema", &self.payload_schema)
            .field("result_schema", &self.result_schema)
            .field("is_agent_tool", &self.is_agent_tool)
            .field("agent_id", &self.agent_id)
            .field("call_hint_template", &self.call_hint_template)
            .field("result_hint_template", &self.result_hint_template)
            .field("injected_fields", &self.injected_fields)
            .field("agent_prompt", &self.agent_prompt)
            .finish()
    }
}

#[derive(Clone)]
pub struct ToolSpec {
    pub id: String,
    pub description: String,
    pub tags: Vec<String>,
    pub payload_schema: Value,
    pub result_schema: Value,
    pub payload_codec: Arc<dyn Codec>,
    pub result_codec: Arc<dyn Codec>,
    pub is_agent_tool: bool,
    pub agent_id: Option<String>,
    pub call_hint_template: Option<HintTemplate>,
    pub result_hint_template: Option<HintTemplate>,
    /// Fields the runtime injects into the payload before dispatch
    /// (session ids, auth principals); planners never set them.
    pub injected_fields: Vec<String>,
    /// Set for agent tools registered through an agent toolset.
    pub agent_prompt: Option<AgentPrompt>,
}

impl ToolSpec {
    /// A spec with schema-validating codecs on both sides.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        payload_schema: Value,
        result_schema: Value,
    ) -> Self {
        let payload_codec: Arc<dyn Codec> = Arc::new(SchemaCodec::new(payload_schema.clone()));
        let result_codec: Arc<dyn Codec> = Arc::new(SchemaCodec::new(result_schema.clone()));
        Self {
            id: id.into(),
            description: description.into(),
            tags: Vec::new(),
            payload_schema,
            result_schema,
            payload_codec,
            result_codec,
            is_agent_tool: false,
            agent_id: None,
            call_hint_template: None,
            result_hint_template: None,
            injected_fields: Vec::new(),
            agent_prompt: None,
        }
    }

    /// A spec for a nested agent exposed as a tool.
    pub fn agent_tool(
        id: impl Into<String>,
        description: impl Into<String>,
        agent_id: impl Into<String>,
        payload_schema: Value,
        result_schema: Value,
    ) -> Self {
        let mut spec = Self::new(id, description, payload_schema, result_schema);
        spec.is_agent_tool = true;
        spec.agent_id = Some(agent_id.into());
        spec
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_call_hint(mut self, template: &str) -> Result<Self> {
        self.call_hint_template = Some(HintTemplate::compile(template)?);
        Ok(self)
    }

    pub fn with_result_hint(mut self, template: &str) -> Result<Self> {
        self.result_hint_template = Some(HintTemplate::compile(template)?);
        Ok(self)
    }

    pub fn with_codecs(
        mut self,
        payload_codec: Arc<dyn Codec>,
        result_codec: Arc<dyn Codec>,
    ) -> Self {
        self.payload_codec = payload_codec;
        self.result_codec = result_codec;
        self
    }

    pub fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            id: self.id.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            payload_schema: self.payload_schema.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Toolset registration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One execute function for a bundle of tools. Canonical JSON in,
/// canonical JSON (or structured error) out.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: ActivityContext,
        invocation: ToolInvocation,
    ) -> Result<ToolResult>;
}

#[derive(Clone)]
pub struct ToolsetRegistration {
    pub name: String,
    pub specs: Vec<ToolSpec>,
    pub execute: Arc<dyn ToolExecutor>,
    /// Overrides the agent's default activity task queue.
    pub task_queue: Option<String>,
}

impl std::fmt::Debug for ToolsetRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsetRegistration")
            .field("name", &self.name)
            .field("specs", &self.specs)
            .field("task_queue", &self.task_queue)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSide {
    Payload,
    Result,
}

#[derive(Default)]
pub struct ToolRegistry {
    toolsets: RwLock<HashMap<String, ToolsetRegistration>>,
    /// tool id -> (spec, owning toolset name)
    specs: RwLock<HashMap<String, (ToolSpec, String)>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_toolset(&self, reg: ToolsetRegistration) -> Result<()> {
        if reg.name.is_empty() {
            return Err(Error::execution("toolset name must not be empty")
                .with_code("invalid_registration"));
        }
        let mut toolsets = self.toolsets.write();
        let mut specs = self.specs.write();
        if toolsets.contains_key(&reg.name) {
            return Err(
                Error::execution(format!("toolset already registered: {}", reg.name))
                    .with_code("invalid_registration"),
            );
        }
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for spec in &reg.specs {
            if spec.id.is_empty() {
                return Err(Error::execution(format!(
                    "toolset {} contains a tool with an empty id",
                    reg.name
                ))
                .with_code("invalid_registration"));
            }
            if specs.contains_key(&spec.id) || !seen.insert(spec.id.as_str()) {
                return Err(
                    Error::execution(format!("duplicate tool id: {}", spec.id))
                        .with_code("invalid_registration"),
                );
            }
        }
        for spec in &reg.specs {
            specs.insert(spec.id.clone(), (spec.clone(), reg.name.clone()));
        }
        tracing::info!(
            toolset = %reg.name,
            tools = reg.specs.len(),
            task_queue = reg.task_queue.as_deref().unwrap_or("default"),
            "registered toolset"
        );
        toolsets.insert(reg.name.clone(), reg);
        Ok(())
    }

    pub fn lookup_toolset(&self, name: &str) -> Option<ToolsetRegistration> {
        self.toolsets.read().get(name).cloned()
    }

    pub fn spec(&self, tool_id: &str) -> Option<ToolSpec> {
        self.specs.read().get(tool_id).map(|(spec, _)| spec.clone())
    }

    /// Spec lookup for hint rendering: fully qualified id first, then the
    /// unqualified tail (first match in id order).
    pub fn spec_for_hint(&self, name: &str) -> Option<ToolSpec> {
        let specs = self.specs.read();
        if let Some((spec, _)) = specs.get(name) {
            return Some(spec.clone());
        }
        let mut ids: Vec<&String> = specs.keys().collect();
        ids.sort();
        ids.into_iter()
            .find(|id| tool_tail(id.as_str()) == name)
            .and_then(|id| specs.get(id).map(|(spec, _)| spec.clone()))
    }

    /// The toolset owning a tool id.
    pub fn toolset_for(&self, tool_id: &str) -> Option<ToolsetRegistration> {
        let owner = self
            .specs
            .read()
            .get(tool_id)
            .map(|(_, owner)| owner.clone())?;
        self.lookup_toolset(&owner)
    }

    pub fn marshal_tool_value(
        &self,
        tool_id: &str,
        value: &Value,
        side: PayloadSide,
    ) -> Result<Value> {
        let spec = self
            .spec(tool_id)
            .ok_or_else(|| Error::unknown_tool(tool_id))?;
        match side {
            PayloadSide::Payload => spec.payload_codec.encode(value),
            PayloadSide::Result => spec.result_codec.encode(value),
        }
    }

    pub fn unmarshal_tool_value(
        &self,
        tool_id: &str,
        raw: &Value,
        side: PayloadSide,
    ) -> Result<Value> {
        let spec = self
            .spec(tool_id)
            .ok_or_else(|| Error::unknown_tool(tool_id))?;
        match side {
            PayloadSide::Payload => spec.payload_codec.decode(raw),
            PayloadSide::Result => spec.result_codec.decode(raw),
        }
    }

    /// Metadata for every registered tool, sorted by id.
    pub fn metadata(&self) -> Vec<ToolMetadata> {
        let specs = self.specs.read();
        let mut all: Vec<ToolMetadata> =
            specs.values().map(|(spec, _)| spec.metadata()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn all_tool_ids(&self) -> Vec<String> {
        let specs = self.specs.read();
        let mut ids: Vec<String> = specs.keys().cloned().collect();
        ids.sort();
        ids
    }
}
