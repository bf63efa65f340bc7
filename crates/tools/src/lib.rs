//! Tool codecs and the process-wide toolset registry.
//!
//! Tools declare JSON schemas and codecs; toolsets bundle specs with a
//! single execute function. The registry is written at startup and read
//! lock-free afterwards; every payload and result crossing the
//! planner/runtime boundary goes through a codec here.

pub mod codec;
pub mod hints;
pub mod registry;

pub use codec::{check_schema, Codec, SchemaCodec, TypedCodec};
pub use hints::HintTemplate;
pub use registry::{
    AgentPrompt, PayloadSide, ToolExecutor, ToolRegistry, ToolSpec, ToolsetRegistration,
};
