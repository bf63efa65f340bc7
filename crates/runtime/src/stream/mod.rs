//! Client-facing streaming: sink plug point, per-kind profiles, and the
//! hook-bus subscriber that translates runtime hooks into wire events.

pub mod profile;
pub mod sink;
pub mod subscriber;

pub use profile::StreamProfile;
pub use sink::{ChannelSink, CollectorSink, Sink};
pub use subscriber::{clamp_preview, StreamSubscriber};
