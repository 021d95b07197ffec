//! These models represent the objects passed between the conversation store, the
//! context pipeline and the backends
//!
//! There are several related formats we need to interact with:
//! - stored conversation turns, with attachments, reasoning and tool invocations
//! - wire messages in the OpenAI chat shape, produced by the context pipeline
//! - tool manifests and function declarations handed to backends
//! - token usage reported back by backends
//!
//! Stored turns are authoritative. Wire content is derived from them on every pipeline
//! run and never written back.
pub mod content;
pub mod message;
pub mod tool;
pub mod usage;
