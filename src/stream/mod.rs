//! Stream Rewriter (spec §4.G): SSE framing, model substitution + thinking
//! suppression, CCA envelope wrap/unwrap, and the Codex transcoder.

pub mod envelope;
pub mod rewrite;
pub mod sse;
pub mod transcoder;
