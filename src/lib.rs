//! Streaming core of an AI-narrated survival game: SSE frame decoding, live
//! control-tag scrubbing, and post-stream extraction of choices, hidden notes
//! and state updates.

pub mod config;
pub mod engine;
pub mod model;
