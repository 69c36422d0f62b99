pub mod engine;
pub mod protocol;
pub mod apply_state;

pub mod tag_scrubber;
pub mod sse_decoder;
pub mod stream_aggregator;
pub mod extractor;
pub mod turn;

pub mod prompt_builder;
pub mod llm_client;
