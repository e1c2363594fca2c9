//! Upstream SSE decoding and translation into `OpenAI` chat responses.

pub mod accumulator;
pub mod assembler;
pub mod collect;
pub mod sse;
pub mod thinking;

pub use accumulator::{DeliveryMode, PhaseAccumulator};
pub use assembler::{sse_chunk_stream, StreamAssembler};
pub use collect::{collect_response, FullAssembler, ResponseMeta};
pub use sse::{raw_event_stream, RawEvent, RawEventKind, SseLineDecoder};
pub use thinking::transform_thinking_content;
