mod non_streaming;
mod streaming;

pub(crate) use non_streaming::{handle_non_streaming, ok_json_response};
pub(crate) use streaming::handle_streaming;
