mod http_transport;
mod prepared_upstream;

pub use http_transport::{response_byte_stream, HttpTransport};
pub use prepared_upstream::PreparedUpstream;
