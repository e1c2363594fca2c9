pub mod extract;
pub mod prompt;

mod preprocess;

pub use extract::{extract_tool_invocations, strip_tool_json, ToolInvocation};
pub use preprocess::{inject_tool_prompt, preprocess_messages};
pub use prompt::generate_tool_prompt;
