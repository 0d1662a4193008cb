pub mod builtin;
pub mod definition;
pub mod fallback;
pub mod invoker;
pub mod params;
pub mod stream;

pub use builtin::{builtin_tool_definitions, names, to_schema_json};
pub use definition::{StreamHandle, StreamPoll, StreamStart, ToolCallResult, ToolDefinition};
pub use fallback::{call_tool_or_fallback, BuiltinFallback, FallbackProvider};
pub use invoker::{InvokerConfig, ToolInvoker};
pub use stream::{PollOutcome, StreamConfig, StreamPoller};
