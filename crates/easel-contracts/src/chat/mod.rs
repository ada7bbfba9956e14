mod conversation;
mod shell_input;
mod tools;

pub use conversation::{Conversation, Message, Role};
pub use shell_input::{classify_input, ShellInput, EXIT_COMMAND};
pub use tools::{
    generate_image_tool, GenerateImageArgs, ToolArgumentsError, ToolInvocation,
    GENERATE_IMAGE_TOOL,
};
