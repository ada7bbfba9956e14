pub const EXIT_COMMAND: &str = "exit";

/// What a single line typed into the shell asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    Noop,
    Exit,
    Message(String),
}

pub fn classify_input(text: &str) -> ShellInput {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ShellInput::Noop;
    }
    if trimmed.eq_ignore_ascii_case(EXIT_COMMAND) {
        return ShellInput::Exit;
    }
    ShellInput::Message(text.to_string())
}
