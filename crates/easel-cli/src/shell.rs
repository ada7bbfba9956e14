use std::io::{BufRead, ErrorKind, Write};

use anyhow::Result;
use easel_contracts::chat::{classify_input, Conversation, Message, ShellInput};
use easel_engine::ChatError;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const BLUE: &str = "\x1b[34m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `exit`.
    Exit,
    EndOfInput,
}

/// Read lines from `input` and answer each one with `respond` until `exit` or EOF.
///
/// Every turn appends the user line and then exactly one assistant message, which is
/// either the reply or `Error: ...` when `respond` fails.
pub fn run_session<R, W, F>(
    input: &mut R,
    out: &mut W,
    conversation: &mut Conversation,
    mut respond: F,
) -> Result<SessionEnd>
where
    R: BufRead,
    W: Write,
    F: FnMut(&[Message], &mut dyn FnMut(&str)) -> Result<String, ChatError>,
{
    writeln!(out, "{BOLD}{CYAN}Image Generation Agent{RESET}")?;
    writeln!(out, "{DIM}Type 'exit' or press Ctrl+C to quit.{RESET}")?;
    writeln!(out)?;

    let mut line = String::new();
    loop {
        write!(out, "{BOLD}{BLUE}You:{RESET} ")?;
        out.flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            writeln!(out)?;
            return Ok(SessionEnd::EndOfInput);
        }

        let text = match classify_input(line.trim_end_matches(['\n', '\r'])) {
            ShellInput::Noop => continue,
            ShellInput::Exit => return Ok(SessionEnd::Exit),
            ShellInput::Message(text) => text,
        };
        conversation.push_user(text);

        writeln!(out, "{YELLOW}Thinking...{RESET}")?;
        let result = respond(conversation.messages(), &mut |status: &str| {
            let _ = writeln!(out, "{YELLOW}{status}{RESET}");
            let _ = out.flush();
        });
        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(%err, "chat turn failed");
                format!("Error: {err}")
            }
        };
        let message = conversation.push_assistant(reply);

        writeln!(out)?;
        writeln!(out, "{BOLD}{GREEN}Agent:{RESET}")?;
        writeln!(out, "{}", message.content)?;
        writeln!(out)?;
    }
}
