use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::transport::{Download, ModelTransport};

/// In-memory transport that replays queued chat replies and canned downloads.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: RefCell<VecDeque<Result<Value, String>>>,
    downloads: RefCell<HashMap<String, Download>>,
    pub(crate) requests: RefCell<Vec<Value>>,
    pub(crate) fetched: RefCell<Vec<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, payload: Value) -> Self {
        self.replies.borrow_mut().push_back(Ok(payload));
        self
    }

    pub(crate) fn reply_text(self, content: &str) -> Self {
        self.reply(completion(json!({ "role": "assistant", "content": content })))
    }

    pub(crate) fn fail(self, message: &str) -> Self {
        self.replies.borrow_mut().push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn serve(self, url: &str, status: u16, bytes: &[u8]) -> Self {
        self.downloads.borrow_mut().insert(
            url.to_string(),
            Download {
                status,
                bytes: bytes.to_vec(),
            },
        );
        self
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub(crate) fn request(&self, index: usize) -> Value {
        self.requests
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

impl ModelTransport for ScriptedTransport {
    fn chat_completion(&self, payload: &Value) -> Result<Value> {
        self.requests.borrow_mut().push(payload.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }

    fn download(&self, url: &str) -> Result<Download> {
        self.fetched.borrow_mut().push(url.to_string());
        self.downloads
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused ({url})"))
    }
}

pub(crate) fn completion(message: Value) -> Value {
    json!({
        "id": "gen-test",
        "object": "chat.completion",
        "choices": [{ "index": 0, "finish_reason": "stop", "message": message }]
    })
}

pub(crate) fn tool_call_completion(name: &str, arguments: &str) -> Value {
    completion(json!({
        "role": "assistant",
        "content": null,
        "tool_calls": [{
            "id": "call_0",
            "type": "function",
            "function": { "name": name, "arguments": arguments }
        }]
    }))
}
