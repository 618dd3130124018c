//! Protocol-visible data: command states, stream frames and receive replies.

use serde::{Deserialize, Serialize};

use crate::ids::{CommandId, ShellId};

/// Command state URI reported while a command is starting.
pub const COMMAND_STATE_PENDING: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Pending";

/// Command state URI reported while a command is producing output.
pub const COMMAND_STATE_RUNNING: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running";

/// Command state URI reported once a command has finished.
pub const COMMAND_STATE_DONE: &str =
    "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done";

/// Command state as seen by the client.
///
/// Serialized as its protocol URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStateKind {
    #[serde(rename = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Pending")]
    Pending,
    #[serde(rename = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Running")]
    Running,
    #[serde(rename = "http://schemas.microsoft.com/wbem/wsman/1/windows/shell/CommandState/Done")]
    Done,
}

impl CommandStateKind {
    /// Protocol URI for this state.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Pending => COMMAND_STATE_PENDING,
            Self::Running => COMMAND_STATE_RUNNING,
            Self::Done => COMMAND_STATE_DONE,
        }
    }
}

/// Command state block of a receive reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandState {
    pub command_id: Option<CommandId>,
    pub state: CommandStateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// One stream entry crossing the wire.
///
/// `data` is base64 text (possibly of block-compressed bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFrame {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
    #[serde(default)]
    pub end_of_stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl StreamFrame {
    /// Frame for `name` on `command_id` without payload.
    #[must_use]
    pub fn new(name: impl Into<String>, command_id: Option<CommandId>) -> Self {
        Self {
            name: name.into(),
            command_id,
            end_of_stream: false,
            data: None,
        }
    }

    /// Attach base64 payload text.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Mark the frame as the last one for its stream.
    #[must_use]
    pub const fn end_of_stream(mut self) -> Self {
        self.end_of_stream = true;
        self
    }

    /// Same stream name, command id and end-of-stream flag, without payload.
    #[must_use]
    pub fn descriptor(&self) -> Self {
        Self {
            name: self.name.clone(),
            command_id: self.command_id.clone(),
            end_of_stream: self.end_of_stream,
            data: None,
        }
    }
}

/// Reply posted to a client's pending receive request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveReply {
    pub command_state: CommandState,
    #[serde(default)]
    pub streams: Vec<StreamFrame>,
}

/// Command line forwarded to the backend when a command is invoked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl CommandLine {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arguments: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }
}

/// Ordered set of distinct outbound stream names declared by a shell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboundStreams(Vec<String>);

impl OutboundStreams {
    /// Parse a space-delimited descriptor such as `"stdout stderr"`.
    ///
    /// Order is kept; repeated names are dropped after their first occurrence.
    #[must_use]
    pub fn parse(descriptor: &str) -> Self {
        let mut names: Vec<String> = Vec::new();
        for name in descriptor.split_whitespace() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Self(names)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Index of `name` in declaration order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Render back into the space-delimited descriptor form.
    #[must_use]
    pub fn descriptor(&self) -> String {
        self.0.join(" ")
    }
}

/// Client-visible description of a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellSummary {
    pub id: ShellId,
    pub output_streams: OutboundStreams,
    pub compressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<CommandId>,
}
