//! Wire protocol for client-server communication.
//!
//! Every request carries a client-chosen `request_id` that is echoed on each
//! response it produces. Deferred calls (command, receive) answer once their
//! reply is ready. Enumeration streams one `shell` response per shell before
//! its final `enumerated` response.

use remote_shell_core::{
    CommandId, CommandLine, ReceiveReply, ReplyCode, ShellError, ShellId, ShellResult,
    ShellSummary, StreamFrame,
};
use serde::{Deserialize, Serialize};

/// Request from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    pub request_id: u64,
    #[serde(flatten)]
    pub call: ClientCall,
}

/// Operation a client request invokes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCall {
    /// Create a shell declaring space-delimited output streams.
    CreateShell {
        output_streams: String,
        #[serde(default)]
        compressed: bool,
    },
    DeleteShell { shell_id: ShellId },
    GetShell { shell_id: ShellId },
    EnumerateShells,
    ModifyShell { shell_id: ShellId },
    Connect { shell_id: ShellId },
    /// Start a command; answered once the backend accepts or rejects it.
    Command {
        shell_id: ShellId,
        command_line: CommandLine,
    },
    /// Deliver input to the active command (payload base64 encoded).
    Send { shell_id: ShellId, frame: StreamFrame },
    /// Wait for the command's next output.
    Receive {
        shell_id: ShellId,
        command_id: CommandId,
    },
    Signal {
        shell_id: ShellId,
        #[serde(default)]
        command_id: Option<CommandId>,
    },
    /// Ping for keepalive.
    Ping,
}

impl ClientCall {
    /// Short operation name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateShell { .. } => "create_shell",
            Self::DeleteShell { .. } => "delete_shell",
            Self::GetShell { .. } => "get_shell",
            Self::EnumerateShells => "enumerate_shells",
            Self::ModifyShell { .. } => "modify_shell",
            Self::Connect { .. } => "connect",
            Self::Command { .. } => "command",
            Self::Send { .. } => "send",
            Self::Receive { .. } => "receive",
            Self::Signal { .. } => "signal",
            Self::Ping => "ping",
        }
    }
}

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    ShellCreated { shell_id: ShellId },
    Shell(ShellSummary),
    Enumerated { count: usize },
    CommandStarted { command_id: CommandId },
    Received(ReceiveReply),
    Pong,
}

/// Response from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    pub request_id: u64,
    pub code: ReplyCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

impl ServerResponse {
    /// Successful response carrying `body`.
    #[must_use]
    pub const fn ok(request_id: u64, body: ResponseBody) -> Self {
        Self {
            request_id,
            code: ReplyCode::Ok,
            message: None,
            body: Some(body),
        }
    }

    /// Successful response with nothing to report.
    #[must_use]
    pub const fn done(request_id: u64) -> Self {
        Self {
            request_id,
            code: ReplyCode::Ok,
            message: None,
            body: None,
        }
    }

    /// Error response.
    #[must_use]
    pub fn error(request_id: u64, err: &ShellError) -> Self {
        Self {
            request_id,
            code: err.code(),
            message: Some(err.to_string()),
            body: None,
        }
    }

    #[must_use]
    pub fn from_result(request_id: u64, result: ShellResult<ResponseBody>) -> Self {
        match result {
            Ok(body) => Self::ok(request_id, body),
            Err(err) => Self::error(request_id, &err),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == ReplyCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use remote_shell_core::{CommandState, CommandStateKind};

    use super::*;

    #[test]
    fn test_request_parsing() {
        let json = r#"{"request_id":7,"type":"create_shell","output_streams":"stdout stderr"}"#;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.request_id, 7);
        match request.call {
            ClientCall::CreateShell {
                output_streams,
                compressed,
            } => {
                assert_eq!(output_streams, "stdout stderr");
                assert!(!compressed);
            }
            other => panic!("Wrong call: {}", other.name()),
        }
    }

    #[test]
    fn test_signal_without_command_id() {
        let json = r#"{"request_id":1,"type":"signal","shell_id":"00000000000000A1"}"#;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(
            request.call,
            ClientCall::Signal { command_id: None, .. }
        ));
    }

    #[test]
    fn test_error_response() {
        let response =
            ServerResponse::error(3, &ShellError::NotFound("shell 00000000000000A1".to_string()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["request_id"], 3);
        assert_eq!(json["code"], "not_found");
        assert!(json.get("body").is_none());
        assert!(!response.is_ok());
    }

    #[test]
    fn test_received_body_carries_state_uri() {
        let reply = ReceiveReply {
            command_state: CommandState {
                command_id: Some(CommandId::from("00000000000000B2")),
                state: CommandStateKind::Done,
                exit_code: Some(0),
            },
            streams: Vec::new(),
        };
        let response = ServerResponse::ok(9, ResponseBody::Received(reply));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""type":"received""#));
        assert!(json.contains("CommandState/Done"));

        let parsed: ServerResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, response);
    }
}
