//! DAP message types
//!
//! These types represent the Debug Adapter Protocol messages as seen from
//! the adapter side: requests come in, responses and events go out.
//! See: https://microsoft.github.io/debug-adapter-protocol/specification

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// === Base Protocol Messages ===

/// Client request, as handed to a request handler
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    pub arguments: Value,
}

impl Request {
    /// Build a request from a packet already known to have `type: request`
    ///
    /// Missing fields fall back to neutral values so an unknown or empty
    /// command is reported by the dispatcher rather than the parser.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            seq: object.get("seq").and_then(Value::as_i64).unwrap_or(0),
            command: object
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            arguments: object.get("arguments").cloned().unwrap_or(Value::Null),
        }
    }

    /// Deserialize the arguments into a typed structure
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        let arguments = match &self.arguments {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(arguments).map_err(|e| {
            crate::Error::invalid_arguments(format!("{}: {}", self.command, e))
        })
    }
}

/// Adapter-initiated request sent to the client
#[derive(Debug, Clone, Serialize)]
pub struct RequestMessage<'a> {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub command: &'a str,
    pub arguments: Value,
}

impl<'a> RequestMessage<'a> {
    pub fn new(seq: i64, command: &'a str, arguments: Value) -> Self {
        Self {
            seq,
            message_type: "request",
            command,
            arguments,
        }
    }
}

/// DAP response message
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMessage<'a> {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub request_seq: i64,
    pub success: bool,
    pub command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl<'a> ResponseMessage<'a> {
    pub fn success(request: &'a Request, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            message_type: "response",
            request_seq: request.seq,
            success: true,
            command: &request.command,
            message: None,
            body,
        }
    }

    pub fn error(request: &'a Request, message: impl Into<String>) -> Self {
        Self {
            seq: 0,
            message_type: "response",
            request_seq: request.seq,
            success: false,
            command: &request.command,
            message: Some(message.into()),
            body: None,
        }
    }
}

/// DAP event message
#[derive(Debug, Clone, Serialize)]
pub struct EventMessage<'a> {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl<'a> EventMessage<'a> {
    pub fn new(event: &'a str, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            message_type: "event",
            event,
            body,
        }
    }
}

// === Request Arguments ===

/// Launch request arguments understood by the baseline handlers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub target_triple: Option<String>,
    #[serde(default)]
    pub platform_name: Option<String>,
    #[serde(default)]
    pub stop_on_entry: bool,
    #[serde(default)]
    pub init_commands: Vec<String>,
    #[serde(default)]
    pub pre_run_commands: Vec<String>,
    #[serde(default)]
    pub launch_commands: Vec<String>,
    #[serde(default)]
    pub stop_commands: Vec<String>,
    #[serde(default)]
    pub exit_commands: Vec<String>,
    #[serde(default)]
    pub terminate_commands: Vec<String>,
    #[serde(default)]
    pub custom_frame_format: Option<String>,
    #[serde(default)]
    pub custom_thread_format: Option<String>,
    /// Seconds to wait for the process to stop after launch
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Attach request arguments understood by the baseline handlers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArguments {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub pid: Option<u64>,
    #[serde(default)]
    pub target_triple: Option<String>,
    #[serde(default)]
    pub platform_name: Option<String>,
    #[serde(default)]
    pub init_commands: Vec<String>,
    #[serde(default)]
    pub pre_run_commands: Vec<String>,
    #[serde(default)]
    pub attach_commands: Vec<String>,
    #[serde(default)]
    pub stop_commands: Vec<String>,
    #[serde(default)]
    pub exit_commands: Vec<String>,
    #[serde(default)]
    pub terminate_commands: Vec<String>,
    /// Seconds to wait for the process to stop after attaching
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default)]
    pub frame_id: Option<i64>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExceptionBreakpointsArguments {
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInstructionBreakpointsArguments {
    #[serde(default)]
    pub breakpoints: Vec<InstructionBreakpointArgument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionBreakpointArgument {
    pub instruction_reference: String,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default)]
    pub terminate_debuggee: Option<bool>,
}

// === Response Bodies ===

/// Subset of adapter capabilities reported by `initialize`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_evaluate_for_hovers: bool,
    pub supports_instruction_breakpoints: bool,
    pub supports_progress_reporting: bool,
    pub supports_exception_filter_options: bool,
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointsFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionBreakpointsFilter {
    pub filter: String,
    pub label: String,
    pub default: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub presentation_hint: &'static str,
    pub variables_reference: i64,
    pub named_variables: usize,
    pub expensive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    pub result: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub variables_reference: i64,
}

// === Event Bodies ===

/// Category of an `output` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
    Telemetry,
}

impl OutputCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Telemetry => "telemetry",
        }
    }
}

impl std::fmt::Display for OutputCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputEventBody<'a> {
    pub category: OutputCategory,
    pub output: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    pub exit_code: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub thread_id: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hit_breakpoint_ids: Vec<i64>,
    pub all_threads_stopped: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStartEventBody {
    pub progress_id: String,
    pub title: String,
    pub cancellable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdateEventBody {
    pub progress_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEndEventBody {
    pub progress_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
