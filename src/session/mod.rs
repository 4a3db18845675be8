//! Debug adapter session
//!
//! A [`Session`] owns one client connection: it reads frames, dispatches
//! requests to registered handlers, routes responses to pending reverse
//! requests and holds every piece of per-session state the handlers work
//! with (variable handles, breakpoint tables, console settings).

pub mod output;
pub mod progress;
pub mod repl;
pub mod reverse;
pub mod variables;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use crate::breakpoints::{breakpoint_ids, ExceptionBreakpointCatalog, InstructionBreakpoints};
use crate::common::config::{CommandBatches, SessionConfig};
use crate::common::{Error, Result};
use crate::dap::{
    EventMessage, ExitedEventBody, Frame, FrameReader, FrameWriter, OutputCategory, Request,
    ResponseMessage, Scope, StoppedEventBody,
};
use crate::engine::{DebugEngine, FrameId, ProcessState, ThreadId};
use crate::requests::RequestHandler;

use output::{OutputMultiplexer, OutputRedirector};
use progress::ProgressReporter;
use repl::{ReplDetection, ReplMode};
use reverse::{response_outcome, ReverseRequests};
use variables::{VariableRegistry, VARREF_GLOBALS, VARREF_LOCALS, VARREF_REGS};

/// Interval between process state checks while waiting for a stop
const STOP_POLL_INTERVAL: Duration = Duration::from_micros(250);

/// Prompt echoed in front of commands run from command batches
const COMMAND_ECHO_PROMPT: &str = "(dap) ";

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Sync + Unpin>>;

/// One debug adapter session over a client connection
pub struct Session<E: DebugEngine> {
    reader: FrameReader<BoxedReader>,
    writer: FrameWriter,
    handlers: HashMap<String, Arc<dyn RequestHandler<E>>>,
    reverse: ReverseRequests,
    output: OutputMultiplexer,
    progress: ProgressReporter,
    variables: VariableRegistry<E::Value>,
    exception_breakpoints: ExceptionBreakpointCatalog,
    instruction_breakpoints: InstructionBreakpoints,
    engine: Arc<E>,
    config: SessionConfig,
    commands: CommandBatches,
    repl_mode: ReplMode,
    frame_format: Option<String>,
    thread_format: Option<String>,
    configuration_done: bool,
    disconnecting: bool,
    redirectors: Vec<OutputRedirector>,
}

impl<E: DebugEngine> Session<E> {
    /// Create a session over a client connection
    ///
    /// Must be called from within a Tokio runtime: progress delivery runs
    /// on its own task.
    pub fn new<R, W>(reader: R, writer: W, engine: Arc<E>, config: SessionConfig) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncRead + Send + Sync + Unpin> = Box::new(reader);
        let writer = FrameWriter::new(writer);

        Self {
            reader: FrameReader::new(BufReader::new(boxed)),
            reverse: ReverseRequests::new(writer.clone()),
            output: OutputMultiplexer::new(writer.clone()),
            progress: ProgressReporter::spawn(writer.clone()),
            writer,
            handlers: HashMap::new(),
            variables: VariableRegistry::new(),
            exception_breakpoints: ExceptionBreakpointCatalog::new(),
            instruction_breakpoints: InstructionBreakpoints::new(),
            engine,
            repl_mode: config.repl_mode,
            frame_format: config.frame_format.clone(),
            thread_format: config.thread_format.clone(),
            commands: config.commands.clone(),
            config,
            configuration_done: false,
            disconnecting: false,
            redirectors: Vec::new(),
        }
    }

    /// Register the handler for a request command, replacing any previous one
    pub fn register_handler<H>(&mut self, command: &str, handler: H)
    where
        H: RequestHandler<E> + 'static,
    {
        self.handlers.insert(command.to_string(), Arc::new(handler));
    }

    pub fn has_handler(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    // === Receive loop ===

    /// Serve the client until it disconnects or the stream breaks
    ///
    /// Returns `Ok(())` on end of stream or after a `disconnect`. Framing
    /// and dispatch failures end the loop with an error. Either way, pending
    /// reverse requests fail with `SessionClosed` and output redirection
    /// stops.
    #[tracing::instrument(skip(self))]
    pub async fn run(&mut self) -> Result<()> {
        let result = self.receive_loop().await;

        let cancelled = self.reverse.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled pending reverse requests");
        }
        self.stop_output_redirection();

        match &result {
            Ok(()) => tracing::info!("Session finished"),
            Err(e) => tracing::error!("Session terminated: {}", e),
        }
        result
    }

    async fn receive_loop(&mut self) -> Result<()> {
        while !self.disconnecting {
            let payload = match self.reader.read_frame().await? {
                Frame::Payload(payload) => payload,
                Frame::EndOfStream => {
                    tracing::info!("Client closed the connection");
                    return Ok(());
                }
                Frame::Malformed(reason) => return Err(Error::MalformedFrame(reason)),
            };

            let value: Value = serde_json::from_slice(&payload)
                .map_err(|e| Error::MalformedJson(e.to_string()))?;
            let Value::Object(object) = value else {
                return Err(Error::NotAnObject);
            };

            self.handle_object(&object).await?;
        }
        Ok(())
    }

    async fn handle_object(&mut self, object: &Map<String, Value>) -> Result<()> {
        match object.get("type").and_then(Value::as_str) {
            Some("request") => {
                let request = Request::from_object(object);
                let Some(handler) = self.handlers.get(&request.command).cloned() else {
                    tracing::error!(command = %request.command, "Unhandled command");
                    return Err(Error::UnhandledCommand(request.command));
                };

                tracing::debug!(command = %request.command, seq = request.seq, "Dispatching request");
                if let Err(e) = handler.handle(self, &request).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    tracing::warn!(command = %request.command, "Request failed: {}", e);
                    self.send_error_response(&request, e.to_string()).await?;
                }
                Ok(())
            }
            Some("response") => {
                let request_seq = object
                    .get("request_seq")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                self.reverse.resolve(request_seq, response_outcome(object));
                Ok(())
            }
            Some(other) => Err(Error::UnhandledPacket(format!(
                "unknown message type \"{other}\""
            ))),
            None => Err(Error::UnhandledPacket("message has no type".to_string())),
        }
    }

    // === Sending ===

    pub async fn send_json(&self, message: &Value) -> Result<()> {
        self.writer.send_json(message).await
    }

    pub async fn send_response(&self, request: &Request, body: Option<Value>) -> Result<()> {
        let message = serde_json::to_value(ResponseMessage::success(request, body))?;
        self.send_json(&message).await
    }

    pub async fn send_error_response(&self, request: &Request, message: impl Into<String>) -> Result<()> {
        let message = serde_json::to_value(ResponseMessage::error(request, message))?;
        self.send_json(&message).await
    }

    pub async fn send_event(&self, event: &str, body: Option<Value>) -> Result<()> {
        let message = serde_json::to_value(EventMessage::new(event, body))?;
        self.send_json(&message).await
    }

    pub async fn send_output(&self, category: OutputCategory, output: &str) -> Result<()> {
        self.output.send_output(category, output).await
    }

    // === Output redirection ===

    /// Forward everything read from `reader` as output events
    pub fn redirect_output<R>(&mut self, reader: R, category: OutputCategory)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tracing::debug!(%category, "Redirecting output");
        self.redirectors
            .push(OutputRedirector::spawn(reader, category, self.output.clone()));
    }

    /// Stop every active redirection
    pub fn stop_output_redirection(&mut self) {
        for redirector in self.redirectors.drain(..) {
            redirector.stop();
        }
    }

    pub fn redirection_count(&self) -> usize {
        self.redirectors.len()
    }

    // === Stops ===

    /// Report a stop of `thread` to the client
    ///
    /// Temporary variable handles are dropped first. The stop reason is
    /// `exception` or `instruction breakpoint` only when every hit
    /// breakpoint is of that kind.
    pub async fn handle_stop(&mut self, thread: ThreadId) -> Result<()> {
        self.report_stop(thread, "pause").await
    }

    /// Report the initial stop of a process launched with stop-on-entry
    pub async fn handle_entry_stop(&mut self, thread: ThreadId) -> Result<()> {
        self.report_stop(thread, "entry").await
    }

    async fn report_stop(&mut self, thread: ThreadId, fallback_reason: &str) -> Result<()> {
        self.variables.clear();

        let data = self.engine.stop_reason_data(thread);
        let body = if let Some(bp) = self
            .exception_breakpoints
            .from_stop_reason(self.engine.as_ref(), &data)
        {
            StoppedEventBody {
                reason: "exception".to_string(),
                description: Some(bp.label),
                thread_id: thread,
                hit_breakpoint_ids: Vec::new(),
                all_threads_stopped: true,
            }
        } else if let Some(bp) = self.instruction_breakpoints.from_stop_reason(&data) {
            StoppedEventBody {
                reason: "instruction breakpoint".to_string(),
                description: None,
                thread_id: thread,
                hit_breakpoint_ids: vec![bp.id],
                all_threads_stopped: true,
            }
        } else if !data.is_empty() {
            StoppedEventBody {
                reason: "breakpoint".to_string(),
                description: None,
                thread_id: thread,
                hit_breakpoint_ids: breakpoint_ids(&data).collect(),
                all_threads_stopped: true,
            }
        } else {
            StoppedEventBody {
                reason: fallback_reason.to_string(),
                description: None,
                thread_id: thread,
                hit_breakpoint_ids: Vec::new(),
                all_threads_stopped: true,
            }
        };

        tracing::debug!(thread, reason = %body.reason, "Process stopped");
        self.send_event("stopped", Some(serde_json::to_value(body)?))
            .await?;
        self.run_stop_commands().await;
        Ok(())
    }

    /// Report that the debuggee exited
    ///
    /// Exit commands run first, then the client gets `exited` followed by
    /// `terminated`.
    pub async fn handle_process_exit(&mut self, exit_code: i64) -> Result<()> {
        tracing::info!(exit_code, "Process exited");
        self.run_exit_commands().await;
        let body = ExitedEventBody { exit_code };
        self.send_event("exited", Some(serde_json::to_value(body)?))
            .await?;
        self.send_event("terminated", None).await
    }

    /// Poll the engine until the process stops or `timeout` passes
    pub async fn wait_for_process_to_stop(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            let state = self.engine.process_state().ok_or(Error::InvalidProcess)?;
            match state {
                ProcessState::Stopped | ProcessState::Crashed => return Ok(()),
                ProcessState::Detached => return Err(Error::ProcessStateDuringLaunch("detached")),
                ProcessState::Exited => return Err(Error::ProcessStateDuringLaunch("exited")),
                ProcessState::Unloaded => return Err(Error::ProcessStateDuringLaunch("unloaded")),
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(Error::ProcessStopTimeout(timeout.as_secs()));
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
    }

    // === Target ===

    /// Create the debug target for `program`
    pub fn create_target(
        &self,
        program: &str,
        target_triple: Option<&str>,
        platform_name: Option<&str>,
    ) -> Result<()> {
        self.engine
            .create_target(program, target_triple, platform_name)
            .map_err(|e| {
                Error::Engine(format!(
                    "Could not create a target for a program '{program}': {e}."
                ))
            })
    }

    // === Command batches ===

    /// Run debugger commands, echoing them and their output to the console
    ///
    /// A `!` prefix marks a command that must succeed; the batch stops at
    /// its first failure and `false` is returned. A `?` prefix only echoes
    /// the command when it fails.
    pub async fn run_commands(&self, prefix: &str, commands: &[String]) -> bool {
        if commands.is_empty() {
            return true;
        }

        let mut transcript = format!("{prefix}\n");
        let mut required_failed = false;

        for command in commands {
            let mut line = command.as_str();
            let mut quiet = false;
            let mut required = false;
            loop {
                if let Some(rest) = line.strip_prefix('?') {
                    quiet = true;
                    line = rest;
                } else if let Some(rest) = line.strip_prefix('!') {
                    required = true;
                    line = rest;
                } else {
                    break;
                }
            }

            let result = self.engine.run_command(line);
            if !quiet || !result.succeeded {
                transcript.push_str(COMMAND_ECHO_PROMPT);
                transcript.push_str(line);
                transcript.push('\n');
                transcript.push_str(&result.output);
                if !result.output.is_empty() && !result.output.ends_with('\n') {
                    transcript.push('\n');
                }
            }

            if required && !result.succeeded {
                tracing::warn!(command = line, "Required command failed");
                required_failed = true;
                break;
            }
        }

        if let Err(e) = self.send_output(OutputCategory::Console, &transcript).await {
            tracing::warn!("Failed to send command output: {}", e);
        }
        !required_failed
    }

    pub async fn run_init_commands(&self) -> Result<()> {
        self.run_required("Running initCommands:", &self.commands.init, "initCommands")
            .await
    }

    pub async fn run_pre_run_commands(&self) -> Result<()> {
        self.run_required("Running preRunCommands:", &self.commands.pre_run, "preRunCommands")
            .await
    }

    pub async fn run_launch_commands(&self, commands: &[String]) -> Result<()> {
        self.run_required("Running launchCommands:", commands, "launch")
            .await
    }

    pub async fn run_attach_commands(&self, commands: &[String]) -> Result<()> {
        self.run_required("Running attachCommands:", commands, "attach")
            .await
    }

    pub async fn run_stop_commands(&self) {
        self.run_commands("Running stopCommands:", &self.commands.stop)
            .await;
    }

    pub async fn run_exit_commands(&self) {
        self.run_commands("Running exitCommands:", &self.commands.exit)
            .await;
    }

    pub async fn run_terminate_commands(&self) {
        self.run_commands("Running terminateCommands:", &self.commands.terminate)
            .await;
    }

    async fn run_required(&self, prefix: &str, commands: &[String], category: &'static str) -> Result<()> {
        if self.run_commands(prefix, commands).await {
            Ok(())
        } else {
            Err(Error::CommandsFailed(category))
        }
    }

    // === Console settings ===

    /// Use `format` for stack frame names; invalid formats are reported on the console
    pub async fn set_frame_format(&mut self, format: &str) -> Result<()> {
        if let Some(format) = self.validated_format("frame", format).await? {
            self.frame_format = Some(format);
        }
        Ok(())
    }

    /// Use `format` for thread names; invalid formats are reported on the console
    pub async fn set_thread_format(&mut self, format: &str) -> Result<()> {
        if let Some(format) = self.validated_format("thread", format).await? {
            self.thread_format = Some(format);
        }
        Ok(())
    }

    async fn validated_format(&self, kind: &'static str, format: &str) -> Result<Option<String>> {
        if format.is_empty() {
            return Ok(None);
        }
        match self.engine.validate_format(format) {
            Ok(()) => Ok(Some(format.to_string())),
            Err(reason) => {
                let error = Error::InvalidFormat {
                    kind,
                    format: format.to_string(),
                    reason,
                };
                self.send_output(OutputCategory::Console, &format!("{error}\n"))
                    .await?;
                Ok(None)
            }
        }
    }

    pub fn frame_format(&self) -> Option<&str> {
        self.frame_format.as_deref()
    }

    pub fn thread_format(&self) -> Option<&str> {
        self.thread_format.as_deref()
    }

    pub fn repl_mode(&self) -> ReplMode {
        self.repl_mode
    }

    pub fn set_repl_mode(&mut self, mode: ReplMode) {
        tracing::debug!(%mode, "REPL mode changed");
        self.repl_mode = mode;
    }

    /// Classify debug console input with the session's mode and escape prefix
    pub fn detect_repl_mode(&self, frame: Option<FrameId>, expression: &str, partial: bool) -> ReplDetection {
        repl::detect_repl_mode(
            self.engine.as_ref(),
            frame,
            expression,
            &self.config.command_escape_prefix,
            self.repl_mode,
            partial,
        )
    }

    // === Scopes ===

    /// Locals, Globals and Registers scopes for the current frame
    pub fn create_top_level_scopes(&self) -> Vec<Scope> {
        let scopes = self.variables.scopes();
        vec![
            scope("Locals", "locals", VARREF_LOCALS, scopes.locals.len()),
            scope("Globals", "globals", VARREF_GLOBALS, scopes.globals.len()),
            scope("Registers", "registers", VARREF_REGS, scopes.registers.len()),
        ]
    }

    // === Accessors ===

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_handle(&self) -> Arc<E> {
        self.engine.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn commands_mut(&mut self) -> &mut CommandBatches {
        &mut self.commands
    }

    pub fn variables(&self) -> &VariableRegistry<E::Value> {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableRegistry<E::Value> {
        &mut self.variables
    }

    pub fn exception_breakpoints(&self) -> &ExceptionBreakpointCatalog {
        &self.exception_breakpoints
    }

    pub fn instruction_breakpoints(&self) -> &InstructionBreakpoints {
        &self.instruction_breakpoints
    }

    pub fn instruction_breakpoints_mut(&mut self) -> &mut InstructionBreakpoints {
        &mut self.instruction_breakpoints
    }

    pub fn reverse_requests(&self) -> &ReverseRequests {
        &self.reverse
    }

    pub fn output(&self) -> &OutputMultiplexer {
        &self.output
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn is_configuration_done(&self) -> bool {
        self.configuration_done
    }

    pub fn set_configuration_done(&mut self) {
        self.configuration_done = true;
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting
    }

    /// Stop the receive loop after the current request
    pub fn set_disconnecting(&mut self) {
        self.disconnecting = true;
    }
}

fn scope(name: &str, hint: &'static str, reference: i64, size: usize) -> Scope {
    Scope {
        name: name.to_string(),
        presentation_hint: hint,
        variables_reference: reference,
        named_variables: size,
        expensive: false,
    }
}
