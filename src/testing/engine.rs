//! In-memory debugging engine
//!
//! Scripted state instead of a real debuggee: languages, commands,
//! variables, process states and stop reasons are all set up front by the
//! test (or by the mock adapter binary) and read back by the session.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::common::{Error, Result};
use crate::engine::{
    BreakpointId, CommandOutput, DebugEngine, ExceptionSupport, FrameId, FrameScopes, Language,
    ProcessState, ThreadId, ThreadInfo, ValueSummary,
};

/// Value handle handed out by [`MockEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockValue {
    pub name: String,
    pub value: String,
    pub type_name: Option<String>,
    pub children: Vec<MockValue>,
}

impl MockValue {
    pub fn scalar(name: &str, value: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            type_name: Some(type_name.to_string()),
            children: Vec::new(),
        }
    }

    pub fn aggregate(name: &str, type_name: &str, children: Vec<MockValue>) -> Self {
        Self {
            name: name.to_string(),
            value: format!("{{{} fields}}", children.len()),
            type_name: Some(type_name.to_string()),
            children,
        }
    }
}

#[derive(Debug, Clone)]
struct LanguageEntry {
    language: Language,
    supported: bool,
    exceptions: ExceptionSupport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBreakpoint {
    Exception {
        language: Language,
        on_catch: bool,
        on_throw: bool,
    },
    Address(u64),
}

#[derive(Debug, Default)]
struct MockState {
    languages: Vec<LanguageEntry>,
    commands: HashSet<String>,
    scripted_commands: HashMap<String, CommandOutput>,
    commands_run: Vec<String>,
    locals: HashMap<FrameId, Vec<MockValue>>,
    globals: Vec<MockValue>,
    registers: Vec<MockValue>,
    next_breakpoint_id: BreakpointId,
    breakpoints: HashMap<BreakpointId, MockBreakpoint>,
    stop_reasons: HashMap<ThreadId, Vec<u64>>,
    process_states: VecDeque<ProcessState>,
    has_process: bool,
    threads: Vec<ThreadInfo>,
    target: Option<String>,
    target_error: Option<String>,
}

/// Scriptable [`DebugEngine`] implementation
#[derive(Debug)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Engine with C/C++ support, an unsupported Objective-C and Swift,
    /// Rust with panic breakpoints and a handful of common commands
    pub fn new() -> Self {
        let both = ExceptionSupport {
            on_throw: true,
            on_catch: true,
            ..Default::default()
        };
        let languages = vec![
            LanguageEntry {
                language: Language::C,
                supported: true,
                exceptions: ExceptionSupport::default(),
            },
            LanguageEntry {
                language: Language::CPlusPlus,
                supported: true,
                exceptions: both.clone(),
            },
            LanguageEntry {
                language: Language::ObjC,
                supported: false,
                exceptions: both.clone(),
            },
            LanguageEntry {
                language: Language::Swift,
                supported: false,
                exceptions: both,
            },
            LanguageEntry {
                language: Language::Other("rust".to_string()),
                supported: true,
                exceptions: ExceptionSupport {
                    on_throw: true,
                    on_catch: false,
                    throw_keyword: Some("panic".to_string()),
                    catch_keyword: None,
                },
            },
        ];

        let commands = ["bt", "breakpoint", "expression", "frame", "help", "p", "print", "settings", "thread"]
            .into_iter()
            .map(str::to_string)
            .collect();

        Self {
            state: Mutex::new(MockState {
                languages,
                commands,
                next_breakpoint_id: 1,
                threads: vec![ThreadInfo {
                    id: 1,
                    name: "main".to_string(),
                }],
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not take the other assertions with it
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add or replace a language entry
    pub fn set_language(&self, language: Language, supported: bool, exceptions: ExceptionSupport) {
        let mut state = self.state();
        state.languages.retain(|entry| entry.language != language);
        state.languages.push(LanguageEntry {
            language,
            supported,
            exceptions,
        });
    }

    pub fn add_command(&self, name: &str) {
        self.state().commands.insert(name.to_string());
    }

    /// Fix the result of one exact command line
    pub fn script_command(&self, command: &str, output: CommandOutput) {
        self.state()
            .scripted_commands
            .insert(command.to_string(), output);
    }

    /// Every command line run so far, in order
    pub fn commands_run(&self) -> Vec<String> {
        self.state().commands_run.clone()
    }

    pub fn set_locals(&self, frame: FrameId, locals: Vec<MockValue>) {
        self.state().locals.insert(frame, locals);
    }

    pub fn set_globals(&self, globals: Vec<MockValue>) {
        self.state().globals = globals;
    }

    pub fn set_registers(&self, registers: Vec<MockValue>) {
        self.state().registers = registers;
    }

    /// Queue process states; the last one repeats once the queue drains
    pub fn push_process_states(&self, states: impl IntoIterator<Item = ProcessState>) {
        let mut state = self.state();
        state.has_process = true;
        state.process_states.extend(states);
    }

    pub fn set_stop_reason(&self, thread: ThreadId, data: Vec<u64>) {
        self.state().stop_reasons.insert(thread, data);
    }

    pub fn fail_target_creation(&self, message: &str) {
        self.state().target_error = Some(message.to_string());
    }

    pub fn target(&self) -> Option<String> {
        self.state().target.clone()
    }

    /// Live breakpoints by ID
    pub fn breakpoints(&self) -> HashMap<BreakpointId, MockBreakpoint> {
        self.state().breakpoints.clone()
    }

    fn add_breakpoint(&self, breakpoint: MockBreakpoint) -> BreakpointId {
        let mut state = self.state();
        let id = state.next_breakpoint_id;
        state.next_breakpoint_id += 1;
        state.breakpoints.insert(id, breakpoint);
        id
    }

    fn entry(&self, language: &Language) -> Option<LanguageEntry> {
        self.state()
            .languages
            .iter()
            .find(|entry| &entry.language == language)
            .cloned()
    }
}

impl DebugEngine for MockEngine {
    type Value = MockValue;

    fn languages(&self) -> Vec<Language> {
        self.state()
            .languages
            .iter()
            .map(|entry| entry.language.clone())
            .collect()
    }

    fn supports_language(&self, language: &Language) -> bool {
        self.entry(language).map(|e| e.supported).unwrap_or(false)
    }

    fn exception_support(&self, language: &Language) -> ExceptionSupport {
        self.entry(language).map(|e| e.exceptions).unwrap_or_default()
    }

    fn create_exception_breakpoint(
        &self,
        language: &Language,
        on_catch: bool,
        on_throw: bool,
    ) -> Result<BreakpointId> {
        if !self.supports_language(language) {
            return Err(Error::engine(format!(
                "language {} is not supported",
                language.name()
            )));
        }
        Ok(self.add_breakpoint(MockBreakpoint::Exception {
            language: language.clone(),
            on_catch,
            on_throw,
        }))
    }

    fn create_address_breakpoint(&self, address: u64) -> Result<BreakpointId> {
        Ok(self.add_breakpoint(MockBreakpoint::Address(address)))
    }

    fn remove_breakpoint(&self, id: BreakpointId) -> Result<()> {
        self.state()
            .breakpoints
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::engine(format!("no breakpoint with id {id}")))
    }

    fn create_target(
        &self,
        program: &str,
        _target_triple: Option<&str>,
        _platform_name: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state();
        if let Some(message) = &state.target_error {
            return Err(Error::Engine(message.clone()));
        }
        state.target = Some(program.to_string());
        Ok(())
    }

    fn launch(&self, stop_on_entry: bool) -> Result<()> {
        let mut state = self.state();
        if state.target.is_none() {
            return Err(Error::engine("no target to launch"));
        }
        state.has_process = true;
        if state.process_states.is_empty() {
            let initial = if stop_on_entry {
                ProcessState::Stopped
            } else {
                ProcessState::Running
            };
            state.process_states.push_back(initial);
        }
        Ok(())
    }

    fn attach(&self, pid: u64) -> Result<()> {
        if pid == 0 {
            return Err(Error::engine("no such process"));
        }
        let mut state = self.state();
        state.has_process = true;
        if state.process_states.is_empty() {
            state.process_states.push_back(ProcessState::Stopped);
        }
        Ok(())
    }

    fn process_state(&self) -> Option<ProcessState> {
        let mut state = self.state();
        if !state.has_process {
            return None;
        }
        if state.process_states.len() > 1 {
            state.process_states.pop_front()
        } else {
            state.process_states.front().copied()
        }
    }

    fn threads(&self) -> Vec<ThreadInfo> {
        self.state().threads.clone()
    }

    fn stop_reason_data(&self, thread: ThreadId) -> Vec<u64> {
        self.state()
            .stop_reasons
            .get(&thread)
            .cloned()
            .unwrap_or_default()
    }

    fn command_exists(&self, name: &str) -> bool {
        self.state().commands.contains(name)
    }

    fn run_command(&self, command: &str) -> CommandOutput {
        let mut state = self.state();
        state.commands_run.push(command.to_string());

        if let Some(output) = state.scripted_commands.get(command) {
            return output.clone();
        }

        let name = command.split_whitespace().next().unwrap_or_default();
        if state.commands.contains(name) {
            CommandOutput {
                output: String::new(),
                succeeded: true,
            }
        } else {
            CommandOutput {
                output: format!("error: '{name}' is not a valid command.\n"),
                succeeded: false,
            }
        }
    }

    fn find_variable(&self, frame: FrameId, name: &str) -> Option<MockValue> {
        let state = self.state();
        state
            .locals
            .get(&frame)
            .into_iter()
            .flatten()
            .find(|value| value.name == name)
            .cloned()
    }

    fn evaluate(&self, frame: Option<FrameId>, expression: &str) -> Result<MockValue> {
        let expression = expression.trim();
        if let Some(value) = frame.and_then(|frame| self.find_variable(frame, expression)) {
            return Ok(value);
        }
        if let Some(value) = self
            .state()
            .globals
            .iter()
            .find(|value| value.name == expression)
        {
            return Ok(value.clone());
        }
        if let Ok(number) = expression.parse::<i64>() {
            return Ok(MockValue::scalar("", &number.to_string(), "int"));
        }
        Err(Error::engine(format!(
            "use of undeclared identifier '{expression}'"
        )))
    }

    fn frame_scopes(&self, frame: FrameId) -> FrameScopes<MockValue> {
        let state = self.state();
        FrameScopes {
            locals: state.locals.get(&frame).cloned().unwrap_or_default(),
            globals: state.globals.clone(),
            registers: state.registers.clone(),
        }
    }

    fn children(&self, value: &MockValue) -> Vec<MockValue> {
        value.children.clone()
    }

    fn summarize(&self, value: &MockValue) -> ValueSummary {
        ValueSummary {
            name: value.name.clone(),
            value: value.value.clone(),
            type_name: value.type_name.clone(),
            has_children: !value.children.is_empty(),
        }
    }

    fn validate_format(&self, format: &str) -> std::result::Result<(), String> {
        let mut depth = 0i32;
        for c in format.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return Err("unbalanced '}'".to_string());
            }
        }
        if depth != 0 {
            return Err("unterminated '{'".to_string());
        }
        Ok(())
    }
}
