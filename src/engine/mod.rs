//! Debugging engine interface
//!
//! The session never sets breakpoints, unwinds stacks or evaluates
//! expressions itself. It reads state from, and issues control calls to,
//! an implementation of [`DebugEngine`].

use crate::common::Result;

/// Engine-side breakpoint identity
pub type BreakpointId = i64;

/// Engine-side thread identity
pub type ThreadId = i64;

/// Client-facing stack frame identity
pub type FrameId = i64;

/// Source language known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    CPlusPlus,
    ObjC,
    ObjCPlusPlus,
    Swift,
    /// Any other language, by its engine name (e.g. "rust", "go")
    Other(String),
}

impl Language {
    /// Engine name of the language
    pub fn name(&self) -> &str {
        match self {
            Self::C => "c",
            Self::CPlusPlus => "c++",
            Self::ObjC => "objective-c",
            Self::ObjCPlusPlus => "objective-c++",
            Self::Swift => "swift",
            Self::Other(name) => name,
        }
    }

    pub fn is_c_family(&self) -> bool {
        matches!(self, Self::C | Self::CPlusPlus | Self::ObjC | Self::ObjCPlusPlus)
    }
}

/// Exception breakpoint support the engine advertises for a language
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSupport {
    pub on_throw: bool,
    pub on_catch: bool,
    /// Language keyword for raising, if different from "throw"
    pub throw_keyword: Option<String>,
    /// Language keyword for handling, if different from "catch"
    pub catch_keyword: Option<String>,
}

/// Debuggee process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Invalid,
    Unloaded,
    Connected,
    Attaching,
    Launching,
    Stopped,
    Running,
    Stepping,
    Crashed,
    Detached,
    Exited,
    Suspended,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid"),
            Self::Unloaded => write!(f, "unloaded"),
            Self::Connected => write!(f, "connected"),
            Self::Attaching => write!(f, "attaching"),
            Self::Launching => write!(f, "launching"),
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Stepping => write!(f, "stepping"),
            Self::Crashed => write!(f, "crashed"),
            Self::Detached => write!(f, "detached"),
            Self::Exited => write!(f, "exited"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Result of running one debugger command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
    pub succeeded: bool,
}

/// Presentation of an engine value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSummary {
    pub name: String,
    pub value: String,
    pub type_name: Option<String>,
    pub has_children: bool,
}

/// Variables visible from one stack frame
#[derive(Debug, Clone)]
pub struct FrameScopes<V> {
    pub locals: Vec<V>,
    pub globals: Vec<V>,
    pub registers: Vec<V>,
}

impl<V> Default for FrameScopes<V> {
    fn default() -> Self {
        Self {
            locals: Vec::new(),
            globals: Vec::new(),
            registers: Vec::new(),
        }
    }
}

/// Debuggee thread as reported to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
}

/// The debugging engine the session drives
pub trait DebugEngine: Send + Sync + 'static {
    /// Engine value handle stored behind variable references
    type Value: Clone + Send + Sync + 'static;

    // === Language metadata ===

    /// Every language the engine knows about
    fn languages(&self) -> Vec<Language>;

    /// Whether a language plugin is loaded and usable
    fn supports_language(&self, language: &Language) -> bool;

    fn exception_support(&self, language: &Language) -> ExceptionSupport;

    // === Breakpoints ===

    fn create_exception_breakpoint(
        &self,
        language: &Language,
        on_catch: bool,
        on_throw: bool,
    ) -> Result<BreakpointId>;

    fn create_address_breakpoint(&self, address: u64) -> Result<BreakpointId>;

    fn remove_breakpoint(&self, id: BreakpointId) -> Result<()>;

    // === Target and process ===

    fn create_target(
        &self,
        program: &str,
        target_triple: Option<&str>,
        platform_name: Option<&str>,
    ) -> Result<()>;

    /// Start the debuggee in the current target
    fn launch(&self, stop_on_entry: bool) -> Result<()>;

    /// Attach to a running process, leaving it stopped
    fn attach(&self, pid: u64) -> Result<()>;

    /// Current process state, or `None` when there is no valid process
    fn process_state(&self) -> Option<ProcessState>;

    fn threads(&self) -> Vec<ThreadInfo>;

    /// Flat stop-reason data: breakpoint ID, location index, breakpoint ID, ...
    fn stop_reason_data(&self, thread: ThreadId) -> Vec<u64>;

    // === Commands ===

    /// Whether `name` is a built-in command, user command or alias
    fn command_exists(&self, name: &str) -> bool;

    fn run_command(&self, command: &str) -> CommandOutput;

    // === Values ===

    fn find_variable(&self, frame: FrameId, name: &str) -> Option<Self::Value>;

    fn evaluate(&self, frame: Option<FrameId>, expression: &str) -> Result<Self::Value>;

    fn frame_scopes(&self, frame: FrameId) -> FrameScopes<Self::Value>;

    fn children(&self, value: &Self::Value) -> Vec<Self::Value>;

    fn summarize(&self, value: &Self::Value) -> ValueSummary;

    /// Check a frame/thread format string, returning the parse error
    fn validate_format(&self, format: &str) -> std::result::Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_family() {
        assert!(Language::ObjCPlusPlus.is_c_family());
        assert!(!Language::Swift.is_c_family());
        assert!(!Language::Other("rust".into()).is_c_family());
    }

    #[test]
    fn test_language_names() {
        assert_eq!(Language::CPlusPlus.name(), "c++");
        assert_eq!(Language::Other("go".into()).name(), "go");
    }
}
