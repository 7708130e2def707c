//! Collaborator interfaces for output and hooks.
//!
//! The core never formats terminal output itself; it hands text to an
//! [`OutputManager`] supplied by the driver. Hook execution likewise goes
//! through the [`Hooks`] interface; the core only interprets exit
//! statuses.

use std::io::Write;

use crate::error::Result;

/// The kind of a diagnostic message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Debugging chatter.
    Debug,
    /// Informational.
    Info,
    /// Something the user should read.
    Warn,
    /// Something went wrong.
    Error,
    /// Raw log pass-through.
    Log,
}

/// Where an operation's textual output goes.
pub trait OutputManager: Send {
    /// Write a line to the operation's stdout stream.
    fn stdout(&mut self, text: &str);

    /// Write a line to the operation's stderr stream.
    fn stderr(&mut self, text: &str);

    /// Emit a classified diagnostic message.
    fn message(&mut self, kind: MessageKind, text: &str);

    /// Mark the operation as having succeeded; managers may use this to
    /// keep or discard buffered output.
    fn succeeded(&mut self);
}

/// Output manager writing directly to the process streams.
#[derive(Debug, Default)]
pub struct StandardOutputManager;

impl StandardOutputManager {
    /// Construct.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OutputManager for StandardOutputManager {
    fn stdout(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{text}");
    }

    fn stderr(&mut self, text: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{text}");
    }

    fn message(&mut self, kind: MessageKind, text: &str) {
        match kind {
            MessageKind::Debug => tracing::debug!("{}", text),
            MessageKind::Info | MessageKind::Log => tracing::info!("{}", text),
            MessageKind::Warn => tracing::warn!("{}", text),
            MessageKind::Error => tracing::error!("{}", text),
        }
    }

    fn succeeded(&mut self) {}
}

/// Output manager capturing everything, for tests and batch drivers.
#[derive(Debug, Default)]
pub struct BufferedOutputManager {
    /// Captured stdout lines.
    pub stdout_lines: Vec<String>,
    /// Captured stderr lines.
    pub stderr_lines: Vec<String>,
    /// Captured messages.
    pub messages: Vec<(MessageKind, String)>,
    /// Whether `succeeded` was called.
    pub succeeded: bool,
}

impl BufferedOutputManager {
    /// Construct.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputManager for BufferedOutputManager {
    fn stdout(&mut self, text: &str) {
        self.stdout_lines.push(text.to_string());
    }

    fn stderr(&mut self, text: &str) {
        self.stderr_lines.push(text.to_string());
    }

    fn message(&mut self, kind: MessageKind, text: &str) {
        self.messages.push((kind, text.to_string()));
    }

    fn succeeded(&mut self) {
        self.succeeded = true;
    }
}

/// Exit status by which a hook asks for the current entry or phase to be
/// skipped rather than performed or aborted.
pub const HOOK_SKIP_STATUS: i32 = 3;

/// The outcome of running one hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookResult {
    /// The highest exit status among the hook's parts.
    pub max_exit_status: i32,
    /// Captured output, when the hook protocol requests it.
    pub output: Option<String>,
}

impl HookResult {
    /// A result meaning "nothing ran, proceed".
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            max_exit_status: 0,
            output: None,
        }
    }

    /// Whether the hook asked for a skip.
    #[must_use]
    pub const fn requests_skip(&self) -> bool {
        self.max_exit_status == HOOK_SKIP_STATUS
    }

    /// Whether the hook demands an abort.
    #[must_use]
    pub const fn requests_abort(&self) -> bool {
        self.max_exit_status != 0 && self.max_exit_status != HOOK_SKIP_STATUS
    }
}

/// Hook execution interface.
pub trait Hooks: Send + Sync {
    /// Run the named hook with the given environment, returning the
    /// merged result.
    fn perform_hook(&self, name: &str, env: &[(String, String)]) -> Result<HookResult>;
}

/// Hook implementation that runs nothing and always proceeds.
#[derive(Debug, Default)]
pub struct NullHooks;

impl Hooks for NullHooks {
    fn perform_hook(&self, _name: &str, _env: &[(String, String)]) -> Result<HookResult> {
        Ok(HookResult::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_manager_captures() {
        let mut output = BufferedOutputManager::new();
        output.stdout("hello");
        output.message(MessageKind::Warn, "careful");
        output.succeeded();
        assert_eq!(output.stdout_lines, vec!["hello"]);
        assert_eq!(output.messages, vec![(MessageKind::Warn, "careful".to_string())]);
        assert!(output.succeeded);
    }

    #[test]
    fn test_hook_result_classification() {
        assert!(!HookResult::ok().requests_skip());
        assert!(HookResult { max_exit_status: 3, output: None }.requests_skip());
        assert!(HookResult { max_exit_status: 1, output: None }.requests_abort());
        assert!(!HookResult { max_exit_status: 3, output: None }.requests_abort());
    }

    #[test]
    fn test_null_hooks_proceed() {
        let hooks = NullHooks;
        let result = hooks.perform_hook("merger_install_file_pre", &[]).unwrap();
        assert_eq!(result.max_exit_status, 0);
    }
}
