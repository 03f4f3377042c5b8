//! Tool-calling adapter.
//!
//! Backends with function calling get OpenAI `tools` and answer with
//! structured `tool_calls` ([`native`]). Backends without it get a system
//! prompt describing an XML call grammar, and their prose is scanned back
//! into `tool_use` blocks ([`xml`]).
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod native;
pub mod xml;

pub use native::{decode_arguments, tool_calls_to_blocks};
pub use xml::{rewrite_request_for_xml, XmlToolParser};

/// How tools are exchanged with the backend for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    /// Request carries no tools; nothing is injected or parsed.
    None,
    Native,
    Xml,
}

impl ToolMode {
    pub fn select(needs_xml_tools: bool, has_tools: bool) -> Self {
        match (has_tools, needs_xml_tools) {
            (false, _) => ToolMode::None,
            (true, true) => ToolMode::Xml,
            (true, false) => ToolMode::Native,
        }
    }

    pub fn is_xml(self) -> bool {
        self == ToolMode::Xml
    }
}

/// Tool names recognized in XML mode even when the request did not declare
/// them. `Task` is deliberately absent: its tag shows up in ordinary prose.
pub const BUILTIN_TOOL_NAMES: &[&str] = &[
    "Read",
    "Write",
    "Edit",
    "MultiEdit",
    "Bash",
    "BashOutput",
    "KillShell",
    "Glob",
    "Grep",
    "LS",
    "WebFetch",
    "WebSearch",
    "TodoWrite",
    "NotebookEdit",
    "NotebookRead",
    "ExitPlanMode",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selection() {
        assert_eq!(ToolMode::select(true, false), ToolMode::None);
        assert_eq!(ToolMode::select(false, false), ToolMode::None);
        assert_eq!(ToolMode::select(true, true), ToolMode::Xml);
        assert_eq!(ToolMode::select(false, true), ToolMode::Native);
    }

    #[test]
    fn test_task_is_not_builtin() {
        assert!(!BUILTIN_TOOL_NAMES.contains(&"Task"));
        assert!(BUILTIN_TOOL_NAMES.contains(&"Read"));
    }
}
