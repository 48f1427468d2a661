//! Keyboard shortcut mapping
//!
//! Translates key presses into [`EditorCommand`]s. Undo, redo and the
//! shortcut-help toggle always work; every other shortcut is suppressed while
//! a modal dialog is open.

use crate::tool::Tool;

/// A key press as delivered by the host toolkit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    /// Key name (`"z"`, `"Delete"`, `"?"`, ...)
    pub key: String,
    /// Ctrl on Linux/Windows, Cmd on macOS
    pub ctrl: bool,
    pub shift: bool,
}

impl KeyPress {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            shift: false,
        }
    }

    pub fn ctrl(key: impl Into<String>) -> Self {
        Self {
            ctrl: true,
            ..Self::new(key)
        }
    }

    pub fn ctrl_shift(key: impl Into<String>) -> Self {
        Self {
            ctrl: true,
            shift: true,
            ..Self::new(key)
        }
    }
}

/// Editor-level commands reachable from the keyboard or toolbar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    Undo,
    Redo,
    ToggleShortcutHelp,
    SelectTool(Tool),
    DeleteSelected,
    DuplicateSelected,
    OpenExport,
    FitToScreen,
    ZoomIn,
    ZoomOut,
    ZoomReset,
}

/// Map a key press to a command
///
/// `modal_open` is true while the export, settings or shortcut-help dialog
/// is shown.
pub fn command_for_key(press: &KeyPress, modal_open: bool) -> Option<EditorCommand> {
    let key = press.key.to_lowercase();

    // Shift+Cmd+Z reports an uppercase key on macOS
    if press.ctrl && key == "z" {
        return Some(if press.shift {
            EditorCommand::Redo
        } else {
            EditorCommand::Undo
        });
    }
    if press.key == "?" {
        return Some(EditorCommand::ToggleShortcutHelp);
    }
    if modal_open {
        return None;
    }

    if press.ctrl {
        return match key.as_str() {
            "e" => Some(EditorCommand::OpenExport),
            "0" => Some(EditorCommand::FitToScreen),
            _ => None,
        };
    }

    match key.as_str() {
        "delete" | "backspace" => Some(EditorCommand::DeleteSelected),
        other => Tool::from_shortcut(other).map(EditorCommand::SelectTool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo_always_available() {
        assert_eq!(command_for_key(&KeyPress::ctrl("z"), true), Some(EditorCommand::Undo));
        assert_eq!(command_for_key(&KeyPress::ctrl_shift("Z"), true), Some(EditorCommand::Redo));
        assert_eq!(
            command_for_key(&KeyPress::new("?"), true),
            Some(EditorCommand::ToggleShortcutHelp)
        );
    }

    #[test]
    fn test_modal_suppresses_editing_shortcuts() {
        assert_eq!(command_for_key(&KeyPress::new("v"), true), None);
        assert_eq!(command_for_key(&KeyPress::new("Delete"), true), None);
        assert_eq!(command_for_key(&KeyPress::ctrl("e"), true), None);
    }

    #[test]
    fn test_tool_and_editing_shortcuts() {
        assert_eq!(
            command_for_key(&KeyPress::new("H"), false),
            Some(EditorCommand::SelectTool(Tool::Hand))
        );
        assert_eq!(
            command_for_key(&KeyPress::new("m"), false),
            Some(EditorCommand::SelectTool(Tool::Move))
        );
        assert_eq!(
            command_for_key(&KeyPress::new("Backspace"), false),
            Some(EditorCommand::DeleteSelected)
        );
        assert_eq!(command_for_key(&KeyPress::ctrl("e"), false), Some(EditorCommand::OpenExport));
        assert_eq!(command_for_key(&KeyPress::ctrl("0"), false), Some(EditorCommand::FitToScreen));
        // Ctrl+V is not a tool switch
        assert_eq!(command_for_key(&KeyPress::ctrl("v"), false), None);
        assert_eq!(command_for_key(&KeyPress::new("q"), false), None);
    }
}
