//! Tool system for the toolbar
//!
//! Defines the available editing tools and the drag session state

use crate::hit_test::HandleType;
use crate::history::HistoryToken;
use crate::layer::LayerId;
use crate::transform::{LayerTransform, Viewport};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Editing tools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    /// Selection tool - select, move and transform layers
    #[default]
    Select,
    /// Move tool - same gestures as select
    Move,
    /// Hand tool - pan the viewport
    Hand,
}

impl Tool {
    /// Get display name for the tool
    pub fn display_name(self) -> &'static str {
        match self {
            Tool::Select => "Select",
            Tool::Move => "Move",
            Tool::Hand => "Hand",
        }
    }

    /// Get all available tools
    pub fn all() -> &'static [Tool] {
        &[Tool::Select, Tool::Move, Tool::Hand]
    }

    /// Get keyboard shortcut hint
    pub fn shortcut_hint(self) -> &'static str {
        match self {
            Tool::Select => "V",
            Tool::Move => "M",
            Tool::Hand => "H",
        }
    }

    /// Look up a tool from its (case-insensitive) shortcut key
    pub fn from_shortcut(key: &str) -> Option<Tool> {
        Tool::all()
            .iter()
            .copied()
            .find(|tool| tool.shortcut_hint().eq_ignore_ascii_case(key))
    }
}

/// Drag session tracked between pointer down and pointer up
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DragState {
    /// No gesture in progress
    #[default]
    Idle,

    /// Panning the viewport
    Panning {
        start_screen: Point,
        start_viewport: Viewport,
    },

    /// Translating a layer
    Moving {
        layer_id: LayerId,
        start_canvas: Point,
        start_transform: LayerTransform,
        snapshot: HistoryToken,
    },

    /// Rotating a layer about its centre
    Rotating {
        layer_id: LayerId,
        start_canvas: Point,
        start_transform: LayerTransform,
        snapshot: HistoryToken,
    },

    /// Uniformly scaling a layer from a corner handle
    Scaling {
        layer_id: LayerId,
        handle: HandleType,
        start_canvas: Point,
        start_transform: LayerTransform,
        snapshot: HistoryToken,
    },
}

impl DragState {
    /// Layer edited by the session, if it affects a transform
    pub fn layer_id(&self) -> Option<LayerId> {
        match self {
            DragState::Moving { layer_id, .. }
            | DragState::Rotating { layer_id, .. }
            | DragState::Scaling { layer_id, .. } => Some(*layer_id),
            DragState::Idle | DragState::Panning { .. } => None,
        }
    }

    /// Transform recorded when the session started
    pub fn start_transform(&self) -> Option<&LayerTransform> {
        match self {
            DragState::Moving { start_transform, .. }
            | DragState::Rotating { start_transform, .. }
            | DragState::Scaling { start_transform, .. } => Some(start_transform),
            DragState::Idle | DragState::Panning { .. } => None,
        }
    }

    /// History entry pushed when the session started
    pub fn snapshot(&self) -> Option<HistoryToken> {
        match self {
            DragState::Moving { snapshot, .. }
            | DragState::Rotating { snapshot, .. }
            | DragState::Scaling { snapshot, .. } => Some(*snapshot),
            DragState::Idle | DragState::Panning { .. } => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, DragState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortcuts_are_unique() {
        let hints: Vec<_> = Tool::all().iter().map(|t| t.shortcut_hint()).collect();
        assert_eq!(hints, vec!["V", "M", "H"]);
        assert_eq!(Tool::from_shortcut("h"), Some(Tool::Hand));
        assert_eq!(Tool::from_shortcut("x"), None);
    }

    #[test]
    fn test_drag_state_accessors() {
        let id = uuid::Uuid::new_v4();
        let mut history = crate::history::History::new();
        let token = history.push(crate::history::HistoryEntry::new(crate::scene::Scene::new(), "Rotate Layer"));
        let state = DragState::Rotating {
            layer_id: id,
            start_canvas: Point::ZERO,
            start_transform: LayerTransform::default(),
            snapshot: token,
        };
        assert_eq!(state.layer_id(), Some(id));
        assert!(state.start_transform().is_some());
        assert_eq!(state.snapshot(), Some(token));
        assert_eq!(DragState::default().layer_id(), None);
        assert_eq!(DragState::default().snapshot(), None);
        assert!(DragState::default().is_idle());
    }
}
