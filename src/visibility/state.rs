use serde::{Deserialize, Serialize};

/// Inputs that change popup visibility independently of the selection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupInput {
    MouseDown,
    MouseUp,
    PointerEnter,
    PointerLeave,
    Pin(bool),
    ForceClose,
    /// Selection text differs from what the previous tick observed.
    SelectionChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupFlags {
    /// A response, error or loading view is on screen.
    pub pinned: bool,
    /// Cleared only when the selection text changes.
    pub force_closed: bool,
    pub inside_popup: bool,
    pub mouse_down: bool,
}

impl PopupFlags {
    pub fn apply(self, input: PopupInput) -> Self {
        match input {
            PopupInput::MouseDown => Self {
                mouse_down: true,
                ..self
            },
            PopupInput::MouseUp => Self {
                mouse_down: false,
                ..self
            },
            PopupInput::PointerEnter => Self {
                inside_popup: true,
                ..self
            },
            PopupInput::PointerLeave => Self {
                inside_popup: false,
                ..self
            },
            PopupInput::Pin(pinned) => Self { pinned, ..self },
            PopupInput::ForceClose => Self {
                pinned: false,
                force_closed: true,
                inside_popup: false,
                ..self
            },
            PopupInput::SelectionChanged => Self {
                force_closed: false,
                ..self
            },
        }
    }

    pub fn should_show(&self, selection_visible: bool) -> bool {
        !self.force_closed
            && (self.pinned || (!self.mouse_down && selection_visible) || self.inside_popup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PopupPhase {
    #[default]
    Hidden,
    ShownAtSelection,
    ShownCorner,
    Pinned,
}

impl PopupPhase {
    pub fn derive(flags: &PopupFlags, selection_visible: bool, cornered: bool) -> Self {
        if !flags.should_show(selection_visible) {
            PopupPhase::Hidden
        } else if flags.pinned {
            PopupPhase::Pinned
        } else if cornered {
            PopupPhase::ShownCorner
        } else {
            PopupPhase::ShownAtSelection
        }
    }

    pub fn is_shown(&self) -> bool {
        !matches!(self, PopupPhase::Hidden)
    }
}
