use crate::geometry::{Point, Rect};

use super::model::{CursorShape, SelectionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
    Other(u8),
}

impl From<u8> for PointerButton {
    fn from(button: u8) -> Self {
        match button {
            1 => Self::Primary,
            2 => Self::Middle,
            3 => Self::Secondary,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEvent {
    PointerDown { point: Point, button: PointerButton },
    PointerMove(Point),
    PointerUp(Point),
    KeyRelease(Key),
    Cancel,
}

impl SelectionEvent {
    /// Pointer position carried by the event, if any.
    pub const fn point(self) -> Option<Point> {
        match self {
            Self::PointerDown { point, .. } | Self::PointerMove(point) | Self::PointerUp(point) => {
                Some(point)
            }
            Self::KeyRelease(_) | Self::Cancel => None,
        }
    }
}

/// Side effects requested by a transition. The driver performs them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ShowOverlay(Rect),
    HideOverlay,
    SetCursor(CursorShape),
    ReleaseGrab,
    Capture(Rect),
    Cancel,
}

impl Effect {
    /// Capture and cancel end the interaction.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Capture(_) | Self::Cancel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionTransition {
    pub from: SelectionState,
    pub event: SelectionEvent,
    pub to: SelectionState,
}

impl SelectionTransition {
    pub const fn new(from: SelectionState, event: SelectionEvent, to: SelectionState) -> Self {
        Self { from, event, to }
    }
}
