use crate::geometry::{
    corner_at, Corner, Point, Rect, DEFAULT_HANDLE_THRESHOLD, DEFAULT_MIN_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionState {
    #[default]
    Free,
    Drawing,
    Moving,
    ResizingTopRight,
    ResizingBottomRight,
    ResizingBottomLeft,
    ResizingTopLeft,
}

impl SelectionState {
    pub const fn resizing(corner: Corner) -> Self {
        match corner {
            Corner::TopLeft => Self::ResizingTopLeft,
            Corner::TopRight => Self::ResizingTopRight,
            Corner::BottomLeft => Self::ResizingBottomLeft,
            Corner::BottomRight => Self::ResizingBottomRight,
        }
    }

    pub const fn corner(self) -> Option<Corner> {
        match self {
            Self::ResizingTopLeft => Some(Corner::TopLeft),
            Self::ResizingTopRight => Some(Corner::TopRight),
            Self::ResizingBottomLeft => Some(Corner::BottomLeft),
            Self::ResizingBottomRight => Some(Corner::BottomRight),
            Self::Free | Self::Drawing | Self::Moving => None,
        }
    }
}

/// How a pointer release is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Releasing the pointer captures immediately.
    #[default]
    Simple,
    /// Releasing keeps the rectangle for further moves/resizes until Enter or Escape.
    Adjustable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Crosshair,
    Move,
    TopLeftCorner,
    TopRightCorner,
    BottomLeftCorner,
    BottomRightCorner,
}

impl CursorShape {
    pub const fn for_corner(corner: Corner) -> Self {
        match corner {
            Corner::TopLeft => Self::TopLeftCorner,
            Corner::TopRight => Self::TopRightCorner,
            Corner::BottomLeft => Self::BottomLeftCorner,
            Corner::BottomRight => Self::BottomRightCorner,
        }
    }

    pub const fn for_state(state: SelectionState) -> Self {
        match state {
            SelectionState::Free | SelectionState::Drawing => Self::Crosshair,
            SelectionState::Moving => Self::Move,
            SelectionState::ResizingTopLeft => Self::TopLeftCorner,
            SelectionState::ResizingTopRight => Self::TopRightCorner,
            SelectionState::ResizingBottomLeft => Self::BottomLeftCorner,
            SelectionState::ResizingBottomRight => Self::BottomRightCorner,
        }
    }
}

/// Everything the selection machine knows about one interaction. Each event produces a
/// fresh value; nothing is mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionContext {
    pub state: SelectionState,
    pub mode: SelectionMode,
    pub rect: Rect,
    pub click: Point,
    /// Latest pointer position reported by any pointer event.
    pub pointer: Point,
    pub anchor: Rect,
    pub screen: Rect,
    pub min_size: u32,
    pub handle_threshold: u32,
    pub has_selection: bool,
    pub cursor: CursorShape,
}

impl SelectionContext {
    pub const fn new(screen: Rect, mode: SelectionMode) -> Self {
        Self {
            state: SelectionState::Free,
            mode,
            rect: Rect::new(0, 0, 0, 0),
            click: Point::new(0, 0),
            pointer: Point::new(0, 0),
            anchor: Rect::new(0, 0, 0, 0),
            screen,
            min_size: DEFAULT_MIN_SIZE,
            handle_threshold: DEFAULT_HANDLE_THRESHOLD,
            has_selection: false,
            cursor: CursorShape::Crosshair,
        }
    }

    pub const fn with_min_size(mut self, min_size: u32) -> Self {
        self.min_size = min_size;
        self
    }

    pub const fn with_handle_threshold(mut self, handle_threshold: u32) -> Self {
        self.handle_threshold = handle_threshold;
        self
    }

    /// Whether a press at `point` would pick up the existing rectangle instead of
    /// starting a new one.
    pub fn adjustable_selection(&self) -> bool {
        self.mode == SelectionMode::Adjustable && self.has_selection && !self.rect.is_empty()
    }

    /// State a primary press at `point` starts.
    pub fn classify_press(&self, point: Point) -> SelectionState {
        if !self.adjustable_selection() {
            return SelectionState::Drawing;
        }
        if let Some(corner) = corner_at(self.rect, point, self.handle_threshold) {
            return SelectionState::resizing(corner);
        }
        if self.rect.contains_strictly(point) {
            return SelectionState::Moving;
        }
        SelectionState::Drawing
    }

    /// Cursor shown while hovering in the free state.
    pub fn hover_cursor(&self, point: Point) -> CursorShape {
        CursorShape::for_state(self.classify_press(point))
    }
}
