//! Screen-space geometry shared by the selection machine, the capture resolver and the
//! compositor. Everything here is pure and works in root-window coordinates.

pub const DEFAULT_MIN_SIZE: u32 = 10;
pub const DEFAULT_HANDLE_THRESHOLD: u32 = 10;
pub const WINDOW_SELECTION_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rect from its edges; inverted edges collapse to zero size.
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: span(left, right),
            height: span(top, bottom),
        }
    }

    pub fn right(self) -> i32 {
        self.x.saturating_add(to_i32(self.width))
    }

    pub fn bottom(self) -> i32 {
        self.y.saturating_add(to_i32(self.height))
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::from_edges(left, top, right, bottom))
    }

    /// True when `point` lies inside the rect and not on its border.
    pub fn contains_strictly(self, point: Point) -> bool {
        point.x > self.x && point.x < self.right() && point.y > self.y && point.y < self.bottom()
    }

    pub fn offset(self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomLeft,
        Self::BottomRight,
    ];

    pub const fn edges(self) -> (Edge, Edge) {
        match self {
            Self::TopLeft => (Edge::Left, Edge::Top),
            Self::TopRight => (Edge::Right, Edge::Top),
            Self::BottomLeft => (Edge::Left, Edge::Bottom),
            Self::BottomRight => (Edge::Right, Edge::Bottom),
        }
    }

    pub fn point(self, rect: Rect) -> Point {
        match self {
            Self::TopLeft => Point::new(rect.x, rect.y),
            Self::TopRight => Point::new(rect.right(), rect.y),
            Self::BottomLeft => Point::new(rect.x, rect.bottom()),
            Self::BottomRight => Point::new(rect.right(), rect.bottom()),
        }
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn span(from: i32, to: i32) -> u32 {
    u32::try_from(i64::from(to) - i64::from(from)).unwrap_or(0)
}

/// Rect spanned by two pointer positions, independent of drag direction.
pub fn normalize(start: Point, current: Point) -> Rect {
    Rect::new(
        start.x.min(current.x),
        start.y.min(current.y),
        start.x.abs_diff(current.x),
        start.y.abs_diff(current.y),
    )
}

/// Moves one edge of `anchor` by the pointer displacement along that edge's axis.
///
/// The opposite edge stays pinned. The moving edge never gets closer than `min_size` to it
/// and never leaves `screen`; when both cannot hold the screen bounds win.
pub fn resize_edge(
    edge: Edge,
    anchor: Rect,
    click: Point,
    current: Point,
    screen: Rect,
    min_size: u32,
) -> Rect {
    let min = to_i32(min_size);
    let dx = current.x.saturating_sub(click.x);
    let dy = current.y.saturating_sub(click.y);
    let (mut left, mut top, mut right, mut bottom) =
        (anchor.x, anchor.y, anchor.right(), anchor.bottom());

    match edge {
        Edge::Left => {
            left = left.saturating_add(dx).min(right.saturating_sub(min));
            left = left.max(screen.x);
        }
        Edge::Right => {
            right = right.saturating_add(dx).max(left.saturating_add(min));
            right = right.min(screen.right());
        }
        Edge::Top => {
            top = top.saturating_add(dy).min(bottom.saturating_sub(min));
            top = top.max(screen.y);
        }
        Edge::Bottom => {
            bottom = bottom.saturating_add(dy).max(top.saturating_add(min));
            bottom = bottom.min(screen.bottom());
        }
    }

    Rect::from_edges(left, top, right, bottom)
}

/// Corner resize as one horizontal and one vertical edge resize.
pub fn resize_corner(
    corner: Corner,
    anchor: Rect,
    click: Point,
    current: Point,
    screen: Rect,
    min_size: u32,
) -> Rect {
    let (horizontal, vertical) = corner.edges();
    let resized = resize_edge(horizontal, anchor, click, current, screen, min_size);
    resize_edge(vertical, resized, click, current, screen, min_size)
}

/// Translates `rect` without resizing it, keeping it inside `screen`.
pub fn translate_within(rect: Rect, dx: i32, dy: i32, screen: Rect) -> Rect {
    let max_x = screen
        .right()
        .saturating_sub(to_i32(rect.width))
        .max(screen.x);
    let max_y = screen
        .bottom()
        .saturating_sub(to_i32(rect.height))
        .max(screen.y);
    Rect::new(
        rect.x.saturating_add(dx).clamp(screen.x, max_x),
        rect.y.saturating_add(dy).clamp(screen.y, max_y),
        rect.width,
        rect.height,
    )
}

/// A release with almost no motion means "pick the window under the pointer".
pub fn click_is_window_selection(rect: Rect, threshold: u32) -> bool {
    rect.width < threshold && rect.height < threshold
}

/// Corner of `rect` within `threshold` of `point` on both axes, if any.
pub fn corner_at(rect: Rect, point: Point, threshold: u32) -> Option<Corner> {
    Corner::ALL.into_iter().find(|corner| {
        let corner_point = corner.point(rect);
        corner_point.x.abs_diff(point.x) <= threshold
            && corner_point.y.abs_diff(point.y) <= threshold
    })
}
