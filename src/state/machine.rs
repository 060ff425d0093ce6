use crate::geometry::{normalize, resize_corner, translate_within, Point, Rect};

use super::event::{Effect, Key, PointerButton, SelectionEvent, SelectionTransition};
use super::model::{CursorShape, SelectionContext, SelectionMode, SelectionState};

/// Pure transition function of the selection state machine.
///
/// Returns the next context together with the side effects the driver has to perform.
/// Events that mean nothing in the current state yield the same context and no effects.
pub fn handle_event(
    context: &SelectionContext,
    event: SelectionEvent,
) -> (SelectionContext, Vec<Effect>) {
    let mut next = *context;
    let mut effects = Vec::new();
    if let Some(point) = event.point() {
        next.pointer = point;
    }

    match (context.state, event) {
        (_, SelectionEvent::Cancel) | (_, SelectionEvent::KeyRelease(Key::Escape)) => {
            effects.extend([Effect::ReleaseGrab, Effect::Cancel]);
        }
        (_, SelectionEvent::PointerDown { button, .. }) if button != PointerButton::Primary => {
            effects.extend([Effect::ReleaseGrab, Effect::Cancel]);
        }
        (SelectionState::Free, SelectionEvent::PointerDown { point, .. }) => {
            let state = context.classify_press(point);
            next.state = state;
            next.click = point;
            next.anchor = context.rect;
            if state == SelectionState::Drawing {
                next.rect = Rect::new(point.x, point.y, 0, 0);
                next.anchor = next.rect;
                next.has_selection = false;
            }
            set_cursor(&mut next, CursorShape::for_state(state), &mut effects);
        }
        (SelectionState::Free, SelectionEvent::PointerMove(point)) => {
            if context.adjustable_selection() {
                let cursor = context.hover_cursor(point);
                set_cursor(&mut next, cursor, &mut effects);
            }
        }
        (SelectionState::Free, SelectionEvent::KeyRelease(Key::Enter)) => {
            if context.mode == SelectionMode::Adjustable && context.has_selection {
                effects.extend([
                    Effect::ReleaseGrab,
                    Effect::HideOverlay,
                    Effect::Capture(context.rect),
                ]);
            }
        }
        (SelectionState::Free, _) => {}
        (_, SelectionEvent::PointerMove(point)) => {
            next.rect = dragged_rect(context, point);
            effects.push(Effect::ShowOverlay(next.rect));
        }
        (_, SelectionEvent::PointerUp(point)) => {
            next.rect = dragged_rect(context, point);
            next.state = SelectionState::Free;
            next.has_selection = true;
            match context.mode {
                SelectionMode::Simple => {
                    effects.extend([
                        Effect::ReleaseGrab,
                        Effect::HideOverlay,
                        Effect::Capture(next.rect),
                    ]);
                }
                SelectionMode::Adjustable => {
                    effects.push(Effect::ShowOverlay(next.rect));
                    let cursor = next.hover_cursor(point);
                    set_cursor(&mut next, cursor, &mut effects);
                }
            }
        }
        (_, SelectionEvent::PointerDown { .. }) | (_, SelectionEvent::KeyRelease(_)) => {}
    }

    (next, effects)
}

fn set_cursor(context: &mut SelectionContext, cursor: CursorShape, effects: &mut Vec<Effect>) {
    if context.cursor != cursor {
        context.cursor = cursor;
        effects.push(Effect::SetCursor(cursor));
    }
}

fn clamp_to_screen(point: Point, screen: Rect) -> Point {
    Point::new(
        point.x.clamp(screen.x, screen.right().max(screen.x)),
        point.y.clamp(screen.y, screen.bottom().max(screen.y)),
    )
}

fn dragged_rect(context: &SelectionContext, point: Point) -> Rect {
    let point = clamp_to_screen(point, context.screen);
    let dx = point.x.saturating_sub(context.click.x);
    let dy = point.y.saturating_sub(context.click.y);
    match context.state {
        SelectionState::Drawing => normalize(context.click, point),
        SelectionState::Moving => translate_within(context.anchor, dx, dy, context.screen),
        state => match state.corner() {
            Some(corner) => resize_corner(
                corner,
                context.anchor,
                context.click,
                point,
                context.screen,
                context.min_size,
            ),
            None => context.rect,
        },
    }
}

/// Owns the current selection context and records the state changes it went through.
#[derive(Debug)]
pub struct SelectionMachine {
    context: SelectionContext,
    transition_history: Vec<SelectionTransition>,
}

impl SelectionMachine {
    pub fn new(context: SelectionContext) -> Self {
        Self {
            context,
            transition_history: Vec::new(),
        }
    }

    pub fn context(&self) -> &SelectionContext {
        &self.context
    }

    pub fn state(&self) -> SelectionState {
        self.context.state
    }

    pub fn dispatch(&mut self, event: SelectionEvent) -> Vec<Effect> {
        let (next, effects) = handle_event(&self.context, event);
        if next.state != self.context.state {
            tracing::debug!(
                from = ?self.context.state,
                to = ?next.state,
                event = ?event,
                "selection state transition"
            );
            self.transition_history.push(SelectionTransition::new(
                self.context.state,
                event,
                next.state,
            ));
        }
        if effects.iter().any(|effect| effect.is_terminal()) {
            tracing::debug!(rect = %next.rect, ?effects, "selection finished");
        }
        self.context = next;
        effects
    }
}

#[cfg(test)]
impl SelectionMachine {
    fn history(&self) -> &[SelectionTransition] {
        &self.transition_history
    }
}

impl std::fmt::Display for SelectionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SelectionState::{:?} {}", self.context.state, self.context.rect)
    }
}
