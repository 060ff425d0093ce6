use crate::capture::CaptureError;
use crate::error::{AppError, AppResult};
use crate::geometry::{Point, Rect};
use crate::state::{CursorShape, Effect, SelectionContext, SelectionEvent, SelectionMachine};

/// Input and feedback surface the selection loop drives.
///
/// `release_grab` must be idempotent: the loop calls it once more on every exit path.
pub trait SelectionSurface {
    fn grab(&mut self, cursor: CursorShape) -> Result<(), CaptureError>;
    fn next_event(&mut self) -> Result<SelectionEvent, CaptureError>;
    fn show_overlay(&mut self, rect: Rect) -> Result<(), CaptureError>;
    fn hide_overlay(&mut self) -> Result<(), CaptureError>;
    fn set_cursor(&mut self, cursor: CursorShape) -> Result<(), CaptureError>;
    fn release_grab(&mut self) -> Result<(), CaptureError>;
}

/// Finished interaction: the chosen rectangle and where the pointer was when it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub rect: Rect,
    pub pointer: Point,
}

/// Grabs input, feeds events through the selection machine until it captures or
/// cancels, and leaves the pointer and keyboard released on every path.
pub fn run_selection<S: SelectionSurface>(
    surface: &mut S,
    context: SelectionContext,
) -> AppResult<Selection> {
    surface
        .grab(context.cursor)
        .map_err(|source| AppError::GrabFailed { source })?;

    let mut machine = SelectionMachine::new(context);
    let result = drive(surface, &mut machine);

    if let Err(err) = surface.release_grab() {
        tracing::warn!(?err, "failed to release input grab");
    }
    if result.is_err() {
        if let Err(err) = surface.hide_overlay() {
            tracing::warn!(?err, "failed to hide selection overlay");
        }
    }
    tracing::debug!(machine = %machine, "selection loop finished");
    result
}

fn drive<S: SelectionSurface>(
    surface: &mut S,
    machine: &mut SelectionMachine,
) -> AppResult<Selection> {
    loop {
        let event = surface
            .next_event()
            .map_err(|source| AppError::DisplayUnavailable { source })?;
        for effect in machine.dispatch(event) {
            match effect {
                Effect::ShowOverlay(rect) => {
                    if let Err(err) = surface.show_overlay(rect) {
                        tracing::warn!(?err, %rect, "failed to update selection overlay");
                    }
                }
                Effect::HideOverlay => {
                    if let Err(err) = surface.hide_overlay() {
                        tracing::warn!(?err, "failed to hide selection overlay");
                    }
                }
                Effect::SetCursor(cursor) => {
                    if let Err(err) = surface.set_cursor(cursor) {
                        tracing::warn!(?err, ?cursor, "failed to change cursor");
                    }
                }
                Effect::ReleaseGrab => {
                    if let Err(err) = surface.release_grab() {
                        tracing::warn!(?err, "failed to release input grab");
                    }
                }
                Effect::Capture(rect) => {
                    return Ok(Selection {
                        rect,
                        pointer: machine.context().pointer,
                    });
                }
                Effect::Cancel => return Err(AppError::UserCancelled),
            }
        }
    }
}
