pub mod event;
pub mod machine;
pub mod model;

pub use event::{Effect, Key, PointerButton, SelectionEvent, SelectionTransition};
pub use machine::{handle_event, SelectionMachine};
pub use model::{CursorShape, SelectionContext, SelectionMode, SelectionState};
