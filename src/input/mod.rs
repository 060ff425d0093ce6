mod shortcut;

pub use shortcut::{
    key_for_keysym, Hotkey, HotkeyError, HotkeyModifiers, DEFAULT_STOP_HOTKEY,
    IGNORED_LOCK_MASKS,
};
