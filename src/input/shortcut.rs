use crate::state::Key;
use thiserror::Error;

pub const DEFAULT_STOP_HOTKEY: &str = "<Ctrl><Alt>s";

const XK_RETURN: u32 = 0xff0d;
const XK_KP_ENTER: u32 = 0xff8d;
const XK_ESCAPE: u32 = 0xff1b;
const XK_F1: u32 = 0xffbe;

const MASK_SHIFT: u16 = 1 << 0;
const MASK_LOCK: u16 = 1 << 1;
const MASK_CONTROL: u16 = 1 << 2;
const MASK_MOD1: u16 = 1 << 3;
const MASK_MOD2: u16 = 1 << 4;
const MASK_MOD4: u16 = 1 << 6;

/// Caps Lock and Num Lock combinations a global grab has to cover so the hotkey still
/// fires while either lock is active.
pub const IGNORED_LOCK_MASKS: [u16; 4] = [0, MASK_LOCK, MASK_MOD2, MASK_LOCK | MASK_MOD2];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HotkeyError {
    #[error("hotkey is empty")]
    Empty,
    #[error("unterminated modifier in hotkey: {0}")]
    Unterminated(String),
    #[error("unknown modifier <{0}>")]
    UnknownModifier(String),
    #[error("unknown key name: {0}")]
    UnknownKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HotkeyModifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub super_key: bool,
}

impl HotkeyModifiers {
    /// Core X11 modifier mask for these modifiers.
    pub const fn x_mask(self) -> u16 {
        let mut mask = 0;
        if self.shift {
            mask |= MASK_SHIFT;
        }
        if self.ctrl {
            mask |= MASK_CONTROL;
        }
        if self.alt {
            mask |= MASK_MOD1;
        }
        if self.super_key {
            mask |= MASK_MOD4;
        }
        mask
    }
}

/// Global key combination in accelerator syntax, e.g. `<Ctrl><Alt>s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub modifiers: HotkeyModifiers,
    pub keysym: u32,
}

impl Hotkey {
    pub fn parse(accelerator: &str) -> Result<Self, HotkeyError> {
        let mut rest = accelerator.trim();
        if rest.is_empty() {
            return Err(HotkeyError::Empty);
        }

        let mut modifiers = HotkeyModifiers::default();
        while let Some(tail) = rest.strip_prefix('<') {
            let Some((name, remainder)) = tail.split_once('>') else {
                return Err(HotkeyError::Unterminated(accelerator.to_string()));
            };
            match name.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "primary" => modifiers.ctrl = true,
                "alt" | "mod1" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                "super" | "mod4" => modifiers.super_key = true,
                _ => return Err(HotkeyError::UnknownModifier(name.to_string())),
            }
            rest = remainder;
        }

        let keysym = keysym_for_name(rest.trim())?;
        Ok(Self { modifiers, keysym })
    }
}

impl std::str::FromStr for Hotkey {
    type Err = HotkeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

fn keysym_for_name(name: &str) -> Result<u32, HotkeyError> {
    let mut chars = name.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if ch.is_ascii_graphic() {
            return Ok(u32::from(ch.to_ascii_lowercase()));
        }
    }
    match name.to_ascii_lowercase().as_str() {
        "" => Err(HotkeyError::Empty),
        "return" | "enter" => Ok(XK_RETURN),
        "escape" | "esc" => Ok(XK_ESCAPE),
        "space" => Ok(u32::from(b' ')),
        lower => lower
            .strip_prefix('f')
            .and_then(|number| number.parse::<u32>().ok())
            .filter(|number| (1..=12).contains(number))
            .map(|number| XK_F1 + number - 1)
            .ok_or_else(|| HotkeyError::UnknownKey(name.to_string())),
    }
}

/// Selection-relevant meaning of a keysym.
pub fn key_for_keysym(keysym: u32) -> Key {
    match keysym {
        XK_RETURN | XK_KP_ENTER => Key::Enter,
        XK_ESCAPE => Key::Escape,
        _ => Key::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_stop_hotkey() {
        let hotkey = Hotkey::parse(DEFAULT_STOP_HOTKEY).expect("default hotkey should parse");
        assert_eq!(
            hotkey,
            Hotkey {
                modifiers: HotkeyModifiers {
                    ctrl: true,
                    alt: true,
                    shift: false,
                    super_key: false,
                },
                keysym: u32::from(b's'),
            }
        );
        assert_eq!(hotkey.modifiers.x_mask(), MASK_CONTROL | MASK_MOD1);
    }

    #[test]
    fn parse_accepts_named_keys_and_aliases() {
        let hotkey = Hotkey::parse("<Super><Shift>F9").expect("function key");
        assert_eq!(hotkey.keysym, XK_F1 + 8);
        assert!(hotkey.modifiers.super_key && hotkey.modifiers.shift);

        let hotkey: Hotkey = "<control>Escape".parse().expect("escape");
        assert_eq!(hotkey.keysym, XK_ESCAPE);
        assert!(hotkey.modifiers.ctrl);

        assert_eq!(Hotkey::parse("R").expect("letter").keysym, u32::from(b'r'));
    }

    #[test]
    fn parse_rejects_malformed_accelerators() {
        assert_eq!(Hotkey::parse("  "), Err(HotkeyError::Empty));
        assert_eq!(Hotkey::parse("<Ctrl>"), Err(HotkeyError::Empty));
        assert!(matches!(
            Hotkey::parse("<Ctrl"),
            Err(HotkeyError::Unterminated(_))
        ));
        assert_eq!(
            Hotkey::parse("<Hyper>s"),
            Err(HotkeyError::UnknownModifier("Hyper".to_string()))
        );
        assert_eq!(
            Hotkey::parse("<Alt>F13"),
            Err(HotkeyError::UnknownKey("F13".to_string()))
        );
    }

    #[test]
    fn keysyms_map_to_selection_keys() {
        assert_eq!(key_for_keysym(XK_RETURN), Key::Enter);
        assert_eq!(key_for_keysym(XK_KP_ENTER), Key::Enter);
        assert_eq!(key_for_keysym(XK_ESCAPE), Key::Escape);
        assert_eq!(key_for_keysym(u32::from(b'q')), Key::Other);
    }

    #[test]
    fn lock_masks_cover_caps_and_num_lock() {
        assert!(IGNORED_LOCK_MASKS.contains(&(MASK_LOCK | MASK_MOD2)));
        assert_eq!(IGNORED_LOCK_MASKS[0], 0);
    }
}
