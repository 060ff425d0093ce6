//! X11 implementation of the capture collaborators: interactive grab and overlay, window
//! lookup, monitor layout, root-window pixel reads and the global stop hotkey.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use x11rb::connection::{Connection, RequestConnection};
use x11rb::cookie::{Cookie, VoidCookie};
use x11rb::errors::ConnectionError;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, Cursor, EventMask, Font,
    GrabMode, GrabStatus, ImageFormat, ImageOrder, ModMask, PropMode, StackMode, Window,
    WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::x11_utils::TryParse;
use x11rb::{COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT, CURRENT_TIME, NONE};

use super::{
    CaptureError, ChannelOrder, MonitorSource, PixelBuffer, PixelSource, StopTrigger, WindowId,
    WindowLookup,
};
use crate::app::SelectionSurface;
use crate::geometry::{Point, Rect};
use crate::input::{key_for_keysym, Hotkey, IGNORED_LOCK_MASKS};
use crate::state::{CursorShape, SelectionEvent};

const OVERLAY_COLOR: u32 = 0x0033_66cc;
const OPACITY_ATOM: &[u8] = b"_NET_WM_WINDOW_OPACITY";
const CURSOR_FONT: &[u8] = b"cursor";
const GRAB_ATTEMPTS: u32 = 40;
const GRAB_RETRY_INTERVAL: Duration = Duration::from_millis(25);

fn protocol_error<E: Display>(request: &'static str) -> impl Fn(E) -> CaptureError {
    move |err| CaptureError::Protocol {
        request,
        message: err.to_string(),
    }
}

fn reply<C, R>(
    request: &'static str,
    cookie: Result<Cookie<'_, C, R>, ConnectionError>,
) -> Result<R, CaptureError>
where
    C: RequestConnection + ?Sized,
    R: TryParse,
{
    cookie
        .map_err(protocol_error(request))?
        .reply()
        .map_err(protocol_error(request))
}

/// Repeats a grab while another client still holds the device, e.g. a window manager
/// whose key binding launched us and has not seen the key release yet.
fn retry_grab<A, S>(mut attempt: A, mut sleep: S) -> Result<GrabStatus, CaptureError>
where
    A: FnMut() -> Result<GrabStatus, CaptureError>,
    S: FnMut(Duration),
{
    for _ in 1..GRAB_ATTEMPTS {
        let status = attempt()?;
        if status != GrabStatus::ALREADY_GRABBED && status != GrabStatus::FROZEN {
            return Ok(status);
        }
        sleep(GRAB_RETRY_INTERVAL);
    }
    attempt()
}

fn checked<C>(
    request: &'static str,
    cookie: Result<VoidCookie<'_, C>, ConnectionError>,
) -> Result<(), CaptureError>
where
    C: RequestConnection + ?Sized,
{
    cookie
        .map_err(protocol_error(request))?
        .check()
        .map_err(protocol_error(request))
}

fn pointer_events() -> EventMask {
    EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION
}

/// Glyph in the standard X cursor font.
fn cursor_glyph(shape: CursorShape) -> u16 {
    match shape {
        CursorShape::Crosshair => 34,
        CursorShape::Move => 52,
        CursorShape::TopLeftCorner => 134,
        CursorShape::TopRightCorner => 136,
        CursorShape::BottomLeftCorner => 12,
        CursorShape::BottomRightCorner => 14,
    }
}

fn channel_order(depth: u8) -> Result<ChannelOrder, CaptureError> {
    match depth {
        24 => Ok(ChannelOrder::Bgrx),
        32 => Ok(ChannelOrder::Bgra),
        depth => Err(CaptureError::UnsupportedPixmap {
            message: format!("depth {depth}"),
        }),
    }
}

/// Bytes per image row given the pixmap format's padding.
fn row_stride(width: u32, bits_per_pixel: u8, scanline_pad: u8) -> usize {
    let pad = usize::from(scanline_pad.max(8));
    let bits = width as usize * usize::from(bits_per_pixel);
    bits.div_ceil(pad) * pad / 8
}

/// Keyboard mapping snapshot taken at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyMap {
    min_keycode: u8,
    per_keycode: usize,
    keysyms: Vec<u32>,
}

impl KeyMap {
    fn keysym(&self, keycode: u8) -> u32 {
        if keycode < self.min_keycode || self.per_keycode == 0 {
            return 0;
        }
        let index = usize::from(keycode - self.min_keycode) * self.per_keycode;
        self.keysyms.get(index).copied().unwrap_or(0)
    }

    fn keycode(&self, keysym: u32) -> Option<u8> {
        if self.per_keycode == 0 {
            return None;
        }
        self.keysyms
            .chunks(self.per_keycode)
            .position(|syms| syms.contains(&keysym))
            .and_then(|index| {
                u8::try_from(index + usize::from(self.min_keycode)).ok()
            })
    }
}

pub struct X11Backend {
    conn: RustConnection,
    root: Window,
    screen: Rect,
    keymap: KeyMap,
    overlay: Option<Window>,
    overlay_opacity: f64,
    cursor_font: Option<Font>,
    cursors: Vec<(CursorShape, Cursor)>,
    grabbed: bool,
    stop_hotkey: Option<Hotkey>,
}

impl X11Backend {
    /// Connects to `display`, or to `$DISPLAY` when `None`.
    pub fn connect(display: Option<&str>) -> Result<Self, CaptureError> {
        let (conn, screen_num) =
            x11rb::connect(display).map_err(|err| CaptureError::Connection {
                message: err.to_string(),
            })?;
        let setup = conn.setup();
        let screen = setup
            .roots
            .get(screen_num)
            .ok_or_else(|| CaptureError::Connection {
                message: format!("screen {screen_num} does not exist"),
            })?;
        let root = screen.root;
        let bounds = Rect::new(
            0,
            0,
            u32::from(screen.width_in_pixels),
            u32::from(screen.height_in_pixels),
        );
        let (min_keycode, max_keycode) = (setup.min_keycode, setup.max_keycode);

        let mapping = reply(
            "GetKeyboardMapping",
            conn.get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1),
        )?;
        let keymap = KeyMap {
            min_keycode,
            per_keycode: usize::from(mapping.keysyms_per_keycode),
            keysyms: mapping.keysyms,
        };
        tracing::debug!(root, screen = %bounds, "connected to X server");

        Ok(Self {
            conn,
            root,
            screen: bounds,
            keymap,
            overlay: None,
            overlay_opacity: 0.4,
            cursor_font: None,
            cursors: Vec::new(),
            grabbed: false,
            stop_hotkey: None,
        })
    }

    pub fn with_overlay_opacity(mut self, opacity: f64) -> Self {
        self.overlay_opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_stop_hotkey(mut self, hotkey: Hotkey) -> Self {
        self.stop_hotkey = Some(hotkey);
        self
    }

    fn flush(&self) -> Result<(), CaptureError> {
        self.conn.flush().map_err(protocol_error("Flush"))
    }

    fn cursor(&mut self, shape: CursorShape) -> Result<Cursor, CaptureError> {
        if let Some((_, cursor)) = self.cursors.iter().find(|(cached, _)| *cached == shape) {
            return Ok(*cursor);
        }
        let font = match self.cursor_font {
            Some(font) => font,
            None => {
                let font = self
                    .conn
                    .generate_id()
                    .map_err(protocol_error("OpenFont"))?;
                checked("OpenFont", self.conn.open_font(font, CURSOR_FONT))?;
                self.cursor_font = Some(font);
                font
            }
        };
        let cursor = self
            .conn
            .generate_id()
            .map_err(protocol_error("CreateGlyphCursor"))?;
        let glyph = cursor_glyph(shape);
        self.conn
            .create_glyph_cursor(
                cursor,
                font,
                font,
                glyph,
                glyph + 1,
                0,
                0,
                0,
                u16::MAX,
                u16::MAX,
                u16::MAX,
            )
            .map_err(protocol_error("CreateGlyphCursor"))?;
        self.cursors.push((shape, cursor));
        Ok(cursor)
    }

    fn overlay_window(&mut self) -> Result<Window, CaptureError> {
        if let Some(window) = self.overlay {
            return Ok(window);
        }
        let window = self
            .conn
            .generate_id()
            .map_err(protocol_error("CreateWindow"))?;
        let aux = CreateWindowAux::new()
            .background_pixel(OVERLAY_COLOR)
            .override_redirect(1);
        checked(
            "CreateWindow",
            self.conn.create_window(
                COPY_DEPTH_FROM_PARENT,
                window,
                self.root,
                0,
                0,
                1,
                1,
                0,
                WindowClass::INPUT_OUTPUT,
                COPY_FROM_PARENT,
                &aux,
            ),
        )?;
        self.overlay = Some(window);

        let atom = reply("InternAtom", self.conn.intern_atom(false, OPACITY_ATOM))?.atom;
        let opacity = (self.overlay_opacity * f64::from(u32::MAX)) as u32;
        self.conn
            .change_property32(
                PropMode::REPLACE,
                window,
                atom,
                AtomEnum::CARDINAL,
                &[opacity],
            )
            .map_err(protocol_error("ChangeProperty"))?;
        Ok(window)
    }

    fn hotkey_keycode(&self, hotkey: Hotkey) -> Result<u8, CaptureError> {
        self.keymap
            .keycode(hotkey.keysym)
            .ok_or_else(|| CaptureError::Protocol {
                request: "GrabKey",
                message: format!("no keycode produces keysym {:#x}", hotkey.keysym),
            })
    }

    fn ungrab_hotkey(&self, keycode: u8, modifiers: u16) {
        for lock in IGNORED_LOCK_MASKS {
            let _ = self
                .conn
                .ungrab_key(keycode, self.root, ModMask::from(modifiers | lock));
        }
        let _ = self.conn.flush();
    }
}

impl SelectionSurface for X11Backend {
    fn grab(&mut self, cursor: CursorShape) -> Result<(), CaptureError> {
        let cursor = self.cursor(cursor)?;
        let pointer = retry_grab(
            || {
                reply(
                    "GrabPointer",
                    self.conn.grab_pointer(
                        false,
                        self.root,
                        pointer_events(),
                        GrabMode::ASYNC,
                        GrabMode::ASYNC,
                        NONE,
                        cursor,
                        CURRENT_TIME,
                    ),
                )
                .map(|grab| grab.status)
            },
            thread::sleep,
        )?;
        if pointer != GrabStatus::SUCCESS {
            return Err(CaptureError::Protocol {
                request: "GrabPointer",
                message: format!("{pointer:?}"),
            });
        }

        let keyboard = retry_grab(
            || {
                reply(
                    "GrabKeyboard",
                    self.conn.grab_keyboard(
                        false,
                        self.root,
                        CURRENT_TIME,
                        GrabMode::ASYNC,
                        GrabMode::ASYNC,
                    ),
                )
                .map(|grab| grab.status)
            },
            thread::sleep,
        );
        let keyboard = match keyboard {
            Ok(keyboard) => keyboard,
            Err(err) => {
                let _ = self.conn.ungrab_pointer(CURRENT_TIME);
                let _ = self.conn.flush();
                return Err(err);
            }
        };
        if keyboard != GrabStatus::SUCCESS {
            let _ = self.conn.ungrab_pointer(CURRENT_TIME);
            let _ = self.conn.flush();
            return Err(CaptureError::Protocol {
                request: "GrabKeyboard",
                message: format!("{keyboard:?}"),
            });
        }
        self.grabbed = true;
        tracing::debug!("pointer and keyboard grabbed");
        Ok(())
    }

    fn next_event(&mut self) -> Result<SelectionEvent, CaptureError> {
        loop {
            let event = self
                .conn
                .wait_for_event()
                .map_err(protocol_error("WaitForEvent"))?;
            let translated = match event {
                Event::ButtonPress(press) => SelectionEvent::PointerDown {
                    point: Point::new(press.root_x.into(), press.root_y.into()),
                    button: press.detail.into(),
                },
                Event::MotionNotify(motion) => SelectionEvent::PointerMove(Point::new(
                    motion.root_x.into(),
                    motion.root_y.into(),
                )),
                Event::ButtonRelease(release) => SelectionEvent::PointerUp(Point::new(
                    release.root_x.into(),
                    release.root_y.into(),
                )),
                Event::KeyRelease(key) => {
                    SelectionEvent::KeyRelease(key_for_keysym(self.keymap.keysym(key.detail)))
                }
                _ => continue,
            };
            return Ok(translated);
        }
    }

    fn show_overlay(&mut self, rect: Rect) -> Result<(), CaptureError> {
        if rect.is_empty() {
            return self.hide_overlay();
        }
        let window = self.overlay_window()?;
        let aux = ConfigureWindowAux::new()
            .x(rect.x)
            .y(rect.y)
            .width(rect.width)
            .height(rect.height)
            .stack_mode(StackMode::ABOVE);
        self.conn
            .configure_window(window, &aux)
            .map_err(protocol_error("ConfigureWindow"))?;
        self.conn
            .map_window(window)
            .map_err(protocol_error("MapWindow"))?;
        self.flush()
    }

    fn hide_overlay(&mut self) -> Result<(), CaptureError> {
        let Some(window) = self.overlay else {
            return Ok(());
        };
        self.conn
            .unmap_window(window)
            .map_err(protocol_error("UnmapWindow"))?;
        // Round trip so the unmap is processed before any pixels are read.
        reply("GetInputFocus", self.conn.get_input_focus())?;
        Ok(())
    }

    fn set_cursor(&mut self, cursor: CursorShape) -> Result<(), CaptureError> {
        if !self.grabbed {
            return Ok(());
        }
        let cursor = self.cursor(cursor)?;
        self.conn
            .change_active_pointer_grab(cursor, CURRENT_TIME, pointer_events())
            .map_err(protocol_error("ChangeActivePointerGrab"))?;
        self.flush()
    }

    fn release_grab(&mut self) -> Result<(), CaptureError> {
        if !self.grabbed {
            return Ok(());
        }
        self.grabbed = false;
        self.conn
            .ungrab_pointer(CURRENT_TIME)
            .map_err(protocol_error("UngrabPointer"))?;
        self.conn
            .ungrab_keyboard(CURRENT_TIME)
            .map_err(protocol_error("UngrabKeyboard"))?;
        tracing::debug!("pointer and keyboard released");
        self.flush()
    }
}

impl WindowLookup for X11Backend {
    fn window_at(&self, point: Point) -> Result<Option<WindowId>, CaptureError> {
        let x = i16::try_from(point.x).map_err(protocol_error("TranslateCoordinates"))?;
        let y = i16::try_from(point.y).map_err(protocol_error("TranslateCoordinates"))?;
        let translated = reply(
            "TranslateCoordinates",
            self.conn.translate_coordinates(self.root, self.root, x, y),
        )?;
        if translated.child == NONE {
            return Ok(Some(self.root));
        }
        Ok(Some(translated.child))
    }

    fn window_geometry(&self, window: WindowId) -> Result<Rect, CaptureError> {
        let geometry = reply("GetGeometry", self.conn.get_geometry(window))?;
        if window == self.root {
            return Ok(Rect::new(
                0,
                0,
                u32::from(geometry.width),
                u32::from(geometry.height),
            ));
        }
        let origin = reply(
            "TranslateCoordinates",
            self.conn.translate_coordinates(window, self.root, 0, 0),
        )?;
        let border = geometry.border_width;
        Ok(Rect::new(
            i32::from(origin.dst_x) - i32::from(border),
            i32::from(origin.dst_y) - i32::from(border),
            u32::from(geometry.width) + 2 * u32::from(border),
            u32::from(geometry.height) + 2 * u32::from(border),
        ))
    }
}

impl MonitorSource for X11Backend {
    fn screen_bounds(&self) -> Rect {
        self.screen
    }

    fn monitors(&self) -> Result<Vec<Rect>, CaptureError> {
        let reply = reply("RRGetMonitors", self.conn.randr_get_monitors(self.root, true))?;
        let monitors: Vec<Rect> = reply
            .monitors
            .iter()
            .map(|monitor| {
                Rect::new(
                    monitor.x.into(),
                    monitor.y.into(),
                    monitor.width.into(),
                    monitor.height.into(),
                )
            })
            .collect();
        if monitors.is_empty() {
            return Ok(vec![self.screen]);
        }
        Ok(monitors)
    }
}

impl PixelSource for X11Backend {
    fn grab_pixels(&self, region: Rect) -> Result<PixelBuffer, CaptureError> {
        let out_of_range = || CaptureError::MalformedImage {
            width: region.width,
            height: region.height,
        };
        let x = i16::try_from(region.x).map_err(|_| out_of_range())?;
        let y = i16::try_from(region.y).map_err(|_| out_of_range())?;
        let width = u16::try_from(region.width).map_err(|_| out_of_range())?;
        let height = u16::try_from(region.height).map_err(|_| out_of_range())?;

        let setup = self.conn.setup();
        if setup.image_byte_order != ImageOrder::LSB_FIRST {
            return Err(CaptureError::UnsupportedPixmap {
                message: "most significant byte first".to_string(),
            });
        }
        let image = reply(
            "GetImage",
            self.conn.get_image(
                ImageFormat::Z_PIXMAP,
                self.root,
                x,
                y,
                width,
                height,
                u32::MAX,
            ),
        )?;
        let layout = channel_order(image.depth)?;
        let format = setup
            .pixmap_formats
            .iter()
            .find(|format| format.depth == image.depth)
            .ok_or_else(|| CaptureError::UnsupportedPixmap {
                message: format!("no pixmap format for depth {}", image.depth),
            })?;
        if format.bits_per_pixel != 32 {
            return Err(CaptureError::UnsupportedPixmap {
                message: format!("{} bits per pixel", format.bits_per_pixel),
            });
        }
        tracing::debug!(
            region = %region,
            depth = image.depth,
            bytes = image.data.len(),
            "pixels read"
        );

        Ok(PixelBuffer {
            width: region.width,
            height: region.height,
            stride: row_stride(region.width, format.bits_per_pixel, format.scanline_pad),
            layout,
            data: image.data,
        })
    }
}

impl StopTrigger for X11Backend {
    fn wait_for_stop(&self) -> Result<(), CaptureError> {
        let hotkey = self.stop_hotkey.ok_or(CaptureError::Protocol {
            request: "GrabKey",
            message: "no stop hotkey configured".to_string(),
        })?;
        let keycode = self.hotkey_keycode(hotkey)?;
        let modifiers = hotkey.modifiers.x_mask();
        let lock_bits = IGNORED_LOCK_MASKS
            .iter()
            .fold(0u16, |bits, mask| bits | mask);

        for lock in IGNORED_LOCK_MASKS {
            let grabbed = checked(
                "GrabKey",
                self.conn.grab_key(
                    false,
                    self.root,
                    ModMask::from(modifiers | lock),
                    keycode,
                    GrabMode::ASYNC,
                    GrabMode::ASYNC,
                ),
            );
            if let Err(err) = grabbed {
                self.ungrab_hotkey(keycode, modifiers);
                return Err(err);
            }
        }
        tracing::info!(keycode, modifiers, "waiting for the stop hotkey");

        let result = loop {
            match self.conn.wait_for_event() {
                Ok(Event::KeyPress(press))
                    if press.detail == keycode
                        && u16::from(press.state) & !lock_bits == modifiers =>
                {
                    break Ok(());
                }
                Ok(_) => {}
                Err(err) => break Err(protocol_error("WaitForEvent")(err)),
            }
        };
        self.ungrab_hotkey(keycode, modifiers);
        result
    }
}

impl Drop for X11Backend {
    fn drop(&mut self) {
        if self.grabbed {
            let _ = self.conn.ungrab_pointer(CURRENT_TIME);
            let _ = self.conn.ungrab_keyboard(CURRENT_TIME);
        }
        if let Some(window) = self.overlay.take() {
            let _ = self.conn.destroy_window(window);
        }
        for (_, cursor) in self.cursors.drain(..) {
            let _ = self.conn.free_cursor(cursor);
        }
        if let Some(font) = self.cursor_font.take() {
            let _ = self.conn.close_font(font);
        }
        let _ = self.conn.flush();
    }
}
