use std::io::Write;
use std::time::Duration;

use crate::capture::{
    execute, resolve_target, CaptureBackend, CaptureOutcome, CaptureOutput, CaptureRequest,
    CaptureTarget, StopTrigger, WindowId,
};
use crate::cli::Options;
use crate::clipboard::ClipboardBackend;
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::recording::Recorder;
use crate::state::{SelectionContext, SelectionMode};

mod countdown;
mod selection;

pub use countdown::run_countdown;
pub use selection::{run_selection, Selection, SelectionSurface};

/// How the capture region is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    Interactive,
    Window(WindowId),
    FullScreen,
}

/// Everything one session needs, merged from the command line and the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub source: TargetSource,
    pub output: CaptureOutput,
    pub exec: Option<String>,
    pub display: Option<String>,
    pub delay_seconds: u32,
    pub countdown: bool,
    pub selection_delay: Duration,
    pub mode: SelectionMode,
    pub min_size: u32,
    pub handle_threshold: u32,
}

impl SessionPlan {
    pub fn new(options: &Options, config: &AppConfig, display: Option<String>) -> Self {
        let source = match options.xid {
            Some(xid) => TargetSource::Window(xid),
            None if options.select || options.adjust => TargetSource::Interactive,
            None => TargetSource::FullScreen,
        };
        let output = if options.record {
            CaptureOutput::VideoStream(
                options
                    .filename
                    .clone()
                    .unwrap_or_else(|| config.video_template.clone()),
            )
        } else if options.clipboard {
            CaptureOutput::Clipboard
        } else {
            CaptureOutput::StillImage(
                options
                    .filename
                    .clone()
                    .unwrap_or_else(|| config.image_template.clone()),
            )
        };
        let mode = if options.adjust || config.adjustable {
            SelectionMode::Adjustable
        } else {
            SelectionMode::Simple
        };

        Self {
            source,
            output,
            exec: options.exec.clone(),
            display,
            delay_seconds: options.delay.unwrap_or(0),
            countdown: options.countdown,
            selection_delay: Duration::from_millis(
                options
                    .selection_delay_ms
                    .unwrap_or(config.selection_delay_ms),
            ),
            mode,
            min_size: config.min_selection_size,
            handle_threshold: config.handle_threshold,
        }
    }
}

/// Runs one capture session: delay, region choice, capture and output delivery.
pub fn run_session<B, C, O, F>(
    backend: &mut B,
    clipboard: &mut C,
    recorder: Option<&mut dyn Recorder>,
    plan: &SessionPlan,
    out: &mut O,
    mut sleep: F,
) -> AppResult<CaptureOutcome>
where
    B: SelectionSurface + CaptureBackend + StopTrigger,
    C: ClipboardBackend,
    O: Write,
    F: FnMut(Duration),
{
    if let Err(err) = run_countdown(plan.delay_seconds, plan.countdown, out, &mut sleep) {
        tracing::warn!(?err, "failed to write countdown");
    }

    let target = match plan.source {
        TargetSource::Interactive => {
            let context = SelectionContext::new(backend.screen_bounds(), plan.mode)
                .with_min_size(plan.min_size)
                .with_handle_threshold(plan.handle_threshold);
            let selection = run_selection(backend, context)?;
            let target = resolve_target(selection.rect, selection.pointer);
            if !matches!(target, CaptureTarget::WindowUnderPoint(_))
                && !plan.selection_delay.is_zero()
            {
                tracing::debug!(
                    delay = ?plan.selection_delay,
                    "waiting for the overlay to disappear"
                );
                sleep(plan.selection_delay);
            }
            target
        }
        TargetSource::Window(window) => CaptureTarget::Window(window),
        TargetSource::FullScreen => CaptureTarget::FullScreen,
    };

    let request = CaptureRequest {
        target,
        output: plan.output.clone(),
        exec: plan.exec.clone(),
        display: plan.display.clone(),
    };
    let backend = &*backend;
    execute(backend, clipboard, recorder, backend, &request)
}

#[cfg(test)]
mod tests {
    use super::selection::tests::{press, ScriptedSurface};
    use super::*;
    use crate::capture::{
        CaptureError, ChannelOrder, Destination, MonitorSource, PixelBuffer, PixelSource,
        WindowLookup,
    };
    use crate::clipboard::ClipboardResult;
    use crate::error::AppError;
    use crate::geometry::{Point, Rect};
    use crate::state::{CursorShape, Key, SelectionEvent};
    use image::RgbaImage;
    use std::cell::RefCell;

    const SCREEN: Rect = Rect::new(0, 0, 640, 480);

    struct SessionBackend {
        surface: ScriptedSurface,
        window: Option<(WindowId, Rect)>,
        grabs: RefCell<Vec<Rect>>,
    }

    impl SessionBackend {
        fn new(events: impl IntoIterator<Item = SelectionEvent>) -> Self {
            Self {
                surface: ScriptedSurface::new(events),
                window: None,
                grabs: RefCell::new(Vec::new()),
            }
        }
    }

    impl SelectionSurface for SessionBackend {
        fn grab(&mut self, cursor: CursorShape) -> Result<(), CaptureError> {
            self.surface.grab(cursor)
        }

        fn next_event(&mut self) -> Result<SelectionEvent, CaptureError> {
            self.surface.next_event()
        }

        fn show_overlay(&mut self, rect: Rect) -> Result<(), CaptureError> {
            self.surface.show_overlay(rect)
        }

        fn hide_overlay(&mut self) -> Result<(), CaptureError> {
            self.surface.hide_overlay()
        }

        fn set_cursor(&mut self, cursor: CursorShape) -> Result<(), CaptureError> {
            self.surface.set_cursor(cursor)
        }

        fn release_grab(&mut self) -> Result<(), CaptureError> {
            self.surface.release_grab()
        }
    }

    impl WindowLookup for SessionBackend {
        fn window_at(&self, _point: Point) -> Result<Option<WindowId>, CaptureError> {
            Ok(self.window.map(|(id, _)| id))
        }

        fn window_geometry(&self, _window: WindowId) -> Result<Rect, CaptureError> {
            self.window
                .map(|(_, rect)| rect)
                .ok_or(CaptureError::Protocol {
                    request: "GetGeometry",
                    message: "BadWindow".to_string(),
                })
        }
    }

    impl MonitorSource for SessionBackend {
        fn screen_bounds(&self) -> Rect {
            SCREEN
        }

        fn monitors(&self) -> Result<Vec<Rect>, CaptureError> {
            Ok(vec![SCREEN])
        }
    }

    impl PixelSource for SessionBackend {
        fn grab_pixels(&self, region: Rect) -> Result<PixelBuffer, CaptureError> {
            self.grabs.borrow_mut().push(region);
            Ok(PixelBuffer {
                width: region.width,
                height: region.height,
                stride: region.width as usize * 4,
                layout: ChannelOrder::Bgra,
                data: vec![0x40; region.width as usize * region.height as usize * 4],
            })
        }
    }

    impl StopTrigger for SessionBackend {
        fn wait_for_stop(&self) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullClipboard;

    impl ClipboardBackend for NullClipboard {
        fn publish_image(&mut self, _image: &RgbaImage) -> ClipboardResult<()> {
            Ok(())
        }

        fn hold_image(&mut self, _image: &RgbaImage) -> ClipboardResult<()> {
            Ok(())
        }
    }

    fn plan(source: TargetSource, dir: &tempfile::TempDir) -> SessionPlan {
        SessionPlan {
            source,
            output: CaptureOutput::StillImage(dir.path().join("$wx$h.png").display().to_string()),
            exec: None,
            display: Some(":0".to_string()),
            delay_seconds: 0,
            countdown: false,
            selection_delay: Duration::from_millis(250),
            mode: SelectionMode::Simple,
            min_size: 10,
            handle_threshold: 10,
        }
    }

    #[test]
    fn plan_prefers_xid_over_selection_and_merges_config() {
        let options = Options {
            select: true,
            xid: Some(0x2a),
            selection_delay_ms: Some(0),
            ..Options::default()
        };
        let config = AppConfig {
            adjustable: true,
            ..AppConfig::default()
        };

        let plan = SessionPlan::new(&options, &config, None);

        assert_eq!(plan.source, TargetSource::Window(0x2a));
        assert_eq!(plan.mode, SelectionMode::Adjustable);
        assert_eq!(plan.selection_delay, Duration::ZERO);
        assert_eq!(plan.output, CaptureOutput::StillImage(config.image_template.clone()));
    }

    #[test]
    fn plan_picks_output_from_flags() {
        let config = AppConfig::default();
        let record = Options {
            record: true,
            filename: Some("clip.webm".to_string()),
            ..Options::default()
        };
        assert_eq!(
            SessionPlan::new(&record, &config, None).output,
            CaptureOutput::VideoStream("clip.webm".to_string())
        );

        let clipboard = Options {
            clipboard: true,
            adjust: true,
            ..Options::default()
        };
        let plan = SessionPlan::new(&clipboard, &config, None);
        assert_eq!(plan.output, CaptureOutput::Clipboard);
        assert_eq!(plan.source, TargetSource::Interactive);
        assert_eq!(plan.selection_delay, Duration::from_millis(config.selection_delay_ms));

        let plain = SessionPlan::new(&Options::default(), &config, None);
        assert_eq!(plain.source, TargetSource::FullScreen);
        assert_eq!(plain.mode, SelectionMode::Simple);
    }

    #[test]
    fn region_selection_waits_for_settle_delay_before_capture() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = SessionBackend::new([
            press(10, 10),
            SelectionEvent::PointerUp(Point::new(74, 42)),
        ]);
        let mut slept = Vec::new();

        let outcome = run_session(
            &mut backend,
            &mut NullClipboard,
            None,
            &plan(TargetSource::Interactive, &dir),
            &mut Vec::new(),
            |delay| slept.push(delay),
        )
        .expect("session should capture");

        assert_eq!(slept, vec![Duration::from_millis(250)]);
        assert_eq!(backend.grabs.borrow().as_slice(), &[Rect::new(10, 10, 64, 32)]);
        assert_eq!(
            outcome.destination,
            Destination::Saved(dir.path().join("64x32.png"))
        );
        assert!(!backend.surface.grabbed);
    }

    #[test]
    fn click_selection_captures_window_without_settle_delay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = SessionBackend::new([
            press(100, 100),
            SelectionEvent::PointerUp(Point::new(101, 100)),
        ]);
        backend.window = Some((7, Rect::new(50, 60, 120, 80)));
        let mut slept = Vec::new();

        let outcome = run_session(
            &mut backend,
            &mut NullClipboard,
            None,
            &plan(TargetSource::Interactive, &dir),
            &mut Vec::new(),
            |delay| slept.push(delay),
        )
        .expect("window capture");

        assert!(slept.is_empty());
        assert_eq!(outcome.region, Rect::new(50, 60, 120, 80));
    }

    #[test]
    fn cancelled_selection_never_captures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = SessionBackend::new([SelectionEvent::KeyRelease(Key::Escape)]);

        let err = run_session(
            &mut backend,
            &mut NullClipboard,
            None,
            &plan(TargetSource::Interactive, &dir),
            &mut Vec::new(),
            |_| {},
        )
        .expect_err("escape cancels");

        assert!(matches!(err, AppError::UserCancelled));
        assert!(backend.grabs.borrow().is_empty());
        assert!(!backend.surface.grabbed);
    }

    #[test]
    fn countdown_runs_before_full_screen_capture() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = SessionBackend::new([]);
        let mut session = plan(TargetSource::FullScreen, &dir);
        session.delay_seconds = 2;
        session.countdown = true;
        let mut out = Vec::new();
        let mut ticks = 0;

        let outcome = run_session(
            &mut backend,
            &mut NullClipboard,
            None,
            &session,
            &mut out,
            |_| ticks += 1,
        )
        .expect("full screen capture");

        assert_eq!(String::from_utf8(out).expect("utf8"), "Taking shot in ..2 ..1 ..0.\n");
        assert_eq!(ticks, 2);
        assert_eq!(outcome.region, SCREEN);
        assert!(backend.surface.calls.is_empty());
    }
}
