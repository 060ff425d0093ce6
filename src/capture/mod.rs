use std::path::PathBuf;
use std::process::Command;

use image::RgbaImage;
use thiserror::Error;

use crate::clipboard::ClipboardBackend;
use crate::error::{AppError, AppResult};
use crate::geometry::{click_is_window_selection, Point, Rect, WINDOW_SELECTION_THRESHOLD};
use crate::recording::{encodable_region, Recorder, RecordingError, RecordingSpec};
use crate::storage::{expand_command, expand_template, save_image, CLIPBOARD_PLACEHOLDER};

use self::compositor::{
    composite, force_opaque, needs_masking, swap_red_blue, CoverageMask, BACKGROUND,
};

pub mod compositor;
pub mod x11;

pub type WindowId = u32;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("can't connect to the X display: {message}")]
    Connection { message: String },
    #[error("{request} request failed: {message}")]
    Protocol {
        request: &'static str,
        message: String,
    },
    #[error("unsupported pixel format: {message}")]
    UnsupportedPixmap { message: String },
    #[error("captured image is malformed: {width}x{height}")]
    MalformedImage { width: u32, height: u32 },
}

/// Which part of the screen a session captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    Region(Rect),
    WindowUnderPoint(Point),
    Window(WindowId),
    FullScreen,
}

/// Where the captured pixels go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutput {
    StillImage(String),
    VideoStream(String),
    Clipboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Area,
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRegion {
    pub rect: Rect,
    pub kind: RegionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Saved(PathBuf),
    Clipboard,
    Recorded(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub region: Rect,
    pub destination: Destination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub target: CaptureTarget,
    pub output: CaptureOutput,
    pub exec: Option<String>,
    pub display: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
    /// Blue, green, red and an undefined padding byte.
    Bgrx,
}

/// Raw pixels as delivered by the display server, rows `stride` bytes apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub layout: ChannelOrder,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Repacks the rows and normalizes the channel order to opaque-safe RGBA.
    pub fn into_rgba_image(self) -> Result<RgbaImage, CaptureError> {
        let malformed = CaptureError::MalformedImage {
            width: self.width,
            height: self.height,
        };
        let row_bytes = self.width as usize * 4;
        let rows = self.height as usize;
        if row_bytes == 0 || rows == 0 || self.stride < row_bytes {
            return Err(malformed);
        }
        if self.data.len() < self.stride * (rows - 1) + row_bytes {
            return Err(malformed);
        }

        let mut packed = if self.stride == row_bytes {
            let mut data = self.data;
            data.truncate(row_bytes * rows);
            data
        } else {
            self.data
                .chunks(self.stride)
                .take(rows)
                .flat_map(|row| row[..row_bytes].iter().copied())
                .collect()
        };

        match self.layout {
            ChannelOrder::Rgba => {}
            ChannelOrder::Bgra => swap_red_blue(&mut packed),
            ChannelOrder::Bgrx => {
                swap_red_blue(&mut packed);
                force_opaque(&mut packed);
            }
        }
        RgbaImage::from_raw(self.width, self.height, packed).ok_or(malformed)
    }
}

pub trait WindowLookup {
    /// Top-level window under `point`, if any.
    fn window_at(&self, point: Point) -> Result<Option<WindowId>, CaptureError>;
    /// Window geometry in root coordinates.
    fn window_geometry(&self, window: WindowId) -> Result<Rect, CaptureError>;
}

pub trait MonitorSource {
    fn screen_bounds(&self) -> Rect;
    fn monitors(&self) -> Result<Vec<Rect>, CaptureError>;
}

pub trait PixelSource {
    fn grab_pixels(&self, region: Rect) -> Result<PixelBuffer, CaptureError>;
}

/// Blocks until the user asks a running recording to stop.
pub trait StopTrigger {
    fn wait_for_stop(&self) -> Result<(), CaptureError>;
}

pub trait CaptureBackend: WindowLookup + MonitorSource + PixelSource {}

impl<T: WindowLookup + MonitorSource + PixelSource> CaptureBackend for T {}

/// Turns a finished selection into a capture target; a near-zero drag is a window click.
pub fn resolve_target(selection: Rect, pointer: Point) -> CaptureTarget {
    if click_is_window_selection(selection, WINDOW_SELECTION_THRESHOLD) {
        CaptureTarget::WindowUnderPoint(pointer)
    } else {
        CaptureTarget::Region(selection)
    }
}

pub fn resolve_region<B>(backend: &B, target: CaptureTarget) -> AppResult<ResolvedRegion>
where
    B: WindowLookup + MonitorSource,
{
    let screen = backend.screen_bounds();
    let (rect, kind) = match target {
        CaptureTarget::Region(rect) => (rect, RegionKind::Area),
        CaptureTarget::FullScreen => (screen, RegionKind::Area),
        CaptureTarget::WindowUnderPoint(point) => {
            let window = backend
                .window_at(point)
                .map_err(|source| AppError::WindowResolutionFailed {
                    source: Some(source),
                })?
                .ok_or(AppError::WindowResolutionFailed { source: None })?;
            tracing::debug!(
                window = format_args!("{window:#x}"),
                x = point.x,
                y = point.y,
                "window under pointer"
            );
            (window_rect(backend, window)?, RegionKind::Window)
        }
        CaptureTarget::Window(window) => (window_rect(backend, window)?, RegionKind::Window),
    };

    let visible = rect.intersect(screen).ok_or_else(|| AppError::InvalidCapture {
        message: format!("region {rect} is outside the screen {screen}"),
    })?;
    Ok(ResolvedRegion {
        rect: visible,
        kind,
    })
}

fn window_rect<B: WindowLookup>(backend: &B, window: WindowId) -> AppResult<Rect> {
    backend
        .window_geometry(window)
        .map_err(|source| AppError::WindowResolutionFailed {
            source: Some(source),
        })
}

/// Grabs the pixels of `region` and masks the parts no monitor shows.
pub fn capture_still<B: CaptureBackend>(
    backend: &B,
    region: ResolvedRegion,
) -> AppResult<RgbaImage> {
    let buffer = backend
        .grab_pixels(region.rect)
        .map_err(|err| AppError::InvalidCapture {
            message: err.to_string(),
        })?;
    let mut image = buffer.into_rgba_image().map_err(|err| AppError::InvalidCapture {
        message: err.to_string(),
    })?;

    let monitors = match backend.monitors() {
        Ok(monitors) => monitors,
        Err(err) => {
            tracing::warn!(?err, "monitor layout unavailable; skipping mask");
            Vec::new()
        }
    };
    if needs_masking(&monitors, region.kind == RegionKind::Window) {
        let mask = CoverageMask::for_monitors(region.rect, &monitors);
        if !mask.covers_everything() {
            tracing::debug!(monitors = monitors.len(), "masking uncovered screen areas");
            composite(&mut image, &mask, BACKGROUND);
        }
    }
    Ok(image)
}

/// Runs one capture session end to end and delivers exactly one output.
pub fn execute<B, C>(
    backend: &B,
    clipboard: &mut C,
    recorder: Option<&mut dyn Recorder>,
    stop: &dyn StopTrigger,
    request: &CaptureRequest,
) -> AppResult<CaptureOutcome>
where
    B: CaptureBackend,
    C: ClipboardBackend,
{
    let region = resolve_region(backend, request.target)?;
    tracing::info!(region = %region.rect, kind = ?region.kind, "capture region resolved");

    match &request.output {
        CaptureOutput::StillImage(template) => {
            let image = capture_still(backend, region)?;
            let (width, height) = image.dimensions();
            let path = PathBuf::from(expand_template(template, width, height));
            let saved = save_image(&image, &path)
                .map_err(|err| AppError::save_failed(&path, err))?;
            run_exec(
                request.exec.as_deref(),
                &saved.display().to_string(),
                width,
                height,
            );
            Ok(CaptureOutcome {
                region: region.rect,
                destination: Destination::Saved(saved),
            })
        }
        CaptureOutput::Clipboard => {
            let image = capture_still(backend, region)?;
            let (width, height) = image.dimensions();
            clipboard
                .publish_image(&image)
                .map_err(|err| AppError::save_failed(CLIPBOARD_PLACEHOLDER, err))?;
            run_exec(
                request.exec.as_deref(),
                CLIPBOARD_PLACEHOLDER,
                width,
                height,
            );
            clipboard
                .hold_image(&image)
                .map_err(|err| AppError::save_failed(CLIPBOARD_PLACEHOLDER, err))?;
            Ok(CaptureOutcome {
                region: region.rect,
                destination: Destination::Clipboard,
            })
        }
        CaptureOutput::VideoStream(template) => {
            let recorder = recorder.ok_or(RecordingError::EncoderNotFound)?;
            let display = request
                .display
                .clone()
                .ok_or(RecordingError::MissingDisplay)?;
            let rect = encodable_region(region.rect);
            if rect.is_empty() {
                return Err(AppError::InvalidCapture {
                    message: format!("region {} is too small to record", region.rect),
                });
            }
            let output = PathBuf::from(expand_template(template, rect.width, rect.height));
            record(recorder, stop, &RecordingSpec {
                region: rect,
                display,
                output: output.clone(),
            })?;
            run_exec(
                request.exec.as_deref(),
                &output.display().to_string(),
                rect.width,
                rect.height,
            );
            Ok(CaptureOutcome {
                region: rect,
                destination: Destination::Recorded(output),
            })
        }
    }
}

fn record(
    recorder: &mut dyn Recorder,
    stop: &dyn StopTrigger,
    spec: &RecordingSpec,
) -> AppResult<()> {
    recorder.start(spec)?;
    let waited = stop.wait_for_stop();
    let status = recorder.stop()?;
    if let Err(err) = waited {
        return Err(RecordingError::StopTrigger {
            message: err.to_string(),
        }
        .into());
    }
    if !status.success() {
        tracing::warn!(%status, "encoder exited with a failure status");
    }
    Ok(())
}

/// Runs the user's post-capture command through the shell. Failures are only logged.
fn run_exec(command: Option<&str>, filename: &str, width: u32, height: u32) {
    let Some(command) = command else {
        return;
    };
    let expanded = expand_command(command, filename, width, height);
    tracing::debug!(command = %expanded, "running exec command");
    match Command::new("sh").arg("-c").arg(&expanded).status() {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!(command = %expanded, %status, "exec command failed"),
        Err(err) => tracing::warn!(command = %expanded, ?err, "failed to run exec command"),
    }
}
