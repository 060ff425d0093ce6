pub mod app;
pub mod capture;
pub mod cli;
pub mod clipboard;
mod config;
pub mod error;
pub mod geometry;
pub mod input;
mod interrupt;
pub mod logging;
pub mod recording;
pub mod state;
pub mod storage;
pub use error::{AppError, AppResult};

use capture::x11::X11Backend;
use capture::{CaptureOutcome, Destination};
use clipboard::ArboardBackend;
use input::Hotkey;
use recording::{FfmpegEncoder, Recorder, RecordingSession};

/// Parses `args` (without the program name), runs one capture session and prints the
/// saved file name. `Ok(None)` means only help or version output was requested.
pub fn run<I, S>(args: I) -> AppResult<Option<CaptureOutcome>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    logging::init();
    let options = cli::parse_args(args)?;
    if options.help {
        print!("{}", cli::USAGE);
        return Ok(None);
    }
    if options.version {
        println!("rscrot {}", env!("CARGO_PKG_VERSION"));
        return Ok(None);
    }
    tracing::info!("starting rscrot");
    interrupt::install();

    let config = config::load_app_config();
    let plan = app::SessionPlan::new(&options, &config, std::env::var("DISPLAY").ok());

    let mut recorder = None;
    let mut stop_hotkey = None;
    if options.record {
        let accelerator = options.stop_key.as_deref().unwrap_or(&config.stop_hotkey);
        let hotkey = Hotkey::parse(accelerator)
            .map_err(|err| cli::CliError::InvalidHotkey(err.to_string()))?;
        stop_hotkey = Some(hotkey);
        recorder = Some(RecordingSession::new(FfmpegEncoder::resolve()?));
    }

    let mut backend = X11Backend::connect(None)
        .map_err(|source| AppError::DisplayUnavailable { source })?
        .with_overlay_opacity(config.overlay_opacity);
    if let Some(hotkey) = stop_hotkey {
        backend = backend.with_stop_hotkey(hotkey);
    }
    let mut clipboard = ArboardBackend::default();

    let outcome = app::run_session(
        &mut backend,
        &mut clipboard,
        recorder
            .as_mut()
            .map(|session| session as &mut dyn Recorder),
        &plan,
        &mut std::io::stdout(),
        std::thread::sleep,
    )?;

    match &outcome.destination {
        Destination::Saved(path) | Destination::Recorded(path) => println!("{}", path.display()),
        Destination::Clipboard => {}
    }
    tracing::info!(
        region = %outcome.region,
        destination = ?outcome.destination,
        "capture complete"
    );
    Ok(Some(outcome))
}
