//! Screen recording through an external encoder process bound to a screen region.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::geometry::Rect;
use thiserror::Error;

const ENCODER_CANDIDATES: [&str; 2] = ["avconv", "ffmpeg"];
const QUIT_COMMAND: &[u8] = b"q";

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("neither avconv nor ffmpeg was found in PATH")]
    EncoderNotFound,
    #[error("failed to spawn encoder {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("encoder exited right after start: {status}")]
    ExitedEarly { status: ExitStatus },
    #[error("a recording is already running")]
    AlreadyRunning,
    #[error("no recording is running")]
    NotRunning,
    #[error("failed to stop encoder: {source}")]
    Stop {
        #[source]
        source: io::Error,
    },
    #[error("DISPLAY is not set")]
    MissingDisplay,
    #[error("failed waiting for the stop hotkey: {message}")]
    StopTrigger { message: String },
}

pub type RecordingResult<T> = std::result::Result<T, RecordingError>;

/// Region, display and output file of one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSpec {
    pub region: Rect,
    pub display: String,
    pub output: PathBuf,
}

/// A resolved encoder capability: which binary to run and how to invoke it.
pub trait EncoderProvider {
    fn program(&self) -> &Path;
    fn arguments(&self, spec: &RecordingSpec) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Probes PATH once; `avconv` wins over `ffmpeg` when both exist.
    pub fn resolve() -> RecordingResult<Self> {
        Self::resolve_with(|name| which::which(name).ok())
    }

    pub fn resolve_with<F>(lookup: F) -> RecordingResult<Self>
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        let binary = ENCODER_CANDIDATES
            .iter()
            .find_map(|name| lookup(name))
            .ok_or(RecordingError::EncoderNotFound)?;
        tracing::debug!(binary = %binary.display(), "resolved video encoder");
        Ok(Self::with_binary(binary))
    }
}

impl EncoderProvider for FfmpegEncoder {
    fn program(&self) -> &Path {
        &self.binary
    }

    fn arguments(&self, spec: &RecordingSpec) -> Vec<String> {
        let region = spec.region;
        let input = format!("{}+{},{}", spec.display, region.x, region.y);
        let size = format!("{}x{}", region.width, region.height);
        let mut args: Vec<String> = [
            "-loglevel", "error", "-y", "-hide_banner", "-video_size",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
        args.push(size);
        args.extend(["-f", "x11grab", "-i"].map(String::from));
        args.push(input);
        // VP9 realtime preset.
        args.extend(
            [
                "-c:v",
                "libvpx-vp9",
                "-b:v",
                "1000k",
                "-quality",
                "realtime",
                "-threads",
                "8",
                "-speed",
                "7",
                "-row-mt",
                "1",
                "-tile-columns",
                "3",
                "-frame-parallel",
                "1",
                "-qmin",
                "4",
                "-qmax",
                "13",
                "-r",
                "30",
                "-g",
                "90",
            ]
            .map(String::from),
        );
        args.push(spec.output.display().to_string());
        args
    }
}

/// Shrinks `region` to even dimensions, which yuv420 encoders require.
pub fn encodable_region(region: Rect) -> Rect {
    Rect::new(region.x, region.y, region.width & !1, region.height & !1)
}

/// Start/stop contract of a recorder bound to one region at a time.
pub trait Recorder {
    fn start(&mut self, spec: &RecordingSpec) -> RecordingResult<()>;
    fn stop(&mut self) -> RecordingResult<ExitStatus>;
}

/// Start/stop contract around one encoder process.
#[derive(Debug)]
pub struct RecordingSession<P> {
    provider: P,
    child: Option<Child>,
}

impl<P: EncoderProvider> RecordingSession<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            child: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn start(&mut self, spec: &RecordingSpec) -> RecordingResult<()> {
        if self.child.is_some() {
            return Err(RecordingError::AlreadyRunning);
        }
        let program = self.provider.program();
        let args = self.provider.arguments(spec);
        tracing::info!(
            program = %program.display(),
            region = %spec.region,
            output = %spec.output.display(),
            "starting recording"
        );

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| RecordingError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        match child.try_wait() {
            Ok(Some(status)) => Err(RecordingError::ExitedEarly { status }),
            Ok(None) => {
                self.child = Some(child);
                Ok(())
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(RecordingError::Spawn {
                    program: program.display().to_string(),
                    source,
                })
            }
        }
    }

    /// Asks the encoder to quit and blocks until it has exited.
    pub fn stop(&mut self) -> RecordingResult<ExitStatus> {
        let mut child = self.child.take().ok_or(RecordingError::NotRunning)?;
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(QUIT_COMMAND) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    tracing::warn!("encoder closed its input before the quit command");
                }
                Err(source) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RecordingError::Stop { source });
                }
            }
        }
        let status = child
            .wait()
            .map_err(|source| RecordingError::Stop { source })?;
        tracing::info!(%status, "recording stopped");
        Ok(status)
    }
}

impl<P: EncoderProvider> Recorder for RecordingSession<P> {
    fn start(&mut self, spec: &RecordingSpec) -> RecordingResult<()> {
        RecordingSession::start(self, spec)
    }

    fn stop(&mut self) -> RecordingResult<ExitStatus> {
        RecordingSession::stop(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShellEncoder {
        script: &'static str,
    }

    impl EncoderProvider for ShellEncoder {
        fn program(&self) -> &Path {
            Path::new("sh")
        }

        fn arguments(&self, _spec: &RecordingSpec) -> Vec<String> {
            vec!["-c".to_string(), self.script.to_string()]
        }
    }

    fn spec() -> RecordingSpec {
        RecordingSpec {
            region: Rect::new(10, 20, 640, 480),
            display: ":0".to_string(),
            output: PathBuf::from("/tmp/out.webm"),
        }
    }

    #[test]
    fn resolve_prefers_avconv_over_ffmpeg() {
        let encoder =
            FfmpegEncoder::resolve_with(|name| Some(PathBuf::from(format!("/usr/bin/{name}"))))
                .expect("encoder should resolve");
        assert_eq!(encoder.program(), Path::new("/usr/bin/avconv"));

        let encoder = FfmpegEncoder::resolve_with(|name| {
            (name == "ffmpeg").then(|| PathBuf::from("/usr/bin/ffmpeg"))
        })
        .expect("ffmpeg fallback should resolve");
        assert_eq!(encoder.program(), Path::new("/usr/bin/ffmpeg"));
    }

    #[test]
    fn resolve_errors_when_no_encoder_exists() {
        let err = FfmpegEncoder::resolve_with(|_| None).expect_err("nothing in PATH");
        assert!(matches!(err, RecordingError::EncoderNotFound));
    }

    #[test]
    fn ffmpeg_arguments_bind_region_display_and_output() {
        let args = FfmpegEncoder::with_binary("ffmpeg").arguments(&spec());
        let position = |flag: &str| args.iter().position(|arg| arg == flag).expect(flag);

        assert_eq!(args[position("-video_size") + 1], "640x480");
        assert_eq!(args[position("-f") + 1], "x11grab");
        assert_eq!(args[position("-i") + 1], ":0+10,20");
        assert_eq!(args[position("-c:v") + 1], "libvpx-vp9");
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.webm"));
    }

    #[test]
    fn stop_sends_quit_command_and_waits_for_exit() {
        let mut session = RecordingSession::new(ShellEncoder {
            script: r#"read -r line; test "$line" = q"#,
        });
        session.start(&spec()).expect("shell encoder should start");
        assert!(session.is_running());

        let status = session.stop().expect("stop should wait for exit");
        assert!(status.success());
        assert!(!session.is_running());
    }

    #[test]
    fn start_reports_spawn_failure() {
        let mut session = RecordingSession::new(FfmpegEncoder::with_binary(
            "/nonexistent/rscrot-encoder",
        ));
        let err = session
            .start(&spec())
            .expect_err("missing binary must fail");
        assert!(matches!(err, RecordingError::Spawn { .. }));
        assert!(!session.is_running());
    }

    #[test]
    fn encodable_region_drops_odd_pixels() {
        assert_eq!(
            encodable_region(Rect::new(3, 4, 641, 481)),
            Rect::new(3, 4, 640, 480)
        );
        assert!(encodable_region(Rect::new(0, 0, 1, 30)).is_empty());
    }

    #[test]
    fn stop_without_start_is_an_error() {
        let mut session = RecordingSession::new(FfmpegEncoder::with_binary("ffmpeg"));
        assert!(matches!(session.stop(), Err(RecordingError::NotRunning)));
    }
}
