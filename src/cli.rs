use thiserror::Error;

pub const USAGE: &str = "\
usage: rscrot [-h] [-v] [-s] [-a] [-x XID] [-d DELAY] [--selection-delay MS]
              [-c] [-C] [-e COMMAND] [-r] [-k HOTKEY] [FILENAME]

Minimalist screenshot capture program for X11.

options:
  -h, --help               show this help message and exit
  -v, --version            output version information and exit
  -s, --select             interactively choose a window or rectangle with the
                           mouse, cancels with Esc or Right Click
  -a, --adjust             keep the rectangle after release so it can be moved
                           and resized; Enter captures
  -x, --xid XID            take a screenshot of the xid window
  -d, --delay DELAY        wait DELAY seconds before taking a shot
  --selection-delay MS     delay in milliseconds between selection/screenshot
  -c, --countdown          show a countdown before taking the shot (requires delay)
  -C, --clipboard          store the image on the clipboard
  -e, --exec COMMAND       run the command after the image is taken
  -r, --record             record a video of the selection instead of an image
  -k, --stop-key HOTKEY    global hotkey that stops a recording (default <Ctrl><Alt>s)

SPECIAL STRINGS
  Both the --exec and filename parameters can take format specifiers that are
  expanded when encountered. Characters preceded by '%' are interpreted by
  strftime. '$' specifiers: $f image path/filename (ignored in the filename),
  $w image width, $h image height.
  Example: rscrot '%Y-%m-%d-%H%M%S_$wx$h_rscrot.png'

EXIT STATUS CODES
  1 can't get the window by xid
  2 invalid capture
  3 can't save the image
  4 user canceled selection
  5 can't grab the mouse
  6 recording failed
";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    #[error("option {0} requires a value")]
    MissingValue(String),
    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },
    #[error("unknown option: {0}")]
    UnknownFlag(String),
    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
    #[error("countdown parameter requires delay")]
    CountdownRequiresDelay,
    #[error("recording can't target the clipboard")]
    ClipboardRecording,
    #[error("invalid stop hotkey: {0}")]
    InvalidHotkey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Options {
    pub help: bool,
    pub version: bool,
    pub select: bool,
    pub adjust: bool,
    pub xid: Option<u32>,
    pub delay: Option<u32>,
    pub selection_delay_ms: Option<u64>,
    pub countdown: bool,
    pub clipboard: bool,
    pub exec: Option<String>,
    pub record: bool,
    pub stop_key: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Help,
    Version,
    Select,
    Adjust,
    Xid,
    Delay,
    SelectionDelay,
    Countdown,
    Clipboard,
    Exec,
    Record,
    StopKey,
}

impl Flag {
    fn from_long(name: &str) -> Option<Self> {
        Some(match name {
            "help" => Self::Help,
            "version" => Self::Version,
            "select" => Self::Select,
            "adjust" => Self::Adjust,
            "xid" => Self::Xid,
            "delay" => Self::Delay,
            "selection-delay" => Self::SelectionDelay,
            "countdown" => Self::Countdown,
            "clipboard" => Self::Clipboard,
            "exec" => Self::Exec,
            "record" => Self::Record,
            "stop-key" => Self::StopKey,
            _ => return None,
        })
    }

    fn from_short(name: char) -> Option<Self> {
        Some(match name {
            'h' => Self::Help,
            'v' => Self::Version,
            's' => Self::Select,
            'a' => Self::Adjust,
            'x' => Self::Xid,
            'd' => Self::Delay,
            'c' => Self::Countdown,
            'C' => Self::Clipboard,
            'e' => Self::Exec,
            'r' => Self::Record,
            'k' => Self::StopKey,
            _ => return None,
        })
    }

    const fn takes_value(self) -> bool {
        matches!(
            self,
            Self::Xid | Self::Delay | Self::SelectionDelay | Self::Exec | Self::StopKey
        )
    }
}

/// Parses the arguments after the program name.
pub fn parse_args<I, S>(args: I) -> Result<Options, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut options = Options::default();
    let mut args = args.into_iter().map(Into::into);
    let mut positional_only = false;

    while let Some(arg) = args.next() {
        if positional_only || arg == "-" || !arg.starts_with('-') {
            if options.filename.is_some() {
                return Err(CliError::UnexpectedArgument(arg));
            }
            options.filename = Some(arg);
            continue;
        }
        if arg == "--" {
            positional_only = true;
            continue;
        }

        if let Some(long) = arg.strip_prefix("--") {
            let (name, inline_value) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (long, None),
            };
            let flag =
                Flag::from_long(name).ok_or_else(|| CliError::UnknownFlag(arg.clone()))?;
            let value = if flag.takes_value() {
                match inline_value {
                    Some(value) => Some(value),
                    None => Some(
                        args.next()
                            .ok_or_else(|| CliError::MissingValue(arg.clone()))?,
                    ),
                }
            } else if inline_value.is_some() {
                return Err(CliError::UnexpectedArgument(arg));
            } else {
                None
            };
            apply(&mut options, flag, &arg, value)?;
            continue;
        }

        let cluster: Vec<char> = arg.chars().skip(1).collect();
        for (index, short) in cluster.iter().enumerate() {
            let flag =
                Flag::from_short(*short).ok_or_else(|| CliError::UnknownFlag(format!("-{short}")))?;
            if !flag.takes_value() {
                apply(&mut options, flag, &arg, None)?;
                continue;
            }
            let attached: String = cluster[index + 1..].iter().collect();
            let value = if attached.is_empty() {
                args.next()
                    .ok_or_else(|| CliError::MissingValue(format!("-{short}")))?
            } else {
                attached
            };
            apply(&mut options, flag, &format!("-{short}"), Some(value))?;
            break;
        }
    }

    validate(&options)?;
    Ok(options)
}

fn apply(
    options: &mut Options,
    flag: Flag,
    raw: &str,
    value: Option<String>,
) -> Result<(), CliError> {
    let value = value.unwrap_or_default();
    match flag {
        Flag::Help => options.help = true,
        Flag::Version => options.version = true,
        Flag::Select => options.select = true,
        Flag::Adjust => options.adjust = true,
        Flag::Countdown => options.countdown = true,
        Flag::Clipboard => options.clipboard = true,
        Flag::Record => options.record = true,
        Flag::Xid => options.xid = Some(parse_number(raw, &value)?),
        Flag::Delay => options.delay = Some(parse_number(raw, &value)?),
        Flag::SelectionDelay => options.selection_delay_ms = Some(parse_number(raw, &value)?),
        Flag::Exec => options.exec = Some(value),
        Flag::StopKey => options.stop_key = Some(value),
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, CliError> {
    let trimmed = value.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"));
    let parsed = match hex {
        Some(hex) if flag == "-x" || flag.starts_with("--xid") => u64::from_str_radix(hex, 16)
            .ok()
            .and_then(|number| number.to_string().parse().ok()),
        _ => trimmed.parse().ok(),
    };
    parsed.ok_or_else(|| CliError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

fn validate(options: &Options) -> Result<(), CliError> {
    if options.help || options.version {
        return Ok(());
    }
    if options.countdown && options.delay.unwrap_or(0) == 0 {
        return Err(CliError::CountdownRequiresDelay);
    }
    if options.record && options.clipboard {
        return Err(CliError::ClipboardRecording);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_selection_with_filename() {
        let options = parse_args(["-s", "shot_$wx$h.png"]).expect("args should parse");
        assert!(options.select);
        assert_eq!(options.filename.as_deref(), Some("shot_$wx$h.png"));
        assert!(!options.clipboard);
    }

    #[test]
    fn parse_values_in_all_spellings() {
        let options = parse_args([
            "-d",
            "3",
            "--selection-delay=400",
            "-x0x1e00004",
            "--exec",
            "echo $f",
            "-c",
        ])
        .expect("args should parse");
        assert_eq!(options.delay, Some(3));
        assert_eq!(options.selection_delay_ms, Some(400));
        assert_eq!(options.xid, Some(0x1e0_0004));
        assert_eq!(options.exec.as_deref(), Some("echo $f"));
        assert!(options.countdown);
    }

    #[test]
    fn parse_clustered_short_flags() {
        let options = parse_args(["-saC"]).expect("cluster should parse");
        assert!(options.select && options.adjust && options.clipboard);

        let options = parse_args(["-sd", "2"]).expect("cluster with value should parse");
        assert!(options.select);
        assert_eq!(options.delay, Some(2));
    }

    #[test]
    fn countdown_without_delay_is_rejected() {
        assert_eq!(
            parse_args(["-c"]).expect_err("countdown needs delay"),
            CliError::CountdownRequiresDelay
        );
    }

    #[test]
    fn recording_to_clipboard_is_rejected() {
        assert_eq!(
            parse_args(["-r", "-C"]).expect_err("recording needs a file"),
            CliError::ClipboardRecording
        );
    }

    #[test]
    fn malformed_arguments_are_reported() {
        assert_eq!(
            parse_args(["--bogus"]).expect_err("unknown flag"),
            CliError::UnknownFlag("--bogus".to_string())
        );
        assert_eq!(
            parse_args(["-d"]).expect_err("missing value"),
            CliError::MissingValue("-d".to_string())
        );
        assert!(matches!(
            parse_args(["--delay", "soon"]),
            Err(CliError::InvalidValue { .. })
        ));
        assert_eq!(
            parse_args(["a.png", "b.png"]).expect_err("two filenames"),
            CliError::UnexpectedArgument("b.png".to_string())
        );
    }

    #[test]
    fn double_dash_allows_dash_prefixed_filename() {
        let options = parse_args(["--", "-odd.png"]).expect("positional after --");
        assert_eq!(options.filename.as_deref(), Some("-odd.png"));
    }
}
