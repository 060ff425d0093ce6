use std::io::{self, Write};
use std::time::Duration;

const TICK: Duration = Duration::from_secs(1);

/// Waits `seconds` one-second ticks before the session continues. With `announce` the
/// remaining time is printed as `Taking shot in ..3 ..2 ..1 ..0.`.
pub fn run_countdown<W, F>(
    seconds: u32,
    announce: bool,
    out: &mut W,
    mut sleep: F,
) -> io::Result<()>
where
    W: Write,
    F: FnMut(Duration),
{
    if seconds == 0 {
        return Ok(());
    }
    if announce {
        write!(out, "Taking shot in ..{seconds}")?;
        out.flush()?;
    }
    for remaining in (0..seconds).rev() {
        sleep(TICK);
        if announce {
            write!(out, " ..{remaining}")?;
            out.flush()?;
        }
    }
    if announce {
        writeln!(out, ".")?;
        out.flush()?;
    }
    Ok(())
}
