use std::sync::Once;

use crate::error::EXIT_CANCEL;

static INIT: Once = Once::new();

/// Turns Ctrl-C during a session into a plain cancellation exit. The X server releases the
/// grabs and destroys the overlay once our connection closes.
pub fn install() {
    INIT.call_once(|| {
        // SAFETY: the handler only calls `_exit`, which is async-signal-safe.
        unsafe {
            let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::signal(libc::SIGINT, handler);
        }
    });
}

extern "C" fn on_interrupt(_: libc::c_int) {
    unsafe { libc::_exit(EXIT_CANCEL) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigint_is_routed_to_the_cancel_handler() {
        install();
        install();

        let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
        let status = unsafe { libc::sigaction(libc::SIGINT, std::ptr::null(), &mut current) };

        assert_eq!(status, 0);
        assert_eq!(
            current.sa_sigaction,
            on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t
        );
    }
}
