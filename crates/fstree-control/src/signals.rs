//! OS signal bindings: SIGINT/SIGTERM request a stop; SIGUSR2 (Unix only)
//! toggles pause. Platforms lacking a given signal get a no-op binding.

use fstree_error::Result;

use crate::ControlPlane;

/// Wires `SIGINT`/`SIGTERM` to [`ControlPlane::request_stop`] and, on Unix,
/// `SIGUSR2` to toggling pause. Safe to call once per process.
pub fn install_signal_handlers(control: ControlPlane) -> Result<()> {
    let stop_control = control.clone();
    ctrlc::set_handler(move || stop_control.request_stop("SIGINT/SIGTERM"))
        .map_err(|err| fstree_error::Error::storage(format!("failed to install signal handler: {err}")))?;

    #[cfg(unix)]
    install_sigusr2(control)?;
    #[cfg(not(unix))]
    let _ = control;

    Ok(())
}

#[cfg(unix)]
fn install_sigusr2(control: ControlPlane) -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR2, flag.clone())
        .map_err(|err| fstree_error::Error::storage(format!("failed to register SIGUSR2: {err}")))?;

    std::thread::spawn(move || {
        loop {
            std::thread::sleep(std::time::Duration::from_millis(200));
            if flag.swap(false, Ordering::SeqCst) {
                if control.is_paused() {
                    control.clear_pause();
                } else {
                    control.request_pause("SIGUSR2");
                }
            }
        }
    });
    Ok(())
}
