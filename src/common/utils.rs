//! Small helpers shared by the daemon and the client commands.

use std::path::Path;

/// Render a path for logs with the home directory replaced by `~`.
pub fn private_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(rest) = path.strip_prefix(&home)
    {
        return format!("~/{}", rest.display());
    }
    path.display().to_string()
}

/// Check whether a process with `pid` is still alive.
pub fn is_process_running(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    i32::try_from(pid)
        .map(|raw| kill(Pid::from_raw(raw), None).is_ok())
        .unwrap_or(false)
}

/// Format a remaining duration the way status output shows it: `1h 05m` or `12m`.
pub fn format_remaining(remaining: chrono::Duration) -> String {
    let total_minutes = (remaining.num_seconds().max(0) + 59) / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m")
    }
}
