//! OS-level process plumbing: shell launch and process-tree kill.

use std::path::Path;
use std::process::Stdio;

use anyhow::Result;
use tokio::process::Command;

/// Build the launch command for a server start script.
///
/// The launch artifact is usually a script (`run.bat`, `start.sh`), so it goes
/// through the platform shell. All three standard streams are piped.
///
/// The child is placed in its own process group (Unix) so [`kill_tree`]
/// can reach the JVM the script starts, not just the shell.
pub fn shell_command(launch_command: &str, working_dir: &Path) -> Command {
    #[cfg(target_os = "windows")]
    let mut cmd = {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        let mut cmd = std::process::Command::new("cmd");
        cmd.arg("/C").arg(launch_command).creation_flags(CREATE_NO_WINDOW);
        cmd
    };

    #[cfg(not(target_os = "windows"))]
    let mut cmd = {
        use std::os::unix::process::CommandExt;
        let mut cmd = std::process::Command::new("sh");
        cmd.arg("-c").arg(launch_command).process_group(0);
        cmd
    };

    cmd.current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut cmd = Command::from(cmd);
    cmd.kill_on_drop(false);
    cmd
}

/// Force-kill a process together with all of its descendants.
///
/// Returns once the request is issued; the exit watcher observes the result.
/// A target that is already gone counts as success.
#[cfg(not(target_os = "windows"))]
pub fn kill_tree(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(anyhow::anyhow!("Failed to kill process group {}: {}", pid, e)),
    }
}

#[cfg(target_os = "windows")]
pub fn kill_tree(pid: u32) -> Result<()> {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    // /T: 자식 프로세스(java 등)까지 함께 종료
    std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .creation_flags(CREATE_NO_WINDOW)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to run taskkill for PID {}: {}", pid, e))?;
    Ok(())
}
