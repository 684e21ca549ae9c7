//! The relaunch helper: a small script that outlives the application.
//!
//! A running executable cannot reliably overwrite itself, so installation is
//! handed to a shell script (`update.sh`) or batch file (`update.cmd`) that:
//!
//! 1. waits until the process with the recorded PID has exited
//! 2. copies the staged files over the application directory
//! 3. writes `{"status":N}` to the result marker (0 or `ApplyFilesError`)
//! 4. removes the scheduled marker and the staging directory
//! 5. starts the application again as `<exe> update_status N`
//!
//! The next process deletes the script itself.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use super::status::InstallUpdateStatus;
use crate::constants::UPDATE_STATUS_ARG;

/// Everything the helper needs to know, baked into the script text.
#[derive(Debug, Clone)]
pub struct RelaunchPlan {
    pub pid: u32,
    /// Directory whose contents replace the application files.
    pub staging_dir: PathBuf,
    pub app_dir: PathBuf,
    pub executable: PathBuf,
    pub result_path: PathBuf,
    pub scheduled_path: PathBuf,
    /// Removed after copying; may be an ancestor of `staging_dir`.
    pub cleanup_dir: PathBuf,
}

fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn cmd_quote(path: &Path) -> String {
    format!("\"{}\"", path.display().to_string().replace('%', "%%"))
}

pub fn render_unix_script(plan: &RelaunchPlan) -> String {
    let failed = InstallUpdateStatus::ApplyFilesError.code();
    format!(
        r#"#!/bin/sh
PID={pid}
while kill -0 "$PID" 2>/dev/null; do
  sleep 1
done
STATUS=0
mkdir -p {app_dir}
if ! cp -R {staging}/. {app_dir}/; then
  STATUS={failed}
fi
printf '{{"status":%s}}\n' "$STATUS" > {result}
rm -f {scheduled}
rm -rf {cleanup}
{exe} {arg} "$STATUS" >/dev/null 2>&1 &
exit 0
"#,
        pid = plan.pid,
        staging = sh_quote(&plan.staging_dir),
        app_dir = sh_quote(&plan.app_dir),
        result = sh_quote(&plan.result_path),
        scheduled = sh_quote(&plan.scheduled_path),
        cleanup = sh_quote(&plan.cleanup_dir),
        exe = sh_quote(&plan.executable),
        arg = UPDATE_STATUS_ARG,
    )
}

pub fn render_windows_script(plan: &RelaunchPlan) -> String {
    let failed = InstallUpdateStatus::ApplyFilesError.code();
    let staging = plan.staging_dir.join("*");
    format!(
        "@echo off\r\n\
         set PID={pid}\r\n\
         :wait\r\n\
         tasklist /FI \"PID eq %PID%\" 2>NUL | find \"%PID%\" >NUL\r\n\
         if not errorlevel 1 (\r\n\
         \x20 timeout /t 1 /nobreak >NUL\r\n\
         \x20 goto wait\r\n\
         )\r\n\
         set STATUS=0\r\n\
         xcopy {staging} {app_dir} /E /Y /I /Q >NUL || set STATUS={failed}\r\n\
         echo {{\"status\":%STATUS%}}> {result}\r\n\
         del /F /Q {scheduled} >NUL 2>&1\r\n\
         rmdir /S /Q {cleanup} >NUL 2>&1\r\n\
         start \"\" {exe} {arg} %STATUS%\r\n\
         exit /b 0\r\n",
        pid = plan.pid,
        staging = cmd_quote(&staging),
        app_dir = cmd_quote(&plan.app_dir),
        result = cmd_quote(&plan.result_path),
        scheduled = cmd_quote(&plan.scheduled_path),
        cleanup = cmd_quote(&plan.cleanup_dir),
        exe = cmd_quote(&plan.executable),
        arg = UPDATE_STATUS_ARG,
    )
}

/// Script for the current platform.
pub fn render_script(plan: &RelaunchPlan) -> String {
    if cfg!(windows) {
        render_windows_script(plan)
    } else {
        render_unix_script(plan)
    }
}

/// Writes the script; on Unix it is made executable.
pub fn write_script(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

/// Starts the helper detached from this process and its terminal.
pub fn spawn_detached(script: &Path) -> io::Result<()> {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("/bin/sh");
        c.arg(script);
        c
    };
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = command.spawn()?;
    debug!(pid = child.id(), script = %script.display(), "Relaunch helper started");
    Ok(())
}
