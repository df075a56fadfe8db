//! Playback through the platform's command-line audio player.
//!
//! | Platform | Command                                                   |
//! |----------|-----------------------------------------------------------|
//! | Linux    | `mpg123 <file>`                                           |
//! | macOS    | `afplay <file>`                                           |
//! | Windows  | `powershell ... (New-Object Media.SoundPlayer ...).PlaySync()` |
//!
//! Every command blocks until the file has finished playing. A missing player
//! is not an error: the command is logged and skipped, so that a device
//! without audio tooling still stays online.

use std::{
    ffi::OsStr,
    fmt, io,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;

use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    /// Any other OS, by its `std::env::consts::OS` name.
    Unsupported(&'static str),
}

impl Platform {
    #[must_use]
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            other => Self::Unsupported(other),
        }
    }

    /// Player program used on this platform, if any.
    #[must_use]
    pub fn default_program(self) -> Option<&'static str> {
        match self {
            Self::Linux => Some("mpg123"),
            Self::MacOs => Some("afplay"),
            Self::Windows => Some("powershell"),
            Self::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::MacOs => write!(f, "macos"),
            Self::Windows => write!(f, "windows"),
            Self::Unsupported(os) => write!(f, "{os}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Player {
    platform: Platform,
    program: Option<PathBuf>,
}

impl Player {
    /// Creates a player for `platform`. A `program` replaces the platform
    /// default and is invoked as `<program> <file>`.
    #[must_use]
    pub fn new(platform: Platform, program: Option<PathBuf>) -> Self {
        Self { platform, program }
    }

    fn program(&self) -> Option<&OsStr> {
        self.program
            .as_deref()
            .map(Path::as_os_str)
            .or_else(|| self.platform.default_program().map(OsStr::new))
    }

    /// Builds the command that plays `path`, or `None` when this platform
    /// has no player.
    fn command(&self, path: &Path) -> Option<Command> {
        let program = self.program()?;
        let mut command = Command::new(program);

        if self.program.is_none() && self.platform == Platform::Windows {
            // PowerShell single-quoted strings escape `'` by doubling it.
            let quoted = path.display().to_string().replace('\'', "''");
            command.args([
                "-NoProfile",
                "-Command",
                &format!("(New-Object Media.SoundPlayer '{quoted}').PlaySync();"),
            ]);
        } else {
            command.arg(path);
        }

        command.stdin(Stdio::null()).kill_on_drop(true);
        Some(command)
    }

    /// Plays `path` and waits for playback to finish.
    ///
    /// # Errors
    ///
    /// Fails when the player exits unsuccessfully or cannot be started for a
    /// reason other than not being installed.
    pub async fn play(&self, path: &Path) -> Result<()> {
        let Some(mut command) = self.command(path) else {
            warn!("playback is not supported on {}", self.platform);
            return Ok(());
        };

        let program = command.as_std().get_program().to_string_lossy().into_owned();
        debug!("playing {} with {program}", path.display());

        match command.output().await {
            Ok(output) if output.status.success() => {
                info!("played {}", path.display());
                Ok(())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(Error::unknown(format!(
                    "{program} exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{program} is not installed; skipping {}", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Checks whether the player program can be started at all.
    ///
    /// The result is only logged: a device without a player still reports
    /// its presence.
    pub async fn probe(&self) -> bool {
        let Some(program) = self.program() else {
            warn!("no audio player available on {}", self.platform);
            return false;
        };

        let mut command = Command::new(program);
        command
            .arg(match (self.program.is_some(), self.platform) {
                (false, Platform::Windows) => "-Help",
                (false, Platform::MacOs) => "-h",
                _ => "--version",
            })
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let program = program.to_string_lossy();
        match command.status().await {
            Ok(_) => {
                info!("audio player {program} found");
                true
            }
            Err(e) => {
                warn!("audio player {program} unavailable: {e}");
                false
            }
        }
    }
}
