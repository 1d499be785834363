//! Text-to-speech capability
//!
//! Synthesis is delegated to whichever system speech command is installed.
//! The capability is detected once at startup; when nothing is usable the
//! daemon carries a `Disabled` capability instead of checking a flag at
//! every call site.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

/// Words per minute used for spoken feedback
pub const SPEECH_RATE_WPM: u32 = 175;

/// A blocking speech synthesizer
pub trait SpeechEngine: Send {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Speak `text`, returning once playback finishes
    fn synthesize_and_play(&mut self, text: &str) -> Result<(), SpeechError>;
}

/// Errors from a speech engine
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: std::process::ExitStatus },
}

/// Speech commands tried in order, with their rate flag
const CANDIDATES: &[(&str, &str)] = &[
    ("say", "-r"),
    ("espeak-ng", "-s"),
    ("espeak", "-s"),
];

/// Speaks through an external command such as `say` or `espeak`
#[derive(Debug, Clone)]
pub struct CommandSpeechEngine {
    program: PathBuf,
    name: String,
    args: Vec<String>,
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string_lossy().into_owned());
        Self { program, name, args }
    }

    /// First supported speech command found on `PATH`
    pub fn detect() -> Option<Self> {
        let path = std::env::var_os("PATH")?;
        let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();

        CANDIDATES.iter().find_map(|(program, rate_flag)| {
            let found = find_program(&dirs, program)?;
            Some(Self::new(
                found,
                vec![rate_flag.to_string(), SPEECH_RATE_WPM.to_string()],
            ))
        })
    }
}

fn find_program(dirs: &[PathBuf], program: &str) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

impl SpeechEngine for CommandSpeechEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn synthesize_and_play(&mut self, text: &str) -> Result<(), SpeechError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| SpeechError::Spawn {
                program: self.name.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(SpeechError::Failed {
                program: self.name.clone(),
                status,
            })
        }
    }
}

/// Whether spoken feedback can be produced
pub enum SpeechCapability {
    Available(Box<dyn SpeechEngine>),
    Disabled { reason: String },
}

impl SpeechCapability {
    /// Detect a speech engine once
    pub fn detect(enabled: bool) -> Self {
        if !enabled {
            debug!("spoken feedback disabled by configuration");
            return SpeechCapability::Disabled {
                reason: "disabled by configuration".to_string(),
            };
        }

        match CommandSpeechEngine::detect() {
            Some(engine) => {
                info!(engine = engine.name(), "speech engine found");
                SpeechCapability::Available(Box::new(engine))
            }
            None => SpeechCapability::Disabled {
                reason: "no speech command found on PATH".to_string(),
            },
        }
    }
}

impl std::fmt::Debug for SpeechCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechCapability::Available(engine) => {
                f.debug_tuple("Available").field(&engine.name()).finish()
            }
            SpeechCapability::Disabled { reason } => {
                f.debug_struct("Disabled").field("reason", reason).finish()
            }
        }
    }
}
