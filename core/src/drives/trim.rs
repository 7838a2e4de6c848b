use std::io;
use std::path::Path;
use std::process::Command;

/// External command line to run for a volume-level optimisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl OptimizeCommand {
    fn run(&self) -> io::Result<()> {
        tracing::debug!(program = self.program, args = ?self.args, "Running optimisation command");

        let output = Command::new(self.program).args(&self.args).output()?;
        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} failed: {}", self.program, error.trim()),
            ));
        }
        Ok(())
    }
}

pub struct TrimOperations;

impl TrimOperations {
    /// Command that discards freed blocks on the filesystem holding `path`
    pub fn trim_command(path: &Path) -> Option<OptimizeCommand> {
        if cfg!(target_os = "linux") {
            Some(OptimizeCommand {
                program: "fstrim",
                args: vec!["-v".to_string(), path.display().to_string()],
            })
        } else if cfg!(windows) {
            Some(OptimizeCommand {
                program: "defrag",
                args: vec![Self::volume_letter(path), "/L".to_string()],
            })
        } else {
            // macOS and others trim in the background
            None
        }
    }

    /// Command that defragments a rotational volume holding `path`
    pub fn defragment_command(path: &Path) -> Option<OptimizeCommand> {
        if cfg!(windows) {
            Some(OptimizeCommand {
                program: "defrag",
                args: vec![Self::volume_letter(path), "/O".to_string()],
            })
        } else {
            None
        }
    }

    /// Best-effort TRIM of the volume holding `path`
    pub fn trim_volume(path: &Path) -> io::Result<()> {
        match Self::trim_command(path) {
            Some(command) => command.run(),
            None => {
                tracing::debug!(path = %path.display(), "No TRIM command on this platform");
                Ok(())
            }
        }
    }

    /// Best-effort defragmentation of the volume holding `path`
    pub fn defragment_volume(path: &Path) -> io::Result<()> {
        match Self::defragment_command(path) {
            Some(command) => command.run(),
            None => {
                tracing::debug!(path = %path.display(), "No defragmenter on this platform");
                Ok(())
            }
        }
    }

    fn volume_letter(path: &Path) -> String {
        let text = path.display().to_string();
        match text.find(':') {
            Some(idx) => text[..=idx].to_string(),
            None => text,
        }
    }
}
