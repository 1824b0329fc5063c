use crate::environment::Environment;
use crate::error::ServerError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Installs the code directory's requirements with an external package manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInstaller {
    /// Requirements file name inside the code directory
    pub requirements: String,
    /// Command line; split on whitespace, the requirements path is appended
    pub command: String,
}

impl DependencyInstaller {
    #[must_use]
    pub fn new(requirements: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            requirements: requirements.into(),
            command: command.into(),
        }
    }

    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        Self::new(env.requirements.clone(), env.installer.clone())
    }

    /// Requirements file `install` looks for in `code_path`
    #[must_use]
    pub fn requirements_path(&self, code_path: &Path) -> PathBuf {
        code_path.join(&self.requirements)
    }

    /// Run the installer if `code_path` holds a requirements file.
    ///
    /// Returns whether the installer ran. Blocks until the installer exits.
    ///
    /// # Errors
    ///
    /// `DependencyInstallFailure` if the command is empty, cannot be spawned,
    /// or exits unsuccessfully.
    pub fn install(&self, code_path: &Path) -> Result<bool, ServerError> {
        let requirements = self.requirements_path(code_path);
        if !requirements.is_file() {
            debug!(
                requirements = %requirements.display(),
                "No requirements file found, skipping dependency installation"
            );
            return Ok(false);
        }

        let failure = |reason: String| ServerError::DependencyInstallFailure {
            requirements: requirements.clone(),
            reason,
        };

        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| failure("installer command is empty".to_string()))?;

        info!(
            requirements = %requirements.display(),
            installer = %self.command,
            "Installing requirements"
        );

        let status = Command::new(program)
            .args(parts)
            .arg(&requirements)
            .status()
            .map_err(|e| failure(format!("could not run `{}`: {}", program, e)))?;

        if !status.success() {
            return Err(failure(format!("`{}` exited with {}", self.command, status)));
        }

        info!(requirements = %requirements.display(), "Requirements installed");
        Ok(true)
    }
}
