use std::fmt;
use std::io;
use std::path::PathBuf;

/// Startup error
///
/// Every variant is fatal: the process must not begin serving without a bound
/// handler, and nothing in the server retries.
#[derive(Debug)]
pub enum ServerError {
    /// The configured handler reference is not of the form `<module>.<symbol>`
    InvalidReference {
        /// The reference string as configured
        reference: String,
    },
    /// No loadable unit for the module exists in the code directory
    ///
    /// Also returned when the file exists but the dynamic loader rejects it.
    CodeNotFound {
        /// Path the unit was expected at
        path: PathBuf,
        /// Loader diagnostic, if the file existed
        reason: Option<String>,
    },
    /// The unit was loaded but exports no handler under the requested name
    SymbolNotFound {
        /// Requested symbol
        symbol: String,
        /// Module the symbol was looked up in
        module: String,
    },
    /// The dependency installer could not be run or exited unsuccessfully
    DependencyInstallFailure {
        /// Requirements file handed to the installer
        requirements: PathBuf,
        /// Installer diagnostic
        reason: String,
    },
    /// Binding the listening port or starting the scheduling loop failed
    ServerStartFailure(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::InvalidReference { reference } => write!(
                f,
                "Inference code expected in the format of `<module>.<handler>` but was provided as `{}`",
                reference
            ),
            ServerError::CodeNotFound { path, reason: None } => write!(
                f,
                "Inference code could not be found at `{}`",
                path.display()
            ),
            ServerError::CodeNotFound {
                path,
                reason: Some(reason),
            } => write!(
                f,
                "Inference code at `{}` could not be loaded: {}",
                path.display(),
                reason
            ),
            ServerError::SymbolNotFound { symbol, module } => write!(
                f,
                "Handler `{}` could not be found in module `{}`",
                symbol, module
            ),
            ServerError::DependencyInstallFailure {
                requirements,
                reason,
            } => write!(
                f,
                "Failed to install requirements from `{}`: {}",
                requirements.display(),
                reason
            ),
            ServerError::ServerStartFailure(e) => {
                write!(f, "Inference server failed to start: {}", e)
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::ServerStartFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::ServerStartFailure(e)
    }
}

/// Per-request invocation failure
///
/// Reported to the caller of the failing request only. The server keeps
/// serving subsequent requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// The handler returned an error
    Raised(String),
    /// The handler panicked
    Panicked(String),
    /// The worker pool no longer accepts work
    PoolUnavailable,
}

impl InvocationError {
    /// HTTP status used when reporting this failure
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            InvocationError::Raised(_) | InvocationError::Panicked(_) => 500,
            InvocationError::PoolUnavailable => 503,
        }
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationError::Raised(message) => write!(f, "Handler raised: {}", message),
            InvocationError::Panicked(message) => write!(f, "Handler panicked: {}", message),
            InvocationError::PoolUnavailable => {
                write!(f, "Handler workers are not responding")
            }
        }
    }
}

impl std::error::Error for InvocationError {}
