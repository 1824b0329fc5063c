use crate::environment::Environment;
use crate::error::ServerError;
use crate::handler::{BoundHandler, CodeLocator};
use crate::installer::DependencyInstaller;
use crate::server::{RequestServer, ServerHandle};
use tracing::{debug, info};

/// Startup orchestration: install requirements, bind the handler, serve.
pub struct InferenceServer {
    environment: Environment,
    installer: DependencyInstaller,
    locator: CodeLocator,
    handler: Option<BoundHandler>,
}

impl InferenceServer {
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            installer: DependencyInstaller::from_environment(&environment),
            locator: CodeLocator::new(),
            handler: None,
            environment,
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(Environment::from_env())
    }

    /// Replace the unit loader, e.g. for statically linked handlers
    #[must_use]
    pub fn with_locator(mut self, locator: CodeLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The bound handler, once located
    pub fn handler(&self) -> Option<&BoundHandler> {
        self.handler.as_ref()
    }

    /// Locate the configured handler without installing requirements.
    ///
    /// # Errors
    ///
    /// `InvalidReference`, `CodeNotFound` or `SymbolNotFound`.
    pub fn locate(&self) -> Result<BoundHandler, ServerError> {
        self.locator
            .locate_reference(&self.environment.code_path(), &self.environment.code)
    }

    /// Install requirements, then bind the handler. Runs once.
    ///
    /// # Errors
    ///
    /// `DependencyInstallFailure`, then any error from [`locate`](Self::locate).
    pub fn initialize(&mut self) -> Result<&BoundHandler, ServerError> {
        let handler = self.take_handler()?;
        Ok(self.handler.insert(handler))
    }

    fn take_handler(&mut self) -> Result<BoundHandler, ServerError> {
        if let Some(handler) = self.handler.take() {
            return Ok(handler);
        }
        debug!(
            environment = %serde_json::to_string(&self.environment).unwrap_or_default(),
            "Resolved environment"
        );
        self.installer.install(&self.environment.code_path())?;
        self.locate()
    }

    /// Initialize if needed and start the request server without blocking.
    ///
    /// # Errors
    ///
    /// Any startup error, or `ServerStartFailure` if the port cannot be bound.
    pub fn start(mut self) -> Result<ServerHandle, ServerError> {
        let handler = self.take_handler()?;
        RequestServer::new(handler, &self.environment)?.start()
    }

    /// Initialize if needed and serve until the process ends.
    ///
    /// # Errors
    ///
    /// Any startup error. Once serving, this only returns if the accept loop dies.
    pub fn serve(self) -> Result<(), ServerError> {
        let handle = self.start()?;
        info!(address = %handle.local_addr(), "Serving inference requests");
        handle.join()
    }
}
