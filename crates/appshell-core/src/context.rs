//! ShellContext - the shared state every interface of the shell works with.
//!
//! ```text
//!                    ┌──────────────────────────┐
//!                    │       ShellContext       │
//!                    ├──────────────────────────┤
//!                    │  - EventBus              │
//!                    │  - SessionManager        │
//!                    │  - ShellConfig           │
//!                    └────────────┬─────────────┘
//!                                 │
//!                 ┌───────────────┴───────────────┐
//!                 ▼                               ▼
//!         ┌──────────────┐               ┌──────────────┐
//!         │  UI render   │               │    daemon    │
//!         │    layer     │               │    (CLI)     │
//!         └──────────────┘               └──────────────┘
//! ```
//!
//! Building the context initializes the session manager, which starts the
//! first reconciliation. There is one context per process; consumers get
//! it injected rather than reaching for a global.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::{ConfigError, ShellConfig};
use crate::event_bus::EventBus;
use crate::identity::{CredentialStore, HttpIdentityService, IdentityService};
use crate::logging::{ErrorReporter, FileReporter, LogReporter};
use crate::navigation::RootStack;
use crate::session::{ReconcilePolicy, SessionManager};

const ERROR_LOG_ID: &str = "session-errors";

#[derive(Default)]
pub struct ShellContextBuilder {
    config: Option<ShellConfig>,
    identity: Option<Arc<dyn IdentityService>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    event_bus: Option<Arc<EventBus>>,
    policy: Option<ReconcilePolicy>,
}

impl ShellContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ShellConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a specific identity service instead of the HTTP client built
    /// from the config.
    pub fn identity(mut self, identity: Arc<dyn IdentityService>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Override the config's reconcile policy.
    pub fn policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the context and start the session lifecycle.
    ///
    /// The config is only validated when it is needed to build the HTTP
    /// identity client. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<ShellContext, ConfigError> {
        let config = self.config.unwrap_or_default();

        let identity: Arc<dyn IdentityService> = match self.identity {
            Some(identity) => identity,
            None => {
                config.validate()?;
                let mut service = HttpIdentityService::new(&config.identity);
                if let Some(path) = config.resolved_credentials_path() {
                    service = service.with_credentials(CredentialStore::new(path));
                }
                Arc::new(service)
            }
        };

        let reporter = match self.reporter {
            Some(reporter) => reporter,
            None => default_reporter(&config),
        };

        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::new(Uuid::new_v4().to_string())));

        let policy = self.policy.unwrap_or(config.reconcile_policy);
        let session = SessionManager::init(identity, reporter, Arc::clone(&event_bus), policy);

        Ok(ShellContext {
            event_bus,
            session,
            config: Arc::new(config),
        })
    }
}

/// File reporter when a log dir is configured, else the log facade.
fn default_reporter(config: &ShellConfig) -> Arc<dyn ErrorReporter> {
    match &config.log_dir {
        Some(dir) => Arc::new(FileReporter::open(Some(dir.as_path()), ERROR_LOG_ID)),
        None => Arc::new(LogReporter),
    }
}

/// Shared state for the shell. Cloning clones pointers only.
#[derive(Clone)]
pub struct ShellContext {
    pub event_bus: Arc<EventBus>,
    pub session: SessionManager,
    config: Arc<ShellConfig>,
}

impl ShellContext {
    pub fn builder() -> ShellContextBuilder {
        ShellContextBuilder::new()
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        self.event_bus.instance_id()
    }

    /// Which root stack the render layer should show right now.
    pub fn root_stack(&self) -> RootStack {
        RootStack::choose(&self.session.get_session())
    }

    pub fn shutdown(&self) {
        self.session.dispose();
    }
}
