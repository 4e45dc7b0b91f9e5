//! Named applications and their loggers.
//!
//! A process may host several [`App`]s. The registry owns them and hands
//! them out by name, or by the numeric id assigned at creation when no name
//! was given. It is a plain value: create it where the apps are assembled and
//! pass it to whatever needs lookup-by-name.

use crate::app::App;
use crate::config::{LoggingConfig, RexConfig};
use crate::error::{Result, RexError};
use crate::logging::Logger;

/// Key of a registered application
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppId {
    Name(String),
    Index(usize),
}

impl From<&str> for AppId {
    fn from(name: &str) -> Self {
        AppId::Name(name.to_string())
    }
}

impl From<String> for AppId {
    fn from(name: String) -> Self {
        AppId::Name(name)
    }
}

impl From<usize> for AppId {
    fn from(index: usize) -> Self {
        AppId::Index(index)
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppId::Name(name) => write!(f, "{}", name),
            AppId::Index(index) => write!(f, "#{}", index),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub name: Option<String>,
    pub config: RexConfig,
    /// Replaces `config.logging` when set
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: Vec<(AppId, App)>,
    next_index: usize,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register an app. Fails when the name is already taken.
    pub fn create(&mut self, options: AppOptions) -> Result<AppId> {
        let AppOptions { name, mut config, logging } = options;
        if let Some(logging) = logging {
            config.logging = logging;
        }

        let id = match name {
            Some(name) => AppId::Name(name),
            None => {
                let id = AppId::Index(self.next_index);
                self.next_index += 1;
                id
            }
        };
        if self.position(&id).is_some() {
            return Err(RexError::InvalidArgument(format!("an app named {} already exists", id)));
        }

        log::debug!("Registering app {}", id);
        self.apps.push((id.clone(), App::new(config)));
        Ok(id)
    }

    fn position(&self, id: &AppId) -> Option<usize> {
        self.apps.iter().position(|(key, _)| key == id)
    }

    pub fn app(&self, id: impl Into<AppId>) -> Option<&App> {
        self.position(&id.into()).map(|slot| &self.apps[slot].1)
    }

    pub fn app_mut(&mut self, id: impl Into<AppId>) -> Option<&mut App> {
        self.position(&id.into()).map(move |slot| &mut self.apps[slot].1)
    }

    pub fn logger(&self, id: impl Into<AppId>) -> Option<&Logger> {
        self.app(id).map(App::logger)
    }

    /// The earliest registered app still in the registry
    pub fn first_app(&self) -> Option<&App> {
        self.apps.first().map(|(_, app)| app)
    }

    /// Remove an app (and its logger) from the registry
    pub fn take(&mut self, id: impl Into<AppId>) -> Option<App> {
        let slot = self.position(&id.into())?;
        Some(self.apps.remove(slot).1)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
