//! Per-database assistant registry

use super::{AssistantBackend, LoggingAssistant, OpenAIAssistant};
use crate::config::Config;
use std::collections::HashMap;
use std::sync::Arc;

/// Assistants keyed by database name
///
/// Databases without credentials are simply absent; selecting one is
/// allowed, but chatting with it reports missing configuration.
pub struct AssistantRegistry {
    backends: HashMap<String, Arc<dyn AssistantBackend>>,
}

impl AssistantRegistry {
    pub fn new(config: &Config) -> Self {
        let mut backends: HashMap<String, Arc<dyn AssistantBackend>> = HashMap::new();

        for name in config.databases.keys() {
            let Some(credentials) = config.credentials.get(name) else {
                tracing::warn!(database = %name, "No credentials configured for database");
                continue;
            };

            match OpenAIAssistant::new(
                credentials.api_key.clone(),
                credentials.assistant_id.clone(),
                Some(&config.api_base_url),
            ) {
                Ok(assistant) => {
                    backends.insert(
                        name.clone(),
                        Arc::new(LoggingAssistant::new(Arc::new(assistant), name.clone())),
                    );
                }
                Err(e) => {
                    tracing::error!(database = %name, error = %e, "Failed to create assistant client");
                }
            }
        }

        Self { backends }
    }

    /// Registry over prebuilt backends
    #[cfg(test)]
    pub fn from_backends(backends: HashMap<String, Arc<dyn AssistantBackend>>) -> Self {
        Self { backends }
    }

    pub fn get(&self, database: &str) -> Option<Arc<dyn AssistantBackend>> {
        self.backends.get(database).cloned()
    }

    /// Database names that have a usable assistant, sorted
    pub fn configured(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
