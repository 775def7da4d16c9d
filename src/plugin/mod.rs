//! Ordered content-processing plugins
//!
//! Every fetched page that passes the content dedup gate is run through a
//! [`PluginPipeline`] before it is persisted. Plugins run one after another
//! in registration order, each seeing the content the previous one produced.
//! A plugin that errors or panics is logged and skipped; the pipeline carries
//! on with the content as it stood before that plugin.

mod title_logger;

pub use title_logger::TitleLoggerPlugin;

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// Errors a plugin may report from either hook
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("plugin panicked: {0}")]
    Panicked(String),
}

/// Result type for plugin hooks
pub type PluginResult<T> = Result<T, PluginError>;

/// A content-processing stage
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Decides whether [`Plugin::process`] runs for this page
    async fn should_run(&self, _url: &str, _content: &str) -> PluginResult<bool> {
        Ok(true)
    }

    /// Transforms the page content
    async fn process(&self, url: &str, content: String) -> PluginResult<String>;
}

/// A plugin that failed while handling one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFailure {
    pub plugin: String,
    pub message: String,
}

/// Result of running the pipeline over one page
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Content after every successful plugin
    pub content: String,

    /// Plugins that failed, in the order they ran
    pub failures: Vec<PluginFailure>,
}

/// Plugins applied in registration order
#[derive(Clone, Default)]
pub struct PluginPipeline {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plugin to the end of the pipeline
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        tracing::debug!("Registered plugin {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// Builder-style [`Self::register`]
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.register(plugin);
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in execution order
    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// Runs every plugin over `content`
    ///
    /// Never fails: a plugin error or panic is recorded in
    /// [`PipelineOutcome::failures`] and the content from before that plugin
    /// is passed on.
    pub async fn run(&self, url: &str, content: String) -> PipelineOutcome {
        let mut content = content;
        let mut failures = Vec::new();

        for plugin in &self.plugins {
            let name = plugin.name();

            let should_run = match guarded(plugin.should_run(url, &content)).await {
                Ok(run) => run,
                Err(e) => {
                    tracing::error!("Plugin {} should_run failed for {}: {}", name, url, e);
                    failures.push(PluginFailure {
                        plugin: name.to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if !should_run {
                tracing::debug!("Plugin {} skipped {}", name, url);
                continue;
            }

            match guarded(plugin.process(url, content.clone())).await {
                Ok(processed) => content = processed,
                Err(e) => {
                    tracing::error!("Plugin {} failed for {}: {}", name, url, e);
                    failures.push(PluginFailure {
                        plugin: name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        PipelineOutcome { content, failures }
    }
}

async fn guarded<T, F>(hook: F) -> PluginResult<T>
where
    F: std::future::Future<Output = PluginResult<T>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(PluginError::Panicked(message))
        }
    }
}
