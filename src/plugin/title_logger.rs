use crate::crawler::extract_title;
use crate::plugin::{Plugin, PluginResult};
use async_trait::async_trait;

/// Logs each page's `<title>` and passes content through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleLoggerPlugin;

impl TitleLoggerPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for TitleLoggerPlugin {
    fn name(&self) -> &str {
        "title-logger"
    }

    async fn process(&self, url: &str, content: String) -> PluginResult<String> {
        match extract_title(&content) {
            Some(title) => tracing::info!("{} -> {}", url, title),
            None => tracing::debug!("{} has no title", url),
        }
        Ok(content)
    }
}
