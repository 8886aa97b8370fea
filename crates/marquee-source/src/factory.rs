use crate::{ContentSource, NextcloudSource, SourceError, SourceResult};
use marquee_core::{Config, SourceProvider};
use std::sync::Arc;

/// Create a content source based on configuration
pub fn create_source(config: &Config) -> SourceResult<Arc<dyn ContentSource>> {
    let provider = config
        .source_provider()
        .map_err(|e| SourceError::ConfigError(e.to_string()))?;

    match provider {
        SourceProvider::Nextcloud => {
            let source = NextcloudSource::new(
                config.copy_from.server.clone(),
                config.copy_from.auth.user.clone(),
                config.copy_from.auth.password.clone(),
                config.http_timeout(),
            )?;
            Ok(Arc::new(source))
        }
    }
}
