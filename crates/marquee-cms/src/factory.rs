use crate::{ContentSink, PublishSettings, SignagePublisher, XiboClient};
use marquee_core::{Config, SinkProvider, SyncError};
use std::sync::Arc;

/// Create a publish destination based on configuration
pub fn create_sink(config: &Config) -> Result<Arc<dyn ContentSink>, SyncError> {
    match config.sink_provider()? {
        SinkProvider::Xibo => {
            let client = XiboClient::from_config(config)
                .map_err(|e| SyncError::config(format!("project_to: {}", e)))?;
            let settings = PublishSettings::from_config(config)?;
            Ok(Arc::new(SignagePublisher::new(client, settings)))
        }
    }
}
