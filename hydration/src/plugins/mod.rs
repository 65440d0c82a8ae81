// Built-in data source plugins
pub mod demo;
pub mod unity;

pub use demo::{DemoProfilePlugin, DEMO_PLUGIN_ID};
pub use unity::{UnityProfilePlugin, UNITY_PLUGIN_ID};

use crate::config::PortalConfig;
use crate::external::ExternalServiceClient;
use crate::plugin::ProfilePlugin;
use std::sync::Arc;

/// The plugins registered at startup
pub fn builtin_plugins(
    config: &PortalConfig,
    client: Arc<ExternalServiceClient>,
) -> Vec<Arc<dyn ProfilePlugin>> {
    vec![
        Arc::new(DemoProfilePlugin::new(&config.demo)),
        Arc::new(UnityProfilePlugin::new(client, &config.unity)),
    ]
}
