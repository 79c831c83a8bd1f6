// Runs exactly one plugin against exactly one open connection.

use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

use super::Config;
use crate::error::ScanError;
use crate::plugins::{plugin_id, Connection, Plugin, Service, Target};

/// Invoke `plugin` on `conn`, bounded by the config's probe timeout.
///
/// Returns the plugin's verdict unchanged: a matched service, a decline
/// (`Ok(None)`), or an error. The connection is consumed and closed when
/// this returns, whatever the outcome. No retries.
pub(crate) async fn run_plugin(
    mut conn: Connection,
    target: &Target,
    config: &Config,
    plugin: &Arc<dyn Plugin>,
) -> Result<Option<Service>, ScanError> {
    let id = plugin_id(plugin.as_ref());

    if config.verbose {
        debug!(endpoint = %target, plugin = %id, "probing");
    }

    let outcome = match timeout(
        config.default_timeout,
        plugin.probe(&mut conn, config.default_timeout, target),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ScanError::ProbeTimeout {
            plugin: id.clone(),
            timeout: config.default_timeout,
        }),
    };

    if config.verbose {
        debug!(endpoint = %target, plugin = %id, "probe completed");
    }

    outcome
}
