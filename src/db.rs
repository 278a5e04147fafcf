use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::utils::{retry_with_backoff, RetryConfig};

// ============================================================================
// ScyllaDB session bootstrap
// ============================================================================

/// Connect (retrying while the cluster comes up), create the keyspace if
/// needed and switch the session to it.
pub async fn connect(settings: &Settings) -> anyhow::Result<Arc<Session>> {
    let retry = RetryConfig {
        max_attempts: 10,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(5),
        multiplier: 2.0,
    };

    let session = retry_with_backoff(retry, |attempt| async move {
        tracing::info!(hosts = ?settings.scylla_hosts, attempt, "Connecting to ScyllaDB...");
        SessionBuilder::new()
            .known_nodes(&settings.scylla_hosts)
            .build()
            .await
    })
    .await
    .into_result()?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                settings.scylla_keyspace
            ),
            &[],
        )
        .await?;

    session.use_keyspace(&settings.scylla_keyspace, false).await?;
    tracing::info!(keyspace = %settings.scylla_keyspace, "ScyllaDB session ready");

    Ok(Arc::new(session))
}
