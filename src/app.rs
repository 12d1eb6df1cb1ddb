// ABOUTME: Composition root - wires store, connection provider, engine, and scheduler
// ABOUTME: Shared by the HTTP server and the CLI commands

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::conflicts::ConflictManager;
use crate::connection::ConnectionProvider;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::scheduler::Scheduler;
use crate::store::{MetadataStore, SqliteStore};
use crate::sync::SyncEngine;
use crate::token::TokenCodec;

/// Every long-lived component, built once per process.
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<dyn MetadataStore>,
    pub provider: Arc<ConnectionProvider>,
    pub conflicts: Arc<ConflictManager>,
    pub engine: Arc<SyncEngine>,
    pub scheduler: Scheduler,
}

impl App {
    /// Open the configured store and build everything on top of it.
    pub fn build(config: Config) -> Result<Self> {
        let store = SqliteStore::open(&config.store.path).with_context(|| {
            format!(
                "Failed to open metadata store at {}",
                config.store.path.display()
            )
        })?;
        let notifier = notifier_for(&config)?;
        Ok(Self::with_parts(config, Arc::new(store), notifier))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn MetadataStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let provider = Arc::new(ConnectionProvider::new());
        let conflicts = Arc::new(ConflictManager::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            notifier,
            token_codec(&config),
            config.server.public_url.clone(),
        ));
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            Arc::clone(&conflicts),
            (&config.sync).into(),
        ));
        let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&engine));

        Self {
            config: Arc::new(config),
            store,
            provider,
            conflicts,
            engine,
            scheduler,
        }
    }
}

fn notifier_for(config: &Config) -> Result<Arc<dyn Notifier>> {
    match &config.notify.webhook_url {
        Some(url) => {
            tracing::info!("Conflict notices go to {}", crate::utils::sanitize_url(url));
            Ok(Arc::new(WebhookNotifier::new(
                url.clone(),
                config.notify.from.clone(),
            )?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

fn token_codec(config: &Config) -> TokenCodec {
    let ttl = chrono::Duration::hours(config.token.ttl_hours);
    if config.token.secret.is_empty() {
        tracing::warn!(
            "token.secret is not set; using a random key, so view links stop working after a restart"
        );
        let secret: [u8; 32] = rand::random();
        TokenCodec::new(secret.to_vec(), ttl)
    } else {
        TokenCodec::new(config.token.secret.as_bytes().to_vec(), ttl)
    }
}
