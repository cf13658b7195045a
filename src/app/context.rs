//! Builds the library collaborators a command needs from the settings.

use std::sync::Arc;

use anyhow::{Context, Result};
use channel_downloader_core::{
    ChannelLister, ChannelSession, Database, Fetcher, HttpFetcher, SessionConfig, Store,
    YouTubeLister, YtDlpFetcher,
};
use tracing::debug;

use super::settings::Settings;

/// Settings plus an open store.
pub(crate) struct AppContext {
    pub settings: Settings,
    pub store: Store,
}

impl AppContext {
    pub(crate) async fn open(settings: Settings) -> Result<Self> {
        let db = Database::new(&settings.database).await.with_context(|| {
            format!("Failed to open database '{}'", settings.database.display())
        })?;
        debug!(database = %settings.database.display(), "store opened");
        Ok(Self {
            settings,
            store: Store::new(db),
        })
    }

    fn lister(&self) -> Result<Arc<dyn ChannelLister>> {
        let api_key = self.settings.api_key.clone().unwrap_or_default();
        let lister = match self.settings.api_base_url.as_deref() {
            Some(base_url) => YouTubeLister::with_base_url(api_key, base_url)?,
            None => YouTubeLister::new(api_key)?,
        };
        Ok(Arc::new(lister))
    }

    fn fetcher(&self) -> Result<Arc<dyn Fetcher>> {
        Ok(match self.settings.fetch_url_template.as_deref() {
            Some(template) => Arc::new(HttpFetcher::new(template)?),
            None => Arc::new(YtDlpFetcher::new()),
        })
    }

    fn session_config(&self, write_sidecars: bool) -> SessionConfig {
        let mut config = SessionConfig::new(&self.settings.output_dir);
        config.preferred_resolution = Some(self.settings.preferred_resolution.clone());
        config.max_threads = usize::from(self.settings.max_threads);
        config.write_sidecars = write_sidecars || self.settings.sidecar;
        config
    }

    pub(crate) async fn open_session(
        &self,
        channel: &str,
        write_sidecars: bool,
    ) -> Result<ChannelSession> {
        let session = ChannelSession::open(
            channel,
            self.session_config(write_sidecars),
            self.store.clone(),
            self.lister()?,
            self.fetcher()?,
        )
        .await
        .with_context(|| format!("Failed to load channel '{channel}'"))?;
        Ok(session)
    }
}
