use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use librarr_core::{
    create_download_clients, AcquireSettings, Acquirer, AudiobookProcessor, Config,
    EbookConverter, FileOperator, Importer, IndexerManager, LibraryStore, PathBuilder,
    SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    acquirer: Arc<Acquirer>,
}

impl AppState {
    pub fn new(config: Config, acquirer: Arc<Acquirer>) -> Self {
        Self { config, acquirer }
    }

    /// Wire indexers, download clients and the import pipeline from config.
    pub fn from_config(config: Config, store: Arc<dyn LibraryStore>) -> Result<Self> {
        let indexers = IndexerManager::from_configs(&config.indexers)
            .context("Failed to create indexers")?;
        info!(indexers = ?indexers.indexer_names(), "Indexers initialized");

        let clients = create_download_clients(&config.download_clients)
            .context("Failed to create download clients")?;
        info!(
            clients = ?clients.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            "Download clients initialized"
        );

        let importer = Importer::new(
            PathBuilder::new(&config.paths.ebook_library, &config.paths.audiobook_library),
            FileOperator::new(config.import.operation),
            Arc::clone(&store),
            config.paths.recycle_bin_dir(),
        )
        .with_probe(Arc::new(AudiobookProcessor::new(config.converter.clone())))
        .with_ebook_converter(
            EbookConverter::new(config.converter.clone()),
            config.paths.downloads_dir.join(".librarr-convert"),
        );
        info!(operation = %config.import.operation, "Import pipeline initialized");

        let acquirer = Acquirer::new(
            store,
            Arc::new(indexers),
            clients,
            Arc::new(importer),
            AcquireSettings::from_config(&config),
        );
        Ok(Self::new(config, Arc::new(acquirer)))
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn acquirer(&self) -> &Acquirer {
        &self.acquirer
    }

    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        self.acquirer.store()
    }

    pub fn importer(&self) -> &Importer {
        self.acquirer.importer()
    }

    /// Root the import scanner lists pending content from.
    pub fn staging_dir(&self) -> &Path {
        &self.config.paths.downloads_dir
    }
}
