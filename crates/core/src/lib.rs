pub mod acquire;
pub mod config;
pub mod converter;
pub mod download_client;
pub mod indexer;
pub mod library;
pub mod metrics;
pub mod quality;
pub mod store;
pub mod testing;

pub use acquire::{AcquireError, AcquireOutcome, AcquireSettings, Acquirer};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DownloadClientConfig,
    DownloadClientKind, IndexerConfig, IndexerKind, Protocol, SanitizedConfig,
};
pub use converter::{AudiobookProcessor, ConverterConfig, ConverterError, EbookConverter, MediaProbe};
pub use download_client::{
    create_download_client, create_download_clients, AddDownloadRequest, DownloadClient,
    DownloadClientError,
};
pub use indexer::{Indexer, IndexerError, IndexerManager, SearchOutcome, SearchQuery, SearchResult};
pub use library::{
    FileOperator, ImportError, ImportOperation, ImportOutcome, ImportRequest, Importer, MediaType,
    PathBuilder,
};
pub use quality::QualityProfile;
pub use store::{
    Book, BookStatus, Download, DownloadStatus, LibraryStore, MediaFile, MemoryStore, SqliteStore,
    StoreError,
};
