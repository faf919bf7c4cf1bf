use anyhow::Result;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;

use crate::config::{RiderStateConfig, StorageConfig};
#[cfg(feature = "database")]
use crate::database::SqliteStateStore;
use crate::gateways::{
    ChangeNotifier, JsonFileStateStore, JsonLinesDeadLetterSink, JsonLinesNotifier,
    LocationValidator, LogNotifier, StateStore,
};
use crate::lifecycle::{EntityStateRecord, Gateways, Orchestrator};

pub mod batch;
pub mod config;
pub mod inspect;
pub mod table;
pub mod transition;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<ExitCode>;
}

/// Where rider records live for this invocation
#[derive(Clone)]
pub enum RecordStore {
    File(Arc<JsonFileStateStore>),
    #[cfg(feature = "database")]
    Sqlite(Arc<SqliteStateStore>),
}

impl RecordStore {
    pub async fn open(storage: &StorageConfig) -> Result<Self> {
        if let Some(url) = &storage.database_url {
            #[cfg(feature = "database")]
            {
                tracing::info!("Using SQLite state store at {}", url);
                return Ok(RecordStore::Sqlite(Arc::new(SqliteStateStore::new(url).await?)));
            }
            #[cfg(not(feature = "database"))]
            tracing::warn!(
                database_url = %url,
                "database_url is set but the database feature is not enabled; using the state file"
            );
        }

        Ok(RecordStore::File(Arc::new(JsonFileStateStore::new(
            &storage.state_file,
        ))))
    }

    pub fn as_state_store(&self) -> Arc<dyn StateStore> {
        match self {
            RecordStore::File(store) => store.clone(),
            #[cfg(feature = "database")]
            RecordStore::Sqlite(store) => store.clone(),
        }
    }

    pub async fn put(&self, record: EntityStateRecord) -> Result<()> {
        match self {
            RecordStore::File(store) => store.put(record).await?,
            #[cfg(feature = "database")]
            RecordStore::Sqlite(store) => store.put(&record).await?,
        }
        Ok(())
    }

    pub async fn get(&self, entity_id: &str) -> Result<Option<EntityStateRecord>> {
        Ok(self.as_state_store().get(entity_id).await?)
    }

    /// Release the store before the command exits
    pub async fn close(&self) {
        match self {
            RecordStore::File(_) => {}
            #[cfg(feature = "database")]
            RecordStore::Sqlite(store) => store.shutdown().await,
        }
    }
}

/// Wire the local gateway adapters described by `config` around `store`
pub fn build_orchestrator(config: &RiderStateConfig, store: &RecordStore) -> Result<Orchestrator> {
    let notifier: Arc<dyn ChangeNotifier> = if config.storage.events_file.trim().is_empty() {
        Arc::new(LogNotifier)
    } else {
        Arc::new(JsonLinesNotifier::new(&config.storage.events_file))
    };

    let gateways = Gateways {
        store: store.as_state_store(),
        validator: Arc::new(LocationValidator::new()),
        notifier,
        dead_letter: Arc::new(JsonLinesDeadLetterSink::new(
            &config.storage.dead_letter_file,
        )),
    };

    Ok(Orchestrator::new(gateways, config.orchestrator_settings()?))
}

/// One compact JSON document per line on stdout
pub fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
