//! Application context: one store, one schema registry, one lock registry.
//!
//! Every repository handed out by an [`AppContext`] shares the same
//! [`CollectionLocks`], which is what makes concurrent writes from different
//! parts of the app safe.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::config::{StorageBackend, StoreConfig};
use crate::entities::{
    FoodItemRepository, HealthRecordRepository, MealRepository, MedicationRepository,
    PetRepository, TaskRepository, User, UserRepository,
};
use crate::entity::Entity;
use crate::error::{Result, StoreError};
use crate::memory::MemoryStore;
use crate::migration::{MigrationReport, MigrationRunner};
use crate::remote::{
    ensure_profile_row, ensure_remote_schema, RemoteBackend, RemoteMirror, RemoteSchema,
    RemoteSchemaReport, Session, SupabaseBackend,
};
use crate::repository::{CollectionLocks, Repository};
use crate::sqlite::SqliteStore;
use crate::store::KeyValueStore;
use crate::validation::SchemaRegistry;

pub struct AppContext {
    config: StoreConfig,
    store: Arc<dyn KeyValueStore>,
    schemas: Arc<SchemaRegistry>,
    locks: Arc<CollectionLocks>,
    remote: Option<Arc<dyn RemoteBackend>>,
    mirror: RwLock<Option<RemoteMirror>>,
    session: RwLock<Option<Session>>,
    migrations: MigrationReport,
}

impl AppContext {
    /// Open the configured store and run pending migrations.
    ///
    /// Opening the store is bounded by the bootstrap timeout. Migrations are
    /// bounded too, and a failed or timed-out migration does not fail startup;
    /// see [`AppContext::migration_report`].
    pub async fn init(config: StoreConfig) -> Result<Self> {
        let store = open_store(&config).await?;
        let remote = match &config.remote {
            Some(remote) => {
                let backend: Arc<dyn RemoteBackend> = Arc::new(SupabaseBackend::new(remote)?);
                Some(backend)
            }
            None => None,
        };
        Self::with_parts(config, store, remote).await
    }

    /// Build a context over an already opened store and optional backend.
    pub async fn with_parts(
        config: StoreConfig,
        store: Arc<dyn KeyValueStore>,
        remote: Option<Arc<dyn RemoteBackend>>,
    ) -> Result<Self> {
        let timeout = config.init_timeout();
        let runner = MigrationRunner::with_builtin(Arc::clone(&store))
            .with_max_attempts(config.migrations.max_attempts);
        let migrations = match tokio::time::timeout(timeout, runner.run()).await {
            Ok(report) => report,
            Err(_) => {
                warn!(?timeout, "Migrations timed out; continuing startup");
                MigrationReport {
                    error: Some(StoreError::Timeout(timeout).to_string()),
                    ..MigrationReport::default()
                }
            }
        };

        let state = AppState::new(Arc::clone(&store));
        if !state.is_initialized().await? {
            state.mark_initialized().await?;
            info!("Local store initialized");
        }

        Ok(Self {
            config,
            store,
            schemas: Arc::new(SchemaRegistry::with_defaults()),
            locks: Arc::new(CollectionLocks::new()),
            remote,
            mirror: RwLock::new(None),
            session: RwLock::new(None),
            migrations,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Outcome of the migrations run during startup.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migrations
    }

    /// A runner over this context's store, for status queries or a manual retry.
    pub fn migrations(&self) -> MigrationRunner {
        MigrationRunner::with_builtin(Arc::clone(&self.store))
            .with_max_attempts(self.config.migrations.max_attempts)
    }

    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Generic repository for `E`, mirrored when a user is signed in.
    pub fn repository<E: Entity>(&self) -> Repository<E> {
        let repo = Repository::new(
            Arc::clone(&self.store),
            Arc::clone(&self.schemas),
            Arc::clone(&self.locks),
        );
        match self.mirror.read().clone() {
            Some(mirror) => repo.with_mirror(mirror),
            None => repo,
        }
    }

    pub fn pets(&self) -> PetRepository {
        PetRepository::new(self.repository())
    }

    pub fn tasks(&self) -> TaskRepository {
        TaskRepository::new(self.repository())
    }

    pub fn health_records(&self) -> HealthRecordRepository {
        HealthRecordRepository::new(self.repository())
    }

    pub fn medications(&self) -> MedicationRepository {
        MedicationRepository::new(self.repository())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.repository())
    }

    pub fn meals(&self) -> MealRepository {
        MealRepository::new(self.repository())
    }

    pub fn food_items(&self) -> FoodItemRepository {
        FoodItemRepository::new(self.repository())
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(Arc::clone(&self.store))
    }

    /// Record the signed-in user locally and start mirroring writes.
    ///
    /// With a backend configured, the remote tables are checked and the
    /// user's profile row is upserted. Remote problems are logged; only a
    /// local failure is returned as an error. The schema report is `None`
    /// without a backend or when the check timed out.
    pub async fn sign_in(&self, session: Session) -> Result<Option<RemoteSchemaReport>> {
        let users = self.users();
        if !users.exists(&session.user_id).await? {
            users
                .create(User::new(&session.user_id, &session.email))
                .await?;
        }
        *self.session.write() = Some(session.clone());

        let Some(remote) = &self.remote else {
            return Ok(None);
        };
        remote.set_session(Some(&session));

        let timeout = self.config.init_timeout();
        let schema = RemoteSchema::default();
        let report =
            match tokio::time::timeout(timeout, ensure_remote_schema(remote.as_ref(), &schema))
                .await
            {
                Ok(report) => Some(report),
                Err(_) => {
                    warn!(?timeout, "Remote schema check timed out");
                    None
                }
            };

        if let Err(e) = ensure_profile_row(remote.as_ref(), &session).await {
            warn!(error = %e, "Could not ensure remote profile row");
        }

        *self.mirror.write() = Some(RemoteMirror::new(
            Arc::clone(remote),
            Some(session.user_id.clone()),
        ));
        info!(user_id = %session.user_id, "Signed in; remote mirroring enabled");
        Ok(report)
    }

    /// Stop mirroring and forget the session. Local data stays.
    pub fn sign_out(&self) {
        if let Some(remote) = &self.remote {
            remote.set_session(None);
        }
        *self.mirror.write() = None;
        *self.session.write() = None;
        info!("Signed out");
    }

    /// Close the underlying store.
    pub async fn shutdown(&self) -> Result<()> {
        self.store.close().await
    }
}

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sqlite => {
            let timeout = config.init_timeout();
            let store = tokio::time::timeout(timeout, SqliteStore::open(&config.storage.path))
                .await
                .map_err(|_| StoreError::Timeout(timeout))??;
            Ok(Arc::new(store))
        }
    }
}
