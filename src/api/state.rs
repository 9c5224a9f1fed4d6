use crate::api::models::AppError;
use crate::config::StoreConfig;
use crate::storage::{self, Collection, Credentials, DocumentStore, StoreError};
use std::sync::Arc;
use tracing::{error, info};

/// Handles shared by every request.
///
/// Built once at startup and torn down at shutdown. Either handle may be
/// missing when the store could not be reached; requests that need the
/// collection then fail with a 500.
#[derive(Clone, Default)]
pub struct AppState {
    pub store: Option<Arc<dyn DocumentStore>>,
    pub reviews: Option<Arc<dyn Collection>>,
}

impl AppState {
    /// Authenticate, open the store and acquire the reviews collection.
    ///
    /// Failures are logged and leave the handles unset; startup carries on.
    pub async fn connect(config: &StoreConfig) -> Self {
        match open(config).await {
            Ok(state) => {
                info!(collection = %config.collection, "Document store initialized");
                state
            }
            Err(e) => {
                error!(error = %e, "Error initializing document store");
                Self::default()
            }
        }
    }

    /// State over an already opened store
    pub async fn with_collection(
        store: Arc<dyn DocumentStore>,
        collection: &str,
    ) -> Result<Self, StoreError> {
        let reviews = store.collection(collection).await?;
        Ok(Self {
            store: Some(store),
            reviews: Some(reviews),
        })
    }

    /// The reviews collection, or an internal error when startup failed
    pub fn reviews(&self) -> Result<&Arc<dyn Collection>, AppError> {
        self.reviews
            .as_ref()
            .ok_or_else(|| AppError::Internal("Review store is not available".to_string()))
    }

    /// Release the store client. Errors are logged, never returned.
    pub async fn shutdown(self) {
        let Some(store) = self.store else {
            return;
        };

        info!("Closing document store client...");
        match store.close().await {
            Ok(()) => info!("Document store client closed"),
            Err(e) => error!(error = %e, "Error closing document store client"),
        }
    }
}

async fn open(config: &StoreConfig) -> Result<AppState, StoreError> {
    let credentials = Credentials::load(&config.credentials_path).await?;
    info!(
        project_id = %credentials.project_id,
        client_email = credentials.client_email.as_deref().unwrap_or("-"),
        "Loaded store credentials"
    );

    let store = storage::connect(&config.database_url, &config.database_id).await?;
    AppState::with_collection(store, &config.collection).await
}
