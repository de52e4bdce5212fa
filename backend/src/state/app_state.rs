//! Shared application state
//!
//! Holds the gateway instances. They are built once from [`Config`] at
//! startup and handed to handlers through axum's `State` extractor.

use crate::config::Config;
use crate::gateway::{
    CompletionGateway, DataGateway, OpenAiGateway, PostgrestGateway, SqliteGateway,
    SupabaseStorage, UnconfiguredUploads, UploadGateway,
};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Main application state
#[derive(Clone)]
pub struct AppState {
    /// Experts, sessions and messages
    pub data: Arc<dyn DataGateway>,
    /// Text generation
    pub completion: Arc<dyn CompletionGateway>,
    /// Attachment storage
    pub uploads: Arc<dyn UploadGateway>,
    /// Largest accepted attachment, in bytes
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Assemble state from already constructed gateways
    pub fn new(
        data: Arc<dyn DataGateway>,
        completion: Arc<dyn CompletionGateway>,
        uploads: Arc<dyn UploadGateway>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            data,
            completion,
            uploads,
            max_upload_bytes,
        }
    }

    /// Build every gateway from configuration
    ///
    /// With Supabase credentials the hosted REST store and Storage bucket are
    /// used; otherwise a local SQLite database and no attachment storage.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        // Shared HTTP client (connection pooling)
        let http = reqwest::Client::builder()
            .user_agent(concat!("botchat-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let (data, uploads): (Arc<dyn DataGateway>, Arc<dyn UploadGateway>) =
            match &config.supabase {
                Some(supabase) => {
                    info!(url = %supabase.url, "Using Supabase data and storage gateways");
                    (
                        Arc::new(PostgrestGateway::new(
                            http.clone(),
                            &supabase.url,
                            &supabase.service_role_key,
                        )),
                        Arc::new(SupabaseStorage::new(
                            http.clone(),
                            &supabase.url,
                            &supabase.service_role_key,
                            &config.uploads.bucket,
                            config.uploads.max_bytes,
                        )),
                    )
                }
                None => {
                    info!(
                        path = %config.persistence.database_path,
                        "Using local SQLite data gateway"
                    );
                    warn!("Attachment storage is not configured; uploads will be rejected");
                    (
                        Arc::new(SqliteGateway::new(&config.persistence.database_path).await?),
                        Arc::new(UnconfiguredUploads),
                    )
                }
            };

        if config.openai.api_key.is_empty() {
            warn!("OPENAI_API_KEY is not set; chat completions will fail");
        }
        let completion = Arc::new(OpenAiGateway::new(
            http,
            &config.openai.api_key,
            &config.openai.model,
            &config.openai.base_url,
        ));

        Ok(Self::new(data, completion, uploads, config.uploads.max_bytes))
    }

    /// A reconciler driving these gateways
    pub fn reconciler(&self, config: ReconcilerConfig) -> Reconciler {
        Reconciler::new(
            self.data.clone(),
            self.completion.clone(),
            self.uploads.clone(),
            config,
        )
    }
}
