pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::config::Config;
use crate::database::{ExamStore, MemoryStore};
use crate::services::{
    answer_service::AnswerService,
    attempt_service::AttemptService,
    blob_service::{BlobStore, HttpBlobStore, NoopBlobStore},
    grading_service::GradingService,
    notification_service::{LogNotifier, NotificationSink, WebhookNotifier},
    test_service::TestService,
};
use crate::utils::time::{Clock, SystemClock};
use reqwest::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub storage_backend: &'static str,
    pub notifier: Arc<dyn NotificationSink>,
    pub test_service: TestService,
    pub attempt_service: AttemptService,
    pub answer_service: AnswerService,
    pub grading_service: GradingService,
}

impl AppState {
    /// Wires the services with the collaborators the config enables.
    pub fn new(
        config: Config,
        store: Arc<dyn ExamStore>,
        storage_backend: &'static str,
    ) -> crate::error::Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        let notifier: Arc<dyn NotificationSink> = match &config.notification_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(http_client.clone(), url.clone())),
            None => Arc::new(LogNotifier),
        };
        let blob: Arc<dyn BlobStore> = match HttpBlobStore::from_config(http_client, &config.blob) {
            Some(store) => Arc::new(store),
            None => Arc::new(NoopBlobStore),
        };

        Ok(Self::with_collaborators(
            config,
            store,
            storage_backend,
            Arc::new(SystemClock),
            notifier,
            blob,
        ))
    }

    pub fn with_collaborators(
        config: Config,
        store: Arc<dyn ExamStore>,
        storage_backend: &'static str,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
        blob: Arc<dyn BlobStore>,
    ) -> Self {
        let answer_window = chrono::Duration::minutes(config.answer_window_minutes);
        let test_service = TestService::new(store.clone());
        let attempt_service = AttemptService::new(store.clone());
        let answer_service = AnswerService::new(
            store.clone(),
            blob,
            answer_window,
            config.blob.host.clone(),
        );
        let grading_service = GradingService::new(store);

        Self {
            config: Arc::new(config),
            clock,
            storage_backend,
            notifier,
            test_service,
            attempt_service,
            answer_service,
            grading_service,
        }
    }

    /// In-memory state with no outbound collaborators, driven by the given clock.
    pub fn in_memory(config: Config, store: Arc<MemoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_collaborators(
            config,
            store,
            "memory",
            clock,
            Arc::new(LogNotifier),
            Arc::new(NoopBlobStore),
        )
    }
}
