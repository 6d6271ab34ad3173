//! Wires the REST gateway, the job store and the live channel together.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use vr180_core::{JobId, JobStore, LiveMessage, StoreEvent};

use crate::api::ApiClient;
use crate::error::GatewayError;
use crate::live::WsLiveChannel;
use crate::reconnect::ReconnectConfig;
use crate::upload::{upload_and_create, UploadError, TransferProgress};

/// A signed-in user's view of their conversion jobs.
pub struct Dashboard {
    api: ApiClient,
    store: JobStore<WsLiveChannel>,
    live_rx: mpsc::UnboundedReceiver<LiveMessage>,
}

impl Dashboard {
    /// Build a dashboard whose live subscriptions retry as configured in
    /// the client config.
    pub fn new(api: ApiClient) -> Self {
        let reconnect =
            ReconnectConfig::default().with_max_attempts(api.config().live_reconnect_attempts);
        Self::with_reconnect(api, reconnect)
    }

    pub fn with_reconnect(api: ApiClient, reconnect: ReconnectConfig) -> Self {
        let config = Arc::new(api.config().clone());
        let (channel, live_rx) = WsLiveChannel::new(config, reconnect);
        Self {
            api,
            store: JobStore::new(channel),
            live_rx,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &JobStore<WsLiveChannel> {
        &self.store
    }

    /// Receive every change made to the store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    /// Replace the job list with the backend's. Returns the job count.
    pub async fn refresh(&mut self) -> Result<usize, GatewayError> {
        let snapshot = self.api.list_jobs().await?;
        self.store.replace_all(snapshot.jobs, snapshot.captured_at);
        Ok(self.store.len())
    }

    /// Upload a video, start its conversion and add the new job to the
    /// top of the list. On failure the store is left untouched.
    pub async fn upload<F>(&mut self, path: &Path, on_progress: F) -> Result<JobId, UploadError>
    where
        F: Fn(TransferProgress) + Send + Sync + 'static,
    {
        let job = upload_and_create(&self.api, path, on_progress).await?;
        let id = job.id.clone();
        self.store.insert_created(job, Utc::now());
        Ok(id)
    }

    /// Apply the next live message. Returns `false` once the live stream
    /// has ended.
    pub async fn next_event(&mut self) -> bool {
        match self.live_rx.recv().await {
            Some(message) => {
                self.store.handle_live_message(message);
                true
            }
            None => false,
        }
    }

    /// No job is being watched any more.
    pub fn is_settled(&self) -> bool {
        self.store.subscription_count() == 0
    }

    /// Apply live messages until every subscription has ended.
    pub async fn watch_until_settled(&mut self) {
        while !self.is_settled() {
            if !self.next_event().await {
                break;
            }
        }
    }

    /// Close every live subscription.
    pub fn shutdown(&mut self) {
        self.store.close_all();
        self.store.channel().shutdown();
    }
}
