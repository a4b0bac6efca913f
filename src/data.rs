use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::api::{self, RemixRequest};
use crate::model::{self, VideoEntry};

pub trait FeedService: Send + Sync {
    fn load_feed(&self) -> Result<Vec<VideoEntry>>;
}

pub trait RemixService: Send + Sync {
    fn submit_remix(&self, request: &RemixRequest) -> Result<()>;
}

pub struct ApiFeedService {
    client: Arc<api::Client>,
    page_size: usize,
}

impl ApiFeedService {
    pub fn new(client: Arc<api::Client>, page_size: usize) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }
}

impl FeedService for ApiFeedService {
    fn load_feed(&self) -> Result<Vec<VideoEntry>> {
        let items = self
            .client
            .feed(0, self.page_size)
            .context("fetch video feed")?;
        Ok(model::entries_from_items(items))
    }
}

pub struct ApiRemixService {
    client: Arc<api::Client>,
}

impl ApiRemixService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl RemixService for ApiRemixService {
    fn submit_remix(&self, request: &RemixRequest) -> Result<()> {
        self.client.remix(request).context("submit remix")
    }
}

#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn load_feed(&self) -> Result<Vec<VideoEntry>> {
        Ok(model::sample_entries())
    }
}

/// Accepts every remix and keeps the requests it was sent.
#[derive(Default)]
pub struct MockRemixService {
    accepted: Mutex<Vec<RemixRequest>>,
}

impl MockRemixService {
    pub fn accepted(&self) -> Vec<RemixRequest> {
        self.accepted.lock().clone()
    }
}

impl RemixService for MockRemixService {
    fn submit_remix(&self, request: &RemixRequest) -> Result<()> {
        tracing::info!(
            video_id = %request.video_id,
            prompt = %request.prompt,
            "remix accepted by mock service"
        );
        self.accepted.lock().push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_feed_serves_samples() {
        let entries = MockFeedService.load_feed().unwrap();
        assert_eq!(
            entries.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["1", "2"]
        );
    }

    #[test]
    fn mock_remix_records_requests() {
        let service = MockRemixService::default();
        let request = RemixRequest {
            video_id: "2".into(),
            prompt: "make it anime".into(),
        };
        service.submit_remix(&request).unwrap();
        assert_eq!(service.accepted(), vec![request]);
    }
}
