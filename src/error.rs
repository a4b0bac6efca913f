#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("failed to load feed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("playback failed for {entry_id}: {message}")]
    Playback { entry_id: String, message: String },
    #[error("remix submission for {video_id} failed: {reason:#}")]
    RemixSubmission {
        video_id: String,
        reason: anyhow::Error,
    },
}
