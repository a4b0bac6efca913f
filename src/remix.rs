use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::api::RemixRequest;
use crate::data::RemixService;
use crate::error::FeedError;

/// Receives remix requests from the feed controller. Must not block.
pub trait RemixHandler {
    fn submit(&self, request: RemixRequest);
}

/// Result of the remix prompt the user was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Cancel,
    Submit(String),
}

/// Text input state for the remix prompt of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemixPrompt {
    entry_id: String,
    input: String,
}

impl RemixPrompt {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            input: String::new(),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn push(&mut self, ch: char) {
        if !ch.is_control() {
            self.input.push(ch);
        }
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    pub fn submit(self) -> PromptOutcome {
        PromptOutcome::Submit(self.input)
    }

    pub fn cancel(self) -> PromptOutcome {
        PromptOutcome::Cancel
    }
}

#[derive(Debug)]
pub enum RemixEvent {
    Submitted { video_id: String },
    Failed(FeedError),
}

/// Runs remix submissions on a background worker so the UI never waits on
/// the remix endpoint.
pub struct RemixDispatcher {
    jobs: Option<Sender<RemixRequest>>,
    events: Receiver<RemixEvent>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RemixDispatcher {
    pub fn new(service: Arc<dyn RemixService>) -> Self {
        let (job_tx, job_rx) = unbounded::<RemixRequest>();
        let (event_tx, event_rx) = unbounded();

        let handle = thread::spawn(move || worker(service, job_rx, event_tx));

        Self {
            jobs: Some(job_tx),
            events: event_rx,
            handle: Some(handle),
        }
    }

    pub fn try_event(&self) -> Option<RemixEvent> {
        self.events.try_recv().ok()
    }

    pub fn events(&self) -> &Receiver<RemixEvent> {
        &self.events
    }

    fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl RemixHandler for RemixDispatcher {
    fn submit(&self, request: RemixRequest) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        if jobs.send(request).is_err() {
            tracing::warn!("remix worker stopped; request dropped");
        }
    }
}

impl Drop for RemixDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(
    service: Arc<dyn RemixService>,
    jobs: Receiver<RemixRequest>,
    events: Sender<RemixEvent>,
) {
    for request in jobs.iter() {
        let event = match service.submit_remix(&request) {
            Ok(()) => {
                tracing::info!(video_id = %request.video_id, "remix submitted");
                RemixEvent::Submitted {
                    video_id: request.video_id,
                }
            }
            Err(err) => {
                tracing::warn!(video_id = %request.video_id, error = %format!("{err:#}"), "remix submission failed");
                RemixEvent::Failed(FeedError::RemixSubmission {
                    video_id: request.video_id,
                    reason: err,
                })
            }
        };
        let _ = events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingService {
        requests: Mutex<Vec<RemixRequest>>,
        fail: bool,
    }

    impl RemixService for RecordingService {
        fn submit_remix(&self, request: &RemixRequest) -> anyhow::Result<()> {
            self.requests.lock().push(request.clone());
            if self.fail {
                return Err(anyhow!("remix endpoint unavailable"));
            }
            Ok(())
        }
    }

    #[test]
    fn prompt_collects_text_and_ignores_control_chars() {
        let mut prompt = RemixPrompt::new("1");
        for ch in "make it bluee".chars() {
            prompt.push(ch);
        }
        prompt.push('\u{7}');
        prompt.backspace();
        assert_eq!(prompt.entry_id(), "1");
        assert_eq!(prompt.input(), "make it blue");
        assert_eq!(
            prompt.submit(),
            PromptOutcome::Submit("make it blue".into())
        );
    }

    #[test]
    fn dispatcher_forwards_each_request_once() {
        let service = Arc::new(RecordingService::default());
        let dispatcher = RemixDispatcher::new(service.clone());
        dispatcher.submit(RemixRequest {
            video_id: "1".into(),
            prompt: "make it blue".into(),
        });

        let event = dispatcher
            .events()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(matches!(event, RemixEvent::Submitted { ref video_id } if video_id == "1"));
        drop(dispatcher);

        let requests = service.requests.lock();
        assert_eq!(
            *requests,
            vec![RemixRequest {
                video_id: "1".into(),
                prompt: "make it blue".into(),
            }]
        );
    }

    #[test]
    fn dispatcher_reports_failures() {
        let service = Arc::new(RecordingService {
            fail: true,
            ..RecordingService::default()
        });
        let dispatcher = RemixDispatcher::new(service);
        dispatcher.submit(RemixRequest {
            video_id: "9".into(),
            prompt: "noir".into(),
        });

        match dispatcher
            .events()
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
        {
            RemixEvent::Failed(FeedError::RemixSubmission { video_id, .. }) => {
                assert_eq!(video_id, "9")
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
