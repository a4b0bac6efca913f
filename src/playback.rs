//! Per-cell playback synchronisation.
//!
//! A [`VideoCell`] owns one [`PlaybackHandle`] and keeps it in step with the
//! `is_active` flag handed down by the feed controller.
//!
//! ```text
//! mount                                 -> Stopped
//! Stopped  + active, handle ready       -> Playing   (play)
//! Stopped  + active, handle not ready   -> Stopped   (pending play)
//! Stopped  + Ready, pending play        -> Playing   (play)
//! Playing  + inactive                   -> Stopped   (pause)
//! Stopped  + inactive                   -> Stopped   (pending play dropped)
//! Playing  + end of media               -> Playing   (restart from 0)
//! Stopped  + end of media               -> Stopped   (next start restarts from 0)
//! any      + load failure               -> Stopped   (no retry)
//! unmount                               -> handle released, no further events
//! ```

use anyhow::Result;

use crate::error::FeedError;
use crate::model::VideoEntry;
use crate::remix::RemixPrompt;

/// Something the media player reported on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleEvent {
    Ready,
    Ended,
    Failed(String),
}

/// A native media player instance owned by exactly one cell.
pub trait PlaybackHandle {
    /// Media is loaded and `play` will take effect.
    fn is_ready(&self) -> bool;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    /// Seek to position zero and keep playing.
    fn restart(&mut self) -> Result<()>;
    fn try_event(&mut self) -> Option<HandleEvent>;
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Stopped,
    Playing,
}

#[derive(Debug)]
pub enum CellEvent {
    Started,
    Stopped,
    Looped,
    Failed(FeedError),
}

/// Read-only snapshot used for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellView {
    pub state: CellState,
    pub loading: bool,
    pub failure: Option<String>,
}

pub struct VideoCell<H: PlaybackHandle> {
    entry_id: String,
    handle: Option<H>,
    state: CellState,
    active: bool,
    pending_play: bool,
    at_end: bool,
    failure: Option<String>,
}

impl<H: PlaybackHandle> VideoCell<H> {
    pub fn mount(entry: &VideoEntry, handle: H) -> Self {
        tracing::debug!(entry_id = %entry.id, "cell mounted");
        Self {
            entry_id: entry.id.clone(),
            handle: Some(handle),
            state: CellState::Stopped,
            active: false,
            pending_play: false,
            at_end: false,
            failure: None,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn has_pending_play(&self) -> bool {
        self.pending_play
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn view(&self) -> CellView {
        let loading = self.failure.is_none()
            && self
                .handle
                .as_ref()
                .map(|handle| !handle.is_ready())
                .unwrap_or(false);
        CellView {
            state: self.state,
            loading,
            failure: self.failure.clone(),
        }
    }

    /// Applies the externally supplied active flag.
    pub fn set_active(&mut self, active: bool) -> Option<CellEvent> {
        self.handle.as_ref()?;
        self.active = active;

        if !active {
            self.pending_play = false;
            return self.stop();
        }

        if self.state == CellState::Playing || self.failure.is_some() {
            return None;
        }
        let ready = self.handle.as_ref().map(|h| h.is_ready()).unwrap_or(false);
        if ready {
            self.start()
        } else {
            tracing::debug!(entry_id = %self.entry_id, "handle not ready; deferring play");
            self.pending_play = true;
            None
        }
    }

    /// Drains events reported by the handle and reacts to them.
    pub fn pump(&mut self) -> Vec<CellEvent> {
        let mut events = Vec::new();
        loop {
            let Some(handle) = self.handle.as_mut() else {
                break;
            };
            let Some(event) = handle.try_event() else {
                break;
            };
            if let Some(update) = self.on_handle_event(event) {
                events.push(update);
            }
        }
        events
    }

    pub fn on_remix_tap(&self) -> RemixPrompt {
        RemixPrompt::new(self.entry_id.clone())
    }

    /// Releases the handle. Nothing is issued against it afterward.
    pub fn unmount(mut self) {
        self.release_handle();
    }

    fn on_handle_event(&mut self, event: HandleEvent) -> Option<CellEvent> {
        match event {
            HandleEvent::Ready => {
                if !self.pending_play {
                    return None;
                }
                self.pending_play = false;
                if self.active && self.state == CellState::Stopped && self.failure.is_none() {
                    self.start()
                } else {
                    None
                }
            }
            HandleEvent::Ended => {
                if self.state != CellState::Playing {
                    self.at_end = self.failure.is_none();
                    return None;
                }
                let handle = self.handle.as_mut()?;
                match handle.restart() {
                    Ok(()) => Some(CellEvent::Looped),
                    Err(err) => Some(self.fail(format!("{err:#}"))),
                }
            }
            HandleEvent::Failed(message) => Some(self.fail(message)),
        }
    }

    fn start(&mut self) -> Option<CellEvent> {
        let handle = self.handle.as_mut()?;
        // A paused player parked on its last frame stays there on unpause.
        let result = if self.at_end {
            handle.restart()
        } else {
            handle.play()
        };
        self.at_end = false;
        match result {
            Ok(()) => {
                self.state = CellState::Playing;
                tracing::debug!(entry_id = %self.entry_id, "playing");
                Some(CellEvent::Started)
            }
            Err(err) => Some(self.fail(format!("{err:#}"))),
        }
    }

    fn stop(&mut self) -> Option<CellEvent> {
        if self.state != CellState::Playing {
            return None;
        }
        self.state = CellState::Stopped;
        if let Some(handle) = self.handle.as_mut() {
            if let Err(err) = handle.pause() {
                tracing::warn!(entry_id = %self.entry_id, error = %format!("{err:#}"), "pause failed");
            }
        }
        tracing::debug!(entry_id = %self.entry_id, "stopped");
        Some(CellEvent::Stopped)
    }

    fn fail(&mut self, message: String) -> CellEvent {
        tracing::warn!(entry_id = %self.entry_id, %message, "playback failed");
        self.pending_play = false;
        self.state = CellState::Stopped;
        self.failure = Some(message.clone());
        CellEvent::Failed(FeedError::Playback {
            entry_id: self.entry_id.clone(),
            message,
        })
    }

    fn release_handle(&mut self) {
        self.pending_play = false;
        if let Some(mut handle) = self.handle.take() {
            handle.release();
            tracing::debug!(entry_id = %self.entry_id, "cell unmounted");
        }
    }
}

impl<H: PlaybackHandle> Drop for VideoCell<H> {
    fn drop(&mut self) {
        self.release_handle();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Command {
        Play,
        Pause,
        Restart,
        Release,
    }

    #[derive(Default)]
    pub struct Script {
        pub ready: bool,
        pub events: VecDeque<HandleEvent>,
        pub commands: Vec<Command>,
        pub fail_play: bool,
    }

    /// Handle whose readiness and events are driven by the test.
    #[derive(Clone, Default)]
    pub struct FakeHandle(pub Rc<RefCell<Script>>);

    impl FakeHandle {
        pub fn ready() -> Self {
            let handle = Self::default();
            handle.0.borrow_mut().ready = true;
            handle
        }

        pub fn become_ready(&self) {
            let mut script = self.0.borrow_mut();
            script.ready = true;
            script.events.push_back(HandleEvent::Ready);
        }

        pub fn emit(&self, event: HandleEvent) {
            self.0.borrow_mut().events.push_back(event);
        }

        pub fn commands(&self) -> Vec<Command> {
            self.0.borrow().commands.clone()
        }

        pub fn count(&self, command: Command) -> usize {
            self.0
                .borrow()
                .commands
                .iter()
                .filter(|c| **c == command)
                .count()
        }
    }

    impl PlaybackHandle for FakeHandle {
        fn is_ready(&self) -> bool {
            self.0.borrow().ready
        }

        fn play(&mut self) -> Result<()> {
            let mut script = self.0.borrow_mut();
            script.commands.push(Command::Play);
            if script.fail_play {
                anyhow::bail!("decoder rejected stream");
            }
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            self.0.borrow_mut().commands.push(Command::Pause);
            Ok(())
        }

        fn restart(&mut self) -> Result<()> {
            self.0.borrow_mut().commands.push(Command::Restart);
            Ok(())
        }

        fn try_event(&mut self) -> Option<HandleEvent> {
            self.0.borrow_mut().events.pop_front()
        }

        fn release(&mut self) {
            self.0.borrow_mut().commands.push(Command::Release);
        }
    }

    pub fn entry(id: &str) -> VideoEntry {
        VideoEntry {
            id: id.into(),
            video_url: format!("https://v.test/{id}.mp4"),
            username: None,
            description: None,
            like_count: None,
            comment_count: None,
        }
    }
}
