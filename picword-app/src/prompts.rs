//! Prompts shown over the tiles, shared between the engine thread and the
//! window.

use crate::engine::UserEvent;
use picword_experiment::{DialogHost, Prompt, PromptHandle, PromptKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use winit::event_loop::EventLoopProxy;

/// Open prompts, newest last. Only the newest is drawn and dismissed.
#[derive(Debug, Default)]
pub struct PromptStack {
    open: Vec<(Prompt, oneshot::Sender<()>)>,
}

impl PromptStack {
    pub fn push(&mut self, prompt: Prompt) -> PromptHandle {
        let (handle, closed) = PromptHandle::new(prompt.kind);
        self.open.push((prompt, closed));
        handle
    }

    pub fn top(&self) -> Option<&Prompt> {
        self.open.last().map(|(prompt, _)| prompt)
    }

    /// Closes the newest prompt as dismissed by the participant.
    pub fn dismiss_top(&mut self) -> Option<PromptKind> {
        let (prompt, closed) = self.open.pop()?;
        let _ = closed.send(());
        Some(prompt.kind)
    }

    /// Closes every prompt of `kind`, or all of them for `None`.
    pub fn close(&mut self, kind: Option<PromptKind>) {
        self.open
            .retain(|(prompt, _)| kind.is_some_and(|kind| kind != prompt.kind));
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }
}

pub fn lock(stack: &Mutex<PromptStack>) -> MutexGuard<'_, PromptStack> {
    stack.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dialog host backed by the window: prompts are drawn by the render loop
/// and dismissed with the space bar.
pub struct WindowPrompts {
    stack: Arc<Mutex<PromptStack>>,
    proxy: EventLoopProxy<UserEvent>,
}

impl WindowPrompts {
    pub fn new(stack: Arc<Mutex<PromptStack>>, proxy: EventLoopProxy<UserEvent>) -> Self {
        Self { stack, proxy }
    }

    fn changed(&self) {
        let _ = self.proxy.send_event(UserEvent::PromptsChanged);
    }
}

impl DialogHost for WindowPrompts {
    fn open(&mut self, prompt: Prompt) -> PromptHandle {
        let handle = lock(&self.stack).push(prompt);
        self.changed();
        handle
    }

    fn close(&mut self, kind: Option<PromptKind>) {
        lock(&self.stack).close(kind);
        self.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dismissing_resolves_the_newest_handle() {
        let mut stack = PromptStack::default();
        let _ready = stack.push(Prompt::ready());
        let mut rest = stack.push(Prompt::rest("Escape|Escape|Escape"));
        assert_eq!(stack.top().map(|p| p.kind), Some(PromptKind::Break));

        assert_eq!(stack.dismiss_top(), Some(PromptKind::Break));
        rest.closed().await;
        assert_eq!(stack.top().map(|p| p.kind), Some(PromptKind::Ready));
    }

    #[tokio::test]
    async fn closing_by_kind_keeps_the_others() {
        let mut stack = PromptStack::default();
        let mut ready = stack.push(Prompt::ready());
        let _finish = stack.push(Prompt::finish());

        stack.close(Some(PromptKind::Ready));
        ready.closed().await;
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top().map(|p| p.kind), Some(PromptKind::Finish));

        stack.close(None);
        assert_eq!(stack.len(), 0);
        assert_eq!(stack.dismiss_top(), None);
    }
}
