use crate::app::Cmd;
use crate::fallback;
use crate::llm::{ReplySource, Responder};
use crate::reply::GameContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One in-flight reply. Settlement is reported as `Cmd::ReplySettled`; the
/// engine never waits on it.
pub(crate) struct ReplyTask {
    id: u64,
    handle: Option<JoinHandle<()>>,
}

impl ReplyTask {
    pub(crate) fn spawn(
        id: u64,
        responder: Arc<Responder>,
        ctx: GameContext,
        variety: u64,
        budget: Duration,
        tx: mpsc::Sender<Cmd>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let (reply, source) =
                match tokio::time::timeout(budget, responder.respond(&ctx, variety)).await {
                    Ok(done) => done,
                    Err(_) => {
                        log::warn!("reply took longer than {budget:?}, using fallback");
                        (fallback::reply(&ctx, variety), ReplySource::Fallback)
                    }
                };
            tx.send(Cmd::ReplySettled { id, reply, source }).await.ok();
        });
        Self {
            id,
            handle: Some(handle),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub(crate) fn settle(&mut self) {
        self.handle = None;
    }

    /// Abandon the reply. Safe at any point: the task only ever sends a
    /// message, it never touches the pet.
    pub(crate) fn cancel(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

impl Drop for ReplyTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
