// Marshaling back onto the presentation layer's execution context
//
// Workers never touch UI state directly: every callback is wrapped in a
// `UiTask` and handed to `UiContext::dispatch`, which runs it on the single
// foreground context (a GUI event loop, or the CLI's main task).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Unit of work to run on the foreground context
pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// "Run this on the UI context" primitive provided by the presentation layer
pub trait UiContext: Send + Sync {
    fn dispatch(&self, task: UiTask);
}

/// Queue-backed context: tasks wait in a channel until [`UiLoop`] runs them
#[derive(Clone)]
pub struct ChannelUiContext {
    tx: mpsc::UnboundedSender<UiTask>,
}

impl ChannelUiContext {
    pub fn new() -> (Arc<Self>, UiLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), UiLoop { rx })
    }
}

impl UiContext for ChannelUiContext {
    fn dispatch(&self, task: UiTask) {
        // Receiver gone means the UI shut down; nothing left to update
        let _ = self.tx.send(task);
    }
}

/// Foreground side of [`ChannelUiContext`]
pub struct UiLoop {
    rx: mpsc::UnboundedReceiver<UiTask>,
}

impl UiLoop {
    /// Run everything queued so far; returns how many tasks ran
    pub fn drain_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Run queued tasks while `fut` makes progress, then flush the rest
    pub async fn run_until<F: Future>(&mut self, fut: F) -> F::Output {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                Some(task) = self.rx.recv() => task(),
                out = &mut fut => {
                    self.drain_pending();
                    return out;
                }
            }
        }
    }
}
