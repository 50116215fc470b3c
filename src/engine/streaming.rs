use crate::engine::Engine;
use tokio::sync::mpsc;
use tracing::{debug, trace};

impl Engine {
    /// Render the prompt, then render it again each time a segment that
    /// timed out finishes in the background.
    ///
    /// The first prompt is sent right away, placeholders included. The
    /// channel closes once no segment is pending or the receiver goes away.
    pub fn stream_primary(mut self) -> mpsc::Receiver<String> {
        let (prompts, receiver) = mpsc::channel(1);

        let (updates_tx, mut updates) = mpsc::channel(self.config().segment_count().max(1));
        self.scheduler.set_updates(Some(updates_tx));

        tokio::spawn(async move {
            let prompt = self.primary().await;

            // From here on only background tasks hold a sender.
            self.scheduler.set_updates(None);

            if prompts.send(prompt).await.is_err() {
                return;
            }

            while self.pending_count() > 0 {
                let Some(update) = updates.recv().await else {
                    debug!(pending = self.pending_count(), "background tasks ended early");
                    break;
                };

                self.apply_update(update);

                let prompt = self.rerender().await;
                trace!(pending = self.pending_count(), "streaming updated prompt");

                if prompts.send(prompt).await.is_err() {
                    return;
                }
            }
        });

        receiver
    }
}
