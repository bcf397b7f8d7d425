use crate::engine::DiameterEngine;
use crate::queue::Task;
use std::sync::Arc;
use tracing::{debug, warn};

/// Take tasks until the queue shuts down
pub(crate) async fn run(engine: Arc<DiameterEngine>, id: usize) {
    debug!(worker = id, "worker started");
    while let Ok(task) = engine.queue.take().await {
        engine.process_task(task);
    }
    debug!(worker = id, "worker stopped");
}

impl DiameterEngine {
    /// Session layer first, then the registered handlers, then the pending
    /// transaction of an answer.
    pub(crate) fn process_task(&self, task: Task) {
        let Task { peer, mut msg } = task;

        let received = self.sessions.process_received(&mut msg, &self.session_ctx());
        self.execute_session_actions(received.actions);
        if received.consumed {
            return;
        }

        if msg.is_request() {
            let handlers = self.handlers.requests.read().clone();
            let mut answered = false;
            for handler in handlers.iter() {
                let Some(answer) = handler(&msg) else { continue };
                answered = true;
                if let Err(e) = self.send_message_to_peer(answer, &peer) {
                    warn!(peer = %peer, command = msg.command_code(), error = %e, "answer not sent");
                }
            }
            if !answered {
                debug!(
                    peer = %peer,
                    command = msg.command_code(),
                    application = msg.application_id(),
                    "request not answered by any handler"
                );
            }
            return;
        }

        let handlers = self.handlers.responses.read().clone();
        for handler in handlers.iter() {
            handler(&msg);
        }

        match self.transactions.take_by_answer(&msg) {
            Some(transaction) => {
                let elapsed = transaction.started.elapsed().as_millis() as u64;
                self.metrics.observe_reply(elapsed);
                transaction.fire(Ok(msg));
            }
            None => debug!(
                peer = %peer,
                end_to_end_id = msg.header.end_to_end_id,
                "answer without pending transaction"
            ),
        }
    }
}
