use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::events::Event;
use crate::queue::EventReceiver;

/// Drains the dispatch queue.
///
/// Each event either gets handed to an external command or printed to
/// stdout, mirroring what the webhook endpoint answered over HTTP.
pub struct Consumer {
    /// Command (and leading arguments) to run per event. The event's owner,
    /// repo, branch and commit are appended as four extra arguments. Empty
    /// means print instead.
    command: Vec<String>,
}

impl Consumer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Receives events until all senders are dropped.
    pub async fn run(&self, mut events: EventReceiver) {
        debug!("running...");

        loop {
            let event = match events.recv().await {
                Some(event) => event,
                None => {
                    info!("all channel senders were dropped, exiting receive loop");
                    break;
                }
            };
            debug!("received event: {:?}", event);

            if let Err(e) = self.handle_event(event).await {
                warn!("encountered error while handling event: {}", e);
            }
        }
    }

    async fn handle_event(&self, event: Event) -> anyhow::Result<()> {
        let (program, args) = match self.command.split_first() {
            Some(split) => split,
            None => {
                println!(
                    "{} {} {} {}",
                    event.owner, event.repo, event.branch, event.commit
                );
                return Ok(());
            }
        };

        let status = Command::new(program)
            .args(args)
            .arg(&event.owner)
            .arg(&event.repo)
            .arg(&event.branch)
            .arg(&event.commit)
            .status()
            .await?;

        if !status.success() {
            warn!("`{}` exited with {} for {:?}", program, status, event);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::queue::dispatch_queue;

    fn event(branch: &str) -> Event {
        Event {
            kind: EventKind::Push,
            owner: "octocat".to_owned(),
            repo: "hello-world".to_owned(),
            branch: branch.to_owned(),
            commit: "abc123".to_owned(),
            action: String::new(),
            base_owner: String::new(),
            base_repo: String::new(),
            base_branch: String::new(),
        }
    }

    #[tokio::test]
    async fn test_run_exits_when_senders_are_dropped() {
        let (sender, receiver) = dispatch_queue();
        sender.publish(event("main"));
        drop(sender);

        // `true` swallows the event's arguments and exits 0.
        let consumer = Consumer::new(vec!["true".to_owned()]);
        consumer.run(receiver).await;
    }

    #[tokio::test]
    async fn test_failing_command_does_not_stop_the_loop() {
        let (sender, receiver) = dispatch_queue();
        sender.publish(event("first"));
        sender.publish(event("second"));
        drop(sender);

        let consumer = Consumer::new(vec!["false".to_owned()]);
        // Both events are consumed despite the non-zero exits.
        consumer.run(receiver).await;
    }
}
