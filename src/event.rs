use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Tick,
    Key(char),
    Quit,
}

/// Refresh ticks, Ctrl-C and (optionally) one-letter commands typed on
/// stdin, merged into one stream for the watch loop.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    _task: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        Self::build(tick_rate, false)
    }

    pub fn with_stdin(tick_rate: Duration) -> Self {
        Self::build(tick_rate, true)
    }

    fn build(tick_rate: Duration, read_stdin: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Event>();

        if read_stdin {
            let keys = tx.clone();
            // Blocking reads stay off the runtime; the thread ends with stdin.
            std::thread::spawn(move || {
                for line in std::io::stdin().lines() {
                    let Ok(line) = line else { break };
                    if let Some(key) = line.trim().chars().next()
                        && keys.send(Event::Key(key)).is_err()
                    {
                        break;
                    }
                }
            });
        }

        let task = tokio::spawn(async move {
            let mut tick_interval = tokio::time::interval(tick_rate);
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());

            loop {
                tokio::select! {
                    signal = &mut ctrl_c => {
                        if let Err(err) = signal {
                            tracing::warn!(%err, "cannot listen for Ctrl-C");
                        }
                        let _ = tx.send(Event::Quit);
                        break;
                    }
                    _ = tick_interval.tick() => {
                        if tx.send(Event::Tick).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self { rx, _task: task }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_arrive() {
        let mut events = EventHandler::new(Duration::from_millis(5));
        assert_eq!(events.next().await, Some(Event::Tick));
        assert_eq!(events.next().await, Some(Event::Tick));
    }
}
