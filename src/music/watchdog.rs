use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::music::controller::SessionCommand;
use crate::music::sink::Mailbox;

struct Countdown {
    id: u64,
    token: CancellationToken,
}

/// Idle-disconnect timer for one guild.
///
/// At most one countdown is live; arming again cancels the previous one.
/// Expiry only posts `WatchdogExpired` to the mailbox. The controller decides
/// whether the guild is still idle, and drops expiries that are no longer live.
#[derive(Default)]
pub struct IdleWatchdog {
    last_id: u64,
    live: Option<Countdown>,
}

impl IdleWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh countdown and returns its id.
    pub(crate) fn arm(&mut self, grace: Duration, mailbox: Mailbox) -> u64 {
        self.cancel();

        self.last_id += 1;
        let id = self.last_id;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    let _ = mailbox.send(SessionCommand::WatchdogExpired { arm_id: id });
                }
            }
        });

        self.live = Some(Countdown { id, token });
        id
    }

    /// Returns whether a countdown was running.
    pub fn cancel(&mut self) -> bool {
        match self.live.take() {
            Some(countdown) => {
                countdown.token.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.live.is_some()
    }

    /// Claims an expiry. False if `arm_id` was cancelled or superseded, in
    /// which case the expiry must be ignored.
    pub fn claim_expiry(&mut self, arm_id: u64) -> bool {
        match &self.live {
            Some(countdown) if countdown.id == arm_id => {
                self.live = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for IdleWatchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    use super::*;

    const GRACE: Duration = Duration::from_secs(60);

    fn expired_id(command: SessionCommand) -> u64 {
        match command {
            SessionCommand::WatchdogExpired { arm_id } => arm_id,
            _ => panic!("expected a watchdog expiry"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_grace_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watchdog = IdleWatchdog::new();

        let id = watchdog.arm(GRACE, tx);
        sleep(GRACE - Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        let fired = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(expired_id(fired), id);
        assert!(watchdog.claim_expiry(id));
        assert!(!watchdog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_countdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watchdog = IdleWatchdog::new();

        watchdog.arm(GRACE, tx);
        sleep(Duration::from_secs(59)).await;
        assert!(watchdog.cancel());

        sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(!watchdog.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_the_previous_countdown() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watchdog = IdleWatchdog::new();

        let first = watchdog.arm(GRACE, tx.clone());
        sleep(Duration::from_secs(30)).await;
        let second = watchdog.arm(GRACE, tx);

        // The first countdown's deadline passes without a message.
        sleep(Duration::from_secs(31)).await;
        assert!(rx.try_recv().is_err());

        let fired = timeout(GRACE, rx.recv()).await.unwrap().unwrap();
        assert_eq!(expired_id(fired), second);
        assert!(!watchdog.claim_expiry(first));
        assert!(watchdog.claim_expiry(second));
    }

    #[test]
    fn stale_expiry_is_not_claimed() {
        let mut watchdog = IdleWatchdog::new();
        assert!(!watchdog.claim_expiry(1));
    }
}
