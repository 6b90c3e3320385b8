use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Outcome of a bounded poll.
#[derive(Debug)]
pub enum Polled<T> {
    Ready(T),
    TimedOut,
}

impl<T> Polled<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Polled::Ready(value) => Some(value),
            Polled::TimedOut => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Polled::Ready(_))
    }
}

/// Run `probe` at `interval` until it yields a value or `budget` elapses.
/// The probe runs at least once, so a zero budget still gets one attempt.
/// Probe failures propagate immediately; a timeout is a normal outcome.
pub async fn poll<T, F, Fut>(interval: Duration, budget: Duration, mut probe: F) -> Result<Polled<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + budget;
    loop {
        if let Some(value) = probe().await? {
            return Ok(Polled::Ready(value));
        }
        if Instant::now() >= deadline {
            return Ok(Polled::TimedOut);
        }
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_value_once_probe_succeeds() {
        let mut attempts = 0;
        let result = poll(Duration::from_millis(1), Duration::from_millis(250), || {
            attempts += 1;
            let hit = attempts >= 3;
            async move { Ok(if hit { Some("ready") } else { None }) }
        })
        .await
        .unwrap();

        assert_eq!(result.ready(), Some("ready"));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn times_out_when_probe_never_succeeds() {
        let result: Polled<()> =
            poll(Duration::from_millis(1), Duration::from_millis(10), || async {
                Ok(None)
            })
            .await
            .unwrap();

        assert!(!result.is_ready());
    }

    #[tokio::test]
    async fn probe_errors_propagate() {
        let result: Result<Polled<()>> =
            poll(Duration::from_millis(1), Duration::from_millis(10), || async {
                anyhow::bail!("probe failed")
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn zero_budget_still_probes_once() {
        let result = poll(Duration::from_millis(1), Duration::ZERO, || async {
            Ok(Some(42))
        })
        .await
        .unwrap();

        assert_eq!(result.ready(), Some(42));
    }
}
