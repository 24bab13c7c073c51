use std::{future::Future, time::Duration};

use tokio::time::Instant;

/// Exponential backoff bounded by total elapsed time rather than attempts.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_interval)
    }
}

/// Runs `op` until it succeeds or the next wait would exceed the elapsed
/// budget, in which case the last error is returned. `notify` sees every
/// error that is going to be retried, with the delay before the next try.
pub async fn retry_notify<T, E, F, Fut, N>(backoff: &Backoff, mut op: F, mut notify: N) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(&E, Duration),
{
    let start = Instant::now();
    let mut interval = backoff.initial_interval;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if start.elapsed() + interval > backoff.max_elapsed {
            return Err(err);
        }

        notify(&err, interval);
        tokio::time::sleep(interval).await;
        interval = backoff.next_interval(interval);
    }
}
