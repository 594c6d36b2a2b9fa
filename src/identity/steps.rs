//! Cooperative cancellation for multi-step operations.
//! A `StepGate` is checked once at every step boundary; a step already running is
//! never interrupted, the gate only refuses to start the next one.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Default)]
pub struct StepGate {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl StepGate {
    /// A gate that never closes on its own.
    pub fn open() -> Self { Self::default() }

    pub fn with_token(token: CancellationToken) -> Self { Self { token, deadline: None } }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self { self.with_deadline(Instant::now() + timeout) }

    /// Child gate: cancelled with its parent, can also be cancelled on its own.
    pub fn child(&self) -> Self { Self { token: self.token.child_token(), deadline: self.deadline } }

    pub fn cancel(&self) { self.token.cancel(); }

    pub fn token(&self) -> &CancellationToken { &self.token }

    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    /// Fail if the gate is closed. Cancellation wins over an expired deadline.
    pub fn check(&self) -> AuthResult<()> {
        if self.token.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(AuthError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Run one synchronous step if the gate is still open.
    pub fn run<T>(&self, step: impl FnOnce() -> AuthResult<T>) -> AuthResult<T> {
        self.check()?;
        step()
    }

    /// Run one asynchronous step if the gate is still open. The future is not
    /// polled at all when the gate is closed.
    pub async fn step<T, F>(&self, step: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        self.check()?;
        step.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn open_gate_runs_steps() {
        let gate = StepGate::open();
        let v = gate.step(async { Ok::<_, AuthError>(7) }).await.unwrap();
        assert_eq!(v, 7);
        assert_eq!(gate.run(|| Ok(3)).unwrap(), 3);
    }

    #[tokio::test]
    async fn cancelled_gate_skips_the_step() {
        let gate = StepGate::open();
        gate.cancel();
        let calls = AtomicUsize::new(0);
        let res = gate
            .step(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(res.unwrap_err(), AuthError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn running_step_is_not_interrupted() {
        let gate = StepGate::open();
        let inner = gate.clone();
        let res = gate
            .step(async move {
                inner.cancel();
                Ok::<_, AuthError>("finished")
            })
            .await;
        assert_eq!(res.unwrap(), "finished");
        assert_eq!(gate.check().unwrap_err(), AuthError::Cancelled);
    }

    #[tokio::test]
    async fn expired_deadline_closes_gate() {
        let gate = StepGate::open().with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(gate.check().unwrap_err(), AuthError::DeadlineExceeded);
        let later = StepGate::open().with_timeout(Duration::from_secs(60));
        assert!(later.check().is_ok());
    }

    #[tokio::test]
    async fn earliest_deadline_wins() {
        let now = Instant::now();
        let gate = StepGate::open()
            .with_deadline(now + Duration::from_secs(60))
            .with_deadline(now + Duration::from_secs(1));
        assert_eq!(gate.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn child_follows_parent() {
        let parent = StepGate::open();
        let child = parent.child();
        child.cancel();
        assert!(parent.check().is_ok());
        let child = parent.child();
        parent.cancel();
        assert_eq!(child.check().unwrap_err(), AuthError::Cancelled);
    }
}
