//! Graceful shutdown coordination.

use tokio::sync::watch;

/// One-shot shutdown signal shared between tasks.
///
/// `wait()` returns a future that resolves once `shutdown()` has been
/// called; it can be awaited by any number of tasks and is safe to call
/// after the signal has already fired.
pub struct Shutdown {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    /// create a new shutdown signal
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender,
            receiver,
        }
    }

    /// fire the shutdown signal
    pub fn shutdown(&self) {
        let _ = self.sender.send(true);
    }

    /// check whether the signal has fired
    pub fn is_terminated(&self) -> bool {
        *self.receiver.borrow()
    }

    /// wait for the shutdown signal
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.receiver.clone();
        async move {
            if *receiver.borrow() {
                return;
            }
            while receiver.changed().await.is_ok() {
                if *receiver.borrow() {
                    return;
                }
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_resolves_after_shutdown() {
        let shutdown = Shutdown::new();
        let wait = shutdown.wait();
        shutdown.shutdown();
        wait.await;
        assert!(shutdown.is_terminated());
    }

    #[tokio::test]
    async fn test_wait_after_fired_resolves_immediately() {
        let shutdown = Shutdown::new();
        shutdown.shutdown();
        shutdown.wait().await;
    }
}
