use tokio::sync::watch::{Receiver, Sender};

/// Process-wide cancellation signal.
///
/// Once [ShutdownHandle::shutdown] has been called every listener, including listeners created
/// afterwards, observes the signal. There is no way to reset it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: std::sync::Arc<Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: std::sync::Arc::new(tokio::sync::watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        // `send_replace` never fails, even when nobody is subscribed yet.
        if !self.sender.send_replace(true) {
            log::debug!("Shutdown signal raised");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been raised. If this returns true then work
    /// should be stopped at the next safe point.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait for the shutdown signal. Resolves immediately if it has already been raised.
    ///
    /// It is safe to race this with another future so that the shutdown signal can be used to
    /// cancel other work in progress. If every [ShutdownHandle] has been dropped without raising
    /// the signal, this never resolves.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|raised| *raised).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Fail with [ShutdownSignalError] if the signal has been raised.
    pub fn check(&self) -> Result<(), ShutdownSignalError> {
        if self.should_shutdown() {
            Err(ShutdownSignalError::default())
        } else {
            Ok(())
        }
    }
}

/// Returned by blocking waits that stopped because the shutdown signal was raised, as opposed to
/// running out of time.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl ShutdownSignalError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "canceled by shutdown signal".to_string(),
        }
    }
}
