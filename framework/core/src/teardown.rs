use std::fmt::Display;
use std::future::Future;

/// Ordered stack of rollback actions.
///
/// Actions are registered as resources get provisioned and are executed in reverse order of
/// registration by [TeardownStack::unwind]. Every registered action is executed exactly once, even
/// when an earlier one fails. The stack is not meant to be shared between tasks: registration
/// happens from the single setup sequence and unwinding consumes the whole stack.
#[derive(Debug)]
pub struct TeardownStack<A> {
    handlers: Vec<A>,
}

impl<A> Default for TeardownStack<A> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<A: Display> TeardownStack<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: A) {
        log::trace!("Registered teardown handler: {action}");
        self.handlers.push(action);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered actions in registration order.
    pub fn pending(&self) -> impl Iterator<Item = &A> {
        self.handlers.iter()
    }

    /// Run every registered action, most recently registered first.
    ///
    /// Failures are logged and collected; the stack is always fully drained.
    pub async fn unwind<F, Fut>(&mut self, mut run: F) -> Result<(), TeardownError>
    where
        F: FnMut(A) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut failures = Vec::new();

        while let Some(action) = self.handlers.pop() {
            let label = action.to_string();
            log::debug!("Running teardown handler: {label}");

            if let Err(error) = run(action).await {
                log::error!("Teardown handler [{label}] failed: {error:?}");
                failures.push(TeardownFailure { label, error });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }
}

/// A single failed teardown handler.
#[derive(Debug)]
pub struct TeardownFailure {
    pub label: String,
    pub error: anyhow::Error,
}

/// Every failure collected while unwinding a [TeardownStack].
#[derive(Debug, thiserror::Error)]
#[error("{} teardown handler(s) failed: {}", .failures.len(), describe(.failures))]
pub struct TeardownError {
    pub failures: Vec<TeardownFailure>,
}

fn describe(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {:#}", f.label, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
