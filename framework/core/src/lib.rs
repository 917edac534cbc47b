mod shutdown;
mod teardown;
mod wait;

pub mod prelude {
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
    pub use crate::teardown::{TeardownError, TeardownFailure, TeardownStack};
    pub use crate::wait::{sleep_or_shutdown, wait_until_true, DEFAULT_RETRY_INTERVAL};
}
