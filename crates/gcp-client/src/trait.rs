//! GlobalAddressManager trait for mocking

use crate::error::GcpError;

/// Global static address operations
#[async_trait::async_trait]
pub trait GlobalAddressManager: Send + Sync {
    /// Reserve a global IPv6 address called `name`.
    ///
    /// Idempotent: succeeds when the address already exists.
    async fn ensure_ipv6(&self, name: &str) -> Result<(), GcpError>;
}
