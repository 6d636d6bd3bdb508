//! Mock GlobalAddressManager for unit testing

use crate::error::GcpError;
use crate::gcp_trait::GlobalAddressManager;
use std::sync::{Arc, Mutex};

/// Records every address it is asked to reserve
#[derive(Debug, Clone, Default)]
pub struct MockGcpClient {
    reserved: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockGcpClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `GcpError::Api(message)`
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    /// Names passed to `ensure_ipv6`, in call order
    pub fn reserved(&self) -> Vec<String> {
        self.reserved.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GlobalAddressManager for MockGcpClient {
    async fn ensure_ipv6(&self, name: &str) -> Result<(), GcpError> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(GcpError::Api(message));
        }
        self.reserved.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
