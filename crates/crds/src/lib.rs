//! Nginx Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definition for the nginx operator, plus the
//! well-known labels and annotations shared by every object it manages.

pub mod fingerprint;
pub mod labels;
pub mod nginx;

pub use fingerprint::*;
pub use labels::*;
pub use nginx::*;
