//! Authorizer Port - Capability Verification
//!
//! The ledger never decides by itself who is an administrator.
//! It asks this port whether a presented credential carries
//! authority over the ledger it is acting on.

use crate::domain::auth::{AdminCap, LedgerId};

/// Verifies administrative credentials.
pub trait Authorizer: Send + Sync + 'static {
  /// Whether `cap` grants authority over `resource`.
  fn authorize(&self, cap: &AdminCap, resource: &LedgerId) -> bool;
}
