//! Capability Authorizer - In-Memory Cap Registry
//!
//! Issues [`AdminCap`] credentials and remembers which ones are live.
//! A cap authorizes a call only if this authorizer issued it, it has
//! not been revoked, and it was minted for the ledger being acted on.

use std::collections::HashSet;
use std::sync::RwLock;

use tracing::{info, warn};

use crate::domain::auth::{AdminCap, LedgerId};
use crate::domain::market::AccountId;
use crate::ports::authorizer::Authorizer;

/// Registry of issued administrative caps.
#[derive(Debug, Default)]
pub struct CapabilityAuthorizer {
    issued: RwLock<HashSet<AdminCap>>,
}

impl CapabilityAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint and record a cap for `holder` over `ledger`.
    pub fn issue(&self, ledger: LedgerId, holder: AccountId) -> AdminCap {
        let cap = AdminCap::mint(ledger, holder);
        match self.issued.write() {
            Ok(mut issued) => {
                issued.insert(cap.clone());
                info!(ledger = %ledger, holder = %cap.holder(), "Admin cap issued");
            }
            Err(_) => warn!("Cap registry poisoned; issued cap will not authorize"),
        }
        cap
    }

    /// Revoke a cap. Returns whether it was live.
    pub fn revoke(&self, cap: &AdminCap) -> bool {
        self.issued
            .write()
            .map(|mut issued| issued.remove(cap))
            .unwrap_or(false)
    }
}

impl Authorizer for CapabilityAuthorizer {
    fn authorize(&self, cap: &AdminCap, resource: &LedgerId) -> bool {
        cap.ledger() == *resource
            && self
                .issued
                .read()
                .map(|issued| issued.contains(cap))
                .unwrap_or(false)
    }
}
