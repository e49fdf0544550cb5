//! Capability credentials.
//!
//! Administrative rights over a ledger are proven by holding an
//! [`AdminCap`] minted for that ledger's [`LedgerId`]. The token inside is
//! random and never exposed, so the only way to hold a valid cap is to be
//! handed one by whoever issued it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::market::AccountId;

/// Identity of one ledger instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(Uuid);

impl LedgerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LedgerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unforgeable administrative credential for one ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdminCap {
    ledger: LedgerId,
    holder: AccountId,
    token: Uuid,
}

impl AdminCap {
    /// Mints a fresh cap. Only meaningful once an authorizer records it.
    pub fn mint(ledger: LedgerId, holder: AccountId) -> Self {
        Self {
            ledger,
            holder,
            token: Uuid::new_v4(),
        }
    }

    /// Ledger this cap claims authority over.
    pub const fn ledger(&self) -> LedgerId {
        self.ledger
    }

    /// Account acting with this cap; recorded as market creator.
    pub const fn holder(&self) -> &AccountId {
        &self.holder
    }
}
