//! Volatile single-slot token store.

use std::sync::Arc;

use parking_lot::Mutex;
use pointdv_core::TokenStore;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("token store unavailable")]
pub struct TokenStoreError;

#[derive(Default)]
struct Slot {
  value:   Option<String>,
  failing: bool,
  writes:  usize,
}

/// Cloning is cheap; clones share the same slot.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
  slot: Arc<Mutex<Slot>>,
}

impl MemoryTokenStore {
  pub fn new() -> Self { Self::default() }

  /// Pre-populate the slot with a raw value, e.g. a stored credential.
  pub fn with_value(value: impl Into<String>) -> Self {
    let store = Self::new();
    store.slot.lock().value = Some(value.into());
    store
  }

  pub fn value(&self) -> Option<String> { self.slot.lock().value.clone() }

  /// Make every operation fail until reset.
  pub fn set_failing(&self, failing: bool) { self.slot.lock().failing = failing; }

  pub fn write_count(&self) -> usize { self.slot.lock().writes }
}

impl TokenStore for MemoryTokenStore {
  type Error = TokenStoreError;

  async fn get(&self) -> Result<Option<String>, TokenStoreError> {
    let slot = self.slot.lock();
    if slot.failing {
      return Err(TokenStoreError);
    }
    Ok(slot.value.clone())
  }

  async fn set(&self, value: &str) -> Result<(), TokenStoreError> {
    let mut slot = self.slot.lock();
    if slot.failing {
      return Err(TokenStoreError);
    }
    slot.value = Some(value.to_owned());
    slot.writes += 1;
    Ok(())
  }

  async fn clear(&self) -> Result<(), TokenStoreError> {
    let mut slot = self.slot.lock();
    if slot.failing {
      return Err(TokenStoreError);
    }
    slot.value = None;
    slot.writes += 1;
    Ok(())
  }
}
