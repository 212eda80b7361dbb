//! Profile: the durable record of account kind, display data and preference
//! sets tied to an identity.
//!
//! Locally a profile is only ever written two ways: replaced wholesale by a
//! live-channel push, or one preference set mutated by a toggle.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

// ─── Account kind ────────────────────────────────────────────────────────────

/// Role discriminator controlling the consumer / organizer branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
  /// Browses, favorites and confirms attendance.
  #[serde(rename = "consumidor")]
  Consumer,
  /// Publishes and manages events for an establishment.
  #[serde(rename = "lojista")]
  Merchant,
}

impl AccountKind {
  /// Wire name used by the remote store.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Consumer => "consumidor",
      Self::Merchant => "lojista",
    }
  }

  /// Merchants have a business name, phone and address on their profile.
  pub fn has_business_details(self) -> bool {
    match self {
      Self::Consumer => false,
      Self::Merchant => true,
    }
  }
}

// ─── Events and preference sets ──────────────────────────────────────────────

/// Identifier of an event record. Event content itself lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for EventId {
  fn from(s: &str) -> Self { Self::new(s) }
}

/// The named preference sets a profile carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceSet {
  #[serde(rename = "favoritos")]
  Favorites,
  #[serde(rename = "eventosConfirmados")]
  Confirmed,
}

impl PreferenceSet {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Favorites => "favoritos",
      Self::Confirmed => "eventosConfirmados",
    }
  }
}

impl fmt::Display for PreferenceSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Membership of an item after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
  Added,
  Removed,
}

impl Membership {
  /// The membership a toggle produces when the item is currently `present`.
  pub fn after_toggle(present: bool) -> Self {
    if present { Self::Removed } else { Self::Added }
  }

  pub fn is_member(self) -> bool { matches!(self, Self::Added) }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Local view of the signed-in account's remote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub display_name:  String,
  pub account_kind:  AccountKind,
  pub email:         Option<String>,
  pub address:       Option<String>,
  pub photo:         Option<String>,
  /// Merchant-only establishment details.
  pub business_name: Option<String>,
  pub phone:         Option<String>,
  pub favorited_ids: BTreeSet<EventId>,
  pub confirmed_ids: BTreeSet<EventId>,
}

impl Profile {
  /// An empty profile of the given kind; counts as a definitive snapshot.
  pub fn new(display_name: impl Into<String>, account_kind: AccountKind) -> Self {
    Self {
      display_name: display_name.into(),
      account_kind,
      email: None,
      address: None,
      photo: None,
      business_name: None,
      phone: None,
      favorited_ids: BTreeSet::new(),
      confirmed_ids: BTreeSet::new(),
    }
  }

  pub fn set(&self, set: PreferenceSet) -> &BTreeSet<EventId> {
    match set {
      PreferenceSet::Favorites => &self.favorited_ids,
      PreferenceSet::Confirmed => &self.confirmed_ids,
    }
  }

  pub fn set_mut(&mut self, set: PreferenceSet) -> &mut BTreeSet<EventId> {
    match set {
      PreferenceSet::Favorites => &mut self.favorited_ids,
      PreferenceSet::Confirmed => &mut self.confirmed_ids,
    }
  }

  pub fn contains(&self, set: PreferenceSet, id: &EventId) -> bool { self.set(set).contains(id) }

  /// Flip membership of `id` in `set` and return the resulting membership.
  pub fn toggle(&mut self, set: PreferenceSet, id: &EventId) -> Membership {
    let target = self.set_mut(set);
    if target.remove(id) {
      Membership::Removed
    } else {
      target.insert(id.clone());
      Membership::Added
    }
  }

  /// Number of events the user confirmed attendance for (tab badge).
  pub fn confirmed_count(&self) -> usize { self.confirmed_ids.len() }
}

/// Editable profile fields. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
  pub display_name:  Option<String>,
  pub photo:         Option<String>,
  pub business_name: Option<String>,
  pub phone:         Option<String>,
  pub address:       Option<String>,
}

impl ProfileUpdate {
  pub fn is_empty(&self) -> bool {
    self.display_name.is_none()
      && self.photo.is_none()
      && self.business_name.is_none()
      && self.phone.is_none()
      && self.address.is_none()
  }

  /// Apply the update to `profile`, as the remote store does.
  pub fn apply_to(&self, profile: &mut Profile) {
    if let Some(name) = &self.display_name {
      profile.display_name = name.clone();
    }
    if let Some(photo) = &self.photo {
      profile.photo = Some(photo.clone());
    }
    if let Some(address) = &self.address {
      profile.address = Some(address.clone());
    }
    // Establishment details only exist for merchants.
    if profile.account_kind.has_business_details() {
      if let Some(business) = &self.business_name {
        profile.business_name = Some(business.clone());
      }
      if let Some(phone) = &self.phone {
        profile.phone = Some(phone.clone());
      }
    }
  }
}
