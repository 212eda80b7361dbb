//! Controller tests against the in-memory backend and token store.

use std::{collections::BTreeSet, sync::Arc, time::Duration as StdDuration};

use chrono::{Duration, Utc};
use pointdv_core::{
  AccountKind, AuthError, ChannelEvent, EventId, IdentityId, Membership, Profile, ProfileUpdate,
  SignupRequest,
};
use pointdv_memory::{MemoryBackend, MemoryTokenStore};
use tokio::time::timeout;

use crate::{
  AuthPhase, AuthTransitionController, LinkState, NavigationGate, PersistedCredential,
  SessionConfig, SessionError, SessionState, ToggleOutcome, ToggleStrategy,
};

type Controller = AuthTransitionController<MemoryBackend, MemoryTokenStore>;

fn ana() -> IdentityId { IdentityId::new("u1") }

fn bia() -> IdentityId { IdentityId::new("u2") }

fn ids(items: &[&str]) -> BTreeSet<EventId> { items.iter().map(|i| EventId::new(*i)).collect() }

/// u1: consumer with `{e1}` favorited. u2: merchant with nothing.
fn backend() -> MemoryBackend {
  let backend = MemoryBackend::new();

  let mut ana = Profile::new("Ana", AccountKind::Consumer);
  ana.favorited_ids = ids(&["e1"]);
  backend.add_account("u1", "ana@example.com", "secret1", Some(ana));

  let mut bia = Profile::new("Bia", AccountKind::Merchant);
  bia.business_name = Some("Bar da Bia".into());
  backend.add_account("u2", "bia@example.com", "secret2", Some(bia));

  backend
}

/// A token store holding a credential for `id`, issued `age` ago.
fn persisted(backend: &MemoryBackend, id: &IdentityId, age: Duration) -> MemoryTokenStore {
  let identity = backend.issue_token(id).unwrap();
  let credential = PersistedCredential {
    identity_id: identity.id,
    token:       identity.token,
    issued_at:   Utc::now() - age,
  };
  MemoryTokenStore::with_value(serde_json::to_string(&credential).unwrap())
}

fn controller(backend: &MemoryBackend, tokens: &MemoryTokenStore) -> Controller {
  controller_with(backend, tokens, ToggleStrategy::PushReconciled)
}

fn controller_with(
  backend: &MemoryBackend,
  tokens: &MemoryTokenStore,
  toggle_strategy: ToggleStrategy,
) -> Controller {
  let config = SessionConfig { toggle_strategy, ..SessionConfig::default() };
  AuthTransitionController::new(Arc::new(backend.clone()), tokens.clone(), config)
}

/// Let spawned pumps drain whatever is buffered.
async fn settle() {
  for _ in 0..32 {
    tokio::task::yield_now().await;
  }
}

async fn wait_until(ctl: &Controller, f: impl FnMut(&SessionState) -> bool) -> SessionState {
  let mut rx = ctl.state();
  timeout(StdDuration::from_secs(2), rx.wait_for(f))
    .await
    .expect("state never reached")
    .map(|s| s.clone())
    .expect("state container closed")
}

async fn signed_in(backend: &MemoryBackend, tokens: &MemoryTokenStore) -> Controller {
  let ctl = controller(backend, tokens);
  ctl.restore_session().await;
  ctl.login("ana@example.com", "secret1").await.unwrap();
  wait_until(&ctl, |s| s.link == LinkState::Live).await;
  ctl
}

// ─── Restore ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn restore_installs_identity_then_profile() {
  let backend = backend();
  let tokens = persisted(&backend, &ana(), Duration::hours(1));
  let ctl = controller(&backend, &tokens);
  assert_eq!(ctl.snapshot().gate(), NavigationGate::Hold);

  assert_eq!(ctl.restore_session().await, Some(ana()));

  // Identity known, profile not yet delivered: still loading.
  let s = ctl.snapshot();
  assert_eq!(s.identity_id(), Some(&ana()));
  assert!(s.profile.is_none());
  assert!(s.is_auth_loading());
  assert_eq!(s.gate(), NavigationGate::Hold);

  let s = wait_until(&ctl, |s| !s.is_auth_loading()).await;
  assert_eq!(s.phase, AuthPhase::Authenticated);
  assert_eq!(s.account_kind(), Some(AccountKind::Consumer));
  assert_eq!(s.favorited_ids(), &ids(&["e1"]));
  assert_eq!(s.link, LinkState::Live);
  assert_eq!(s.gate(), NavigationGate::Home(AccountKind::Consumer));
}

#[tokio::test]
async fn restore_without_credential_signs_out() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = controller(&backend, &tokens);

  assert_eq!(ctl.restore_session().await, None);
  let s = ctl.snapshot();
  assert_eq!(s.phase, AuthPhase::Unauthenticated);
  assert!(!s.is_auth_loading());
  assert_eq!(s.gate(), NavigationGate::SignIn);
}

#[tokio::test]
async fn expired_credential_is_discarded() {
  let backend = backend();
  let tokens = persisted(&backend, &ana(), Duration::days(8));
  let ctl = controller(&backend, &tokens);

  assert_eq!(ctl.restore_session().await, None);
  assert_eq!(tokens.value(), None);
  assert_eq!(ctl.snapshot().gate(), NavigationGate::SignIn);
}

#[tokio::test]
async fn corrupt_credential_is_discarded() {
  let backend = backend();
  let tokens = MemoryTokenStore::with_value("{not json");
  let ctl = controller(&backend, &tokens);

  assert_eq!(ctl.restore_session().await, None);
  assert_eq!(tokens.value(), None);
  assert!(!ctl.snapshot().is_auth_loading());
}

#[tokio::test]
async fn unreadable_token_store_means_no_session() {
  let backend = backend();
  let tokens = persisted(&backend, &ana(), Duration::hours(1));
  tokens.set_failing(true);
  let ctl = controller(&backend, &tokens);

  assert_eq!(ctl.restore_session().await, None);
  assert_eq!(ctl.snapshot().phase, AuthPhase::Unauthenticated);
}

#[tokio::test]
async fn restore_with_absent_record_keeps_identity() {
  let backend = backend();
  let ghost = backend.add_account("u3", "ghost@example.com", "secret3", None);
  let tokens = persisted(&backend, &ghost, Duration::hours(1));
  let ctl = controller(&backend, &tokens);

  ctl.restore_session().await;
  let s = wait_until(&ctl, |s| !s.is_auth_loading()).await;
  assert_eq!(s.identity_id(), Some(&ghost));
  assert!(s.profile.is_none());
  assert_eq!(s.account_kind(), None);
  assert_eq!(s.gate(), NavigationGate::SignIn);
}

#[tokio::test]
async fn permission_denied_on_restore_is_treated_as_absent() {
  let backend = backend();
  let tokens = persisted(&backend, &ana(), Duration::hours(1));
  backend.deny_reads(&ana());
  let ctl = controller(&backend, &tokens);

  ctl.restore_session().await;
  let s = wait_until(&ctl, |s| !s.is_auth_loading()).await;
  assert!(s.identity.is_some());
  assert!(s.profile.is_none());
  assert_eq!(s.link, LinkState::Errored);
  assert_eq!(s.gate(), NavigationGate::SignIn);
}

#[tokio::test]
async fn revoked_token_on_restore_settles_loading() {
  let backend = backend();
  let tokens = persisted(&backend, &ana(), Duration::hours(1));
  backend.revoke_tokens(&ana());
  let ctl = controller(&backend, &tokens);

  ctl.restore_session().await;
  let s = ctl.snapshot();
  assert!(!s.is_auth_loading());
  assert_eq!(s.gate(), NavigationGate::SignIn);
  assert!(!ctl.subscriptions().is_open());
}

// ─── Login / logout ──────────────────────────────────────────────────────────

#[tokio::test]
async fn login_installs_identity_and_account_together() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = controller(&backend, &tokens);
  ctl.restore_session().await;

  let id = ctl.login("ana@example.com", "secret1").await.unwrap();
  assert_eq!(id, ana());

  let s = ctl.snapshot();
  assert_eq!(s.identity_id(), Some(&ana()));
  assert_eq!(s.account_kind(), Some(AccountKind::Consumer));
  assert!(!s.is_auth_loading());

  let stored: PersistedCredential = serde_json::from_str(&tokens.value().unwrap()).unwrap();
  assert_eq!(stored.identity_id, ana());

  let s = wait_until(&ctl, |s| s.link == LinkState::Live).await;
  assert_eq!(s.favorited_ids(), &ids(&["e1"]));
  assert_eq!(backend.live_channels(&ana()), 1);
}

#[tokio::test]
async fn failed_login_surfaces_error_and_clears_loading() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = controller(&backend, &tokens);
  ctl.restore_session().await;

  let err = ctl.login("ana@example.com", "wrong").await.unwrap_err();
  assert_eq!(err, AuthError::InvalidCredentials);
  assert!(!err.user_message().is_empty());

  let s = ctl.snapshot();
  assert!(s.identity.is_none());
  assert!(!s.is_auth_loading());
  assert_eq!(tokens.value(), None);
}

#[tokio::test]
async fn failed_login_leaves_current_session_alone() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = signed_in(&backend, &tokens).await;

  assert_eq!(ctl.login("bia@example.com", "nope").await.unwrap_err(), AuthError::InvalidCredentials);
  assert_eq!(ctl.snapshot().identity_id(), Some(&ana()));
  assert_eq!(backend.live_channels(&ana()), 1);
}

#[tokio::test]
async fn network_failure_on_login_is_surfaced() {
  let backend = backend();
  backend.set_offline(true);
  let ctl = controller(&backend, &MemoryTokenStore::new());
  ctl.restore_session().await;

  let err = ctl.login("ana@example.com", "secret1").await.unwrap_err();
  assert!(matches!(err, AuthError::Network(_)));
}

#[tokio::test]
async fn login_survives_unwritable_token_store() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  tokens.set_failing(true);
  let ctl = controller(&backend, &tokens);
  ctl.restore_session().await;

  assert_eq!(ctl.login("ana@example.com", "secret1").await, Ok(ana()));
  assert_eq!(ctl.snapshot().identity_id(), Some(&ana()));
}

#[tokio::test]
async fn logout_while_live_tears_everything_down() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = signed_in(&backend, &tokens).await;

  ctl.logout().await;

  let s = ctl.snapshot();
  assert!(s.identity.is_none());
  assert!(s.profile.is_none());
  assert!(s.favorited_ids().is_empty());
  assert_eq!(s.gate(), NavigationGate::SignIn);
  assert!(!ctl.subscriptions().is_open());
  assert_eq!(backend.live_channels(&ana()), 0);
  assert_eq!(tokens.value(), None);
}

#[tokio::test]
async fn login_completing_after_logout_is_superseded() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = controller(&backend, &tokens);
  ctl.restore_session().await;

  backend.hold_verify(true);
  let (result, ()) = tokio::join!(ctl.login("ana@example.com", "secret1"), async {
    settle().await;
    ctl.logout().await;
    backend.hold_verify(false);
  });

  assert_eq!(result, Err(AuthError::Superseded));
  let s = ctl.snapshot();
  assert!(s.identity.is_none());
  assert_eq!(backend.live_channels(&ana()), 0);
  assert_eq!(tokens.value(), None);
}

// ─── Stale updates ───────────────────────────────────────────────────────────

#[tokio::test]
async fn late_event_after_logout_is_dropped() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = signed_in(&backend, &tokens).await;
  let senders = backend.senders(&ana());
  assert!(!senders.is_empty());

  ctl.logout().await;
  for tx in &senders {
    assert!(!tx.send(ChannelEvent::Snapshot(Profile::new("Late", AccountKind::Merchant))));
  }
  backend.set_profile(&ana(), Some(Profile::new("Renamed", AccountKind::Consumer)));
  settle().await;

  let s = ctl.snapshot();
  assert!(s.profile.is_none());
  assert!(s.identity.is_none());
}

#[tokio::test]
async fn relogin_as_other_user_ignores_previous_channel() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = signed_in(&backend, &tokens).await;
  let old = backend.senders(&ana());

  ctl.logout().await;
  ctl.login("bia@example.com", "secret2").await.unwrap();
  wait_until(&ctl, |s| s.link == LinkState::Live).await;

  for tx in &old {
    assert!(!tx.send(ChannelEvent::Snapshot(Profile::new("Ana", AccountKind::Consumer))));
  }
  backend.set_profile(&ana(), Some(Profile::new("Ana again", AccountKind::Consumer)));
  settle().await;

  let s = ctl.snapshot();
  assert_eq!(s.identity_id(), Some(&bia()));
  assert_eq!(s.account_kind(), Some(AccountKind::Merchant));
  assert_eq!(backend.live_channels(&ana()), 0);
  assert_eq!(backend.live_channels(&bia()), 1);
}

#[tokio::test]
async fn switching_user_without_logout_cancels_first_channel() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = signed_in(&backend, &tokens).await;

  ctl.login("bia@example.com", "secret2").await.unwrap();
  let s = wait_until(&ctl, |s| s.link == LinkState::Live).await;
  assert_eq!(s.gate(), NavigationGate::Home(AccountKind::Merchant));
  assert_eq!(backend.live_channels(&ana()), 0);

  let stored: PersistedCredential = serde_json::from_str(&tokens.value().unwrap()).unwrap();
  assert_eq!(stored.identity_id, bia());
}

#[tokio::test]
async fn relogin_keeps_a_single_channel() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = signed_in(&backend, &tokens).await;

  ctl.login("ana@example.com", "secret1").await.unwrap();
  wait_until(&ctl, |s| s.link == LinkState::Live).await;
  ctl.login("ana@example.com", "secret1").await.unwrap();
  wait_until(&ctl, |s| s.link == LinkState::Live).await;

  assert_eq!(backend.live_channels(&ana()), 1);
}

// ─── Live channel ────────────────────────────────────────────────────────────

#[tokio::test]
async fn server_side_change_replaces_profile() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;

  let mut changed = Profile::new("Ana Paula", AccountKind::Consumer);
  changed.confirmed_ids = ids(&["e7"]);
  backend.set_profile(&ana(), Some(changed));

  let s = wait_until(&ctl, |s| s.profile.as_ref().is_some_and(|p| p.display_name == "Ana Paula")).await;
  // Replaced wholesale: the old favorites are gone.
  assert!(s.favorited_ids().is_empty());
  assert_eq!(s.confirmed_ids(), &ids(&["e7"]));
}

#[tokio::test]
async fn record_becoming_unreadable_clears_profile() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;

  backend.deny_reads(&ana());
  let s = wait_until(&ctl, |s| s.link == LinkState::Errored).await;
  assert!(s.profile.is_none());
  assert_eq!(s.identity_id(), Some(&ana()));
}

#[tokio::test]
async fn transient_channel_failure_keeps_profile() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;

  backend.fail_channels(&ana(), "connection reset");
  let s = wait_until(&ctl, |s| s.link == LinkState::Errored).await;
  assert_eq!(s.favorited_ids(), &ids(&["e1"]));
  assert!(!s.is_auth_loading());
}

#[tokio::test]
async fn refresh_rereads_profile_after_channel_loss() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;

  backend.fail_channels(&ana(), "connection reset");
  wait_until(&ctl, |s| s.link == LinkState::Errored).await;
  backend.set_profile(&ana(), Some(Profile::new("Ana Paula", AccountKind::Consumer)));
  settle().await;
  assert_eq!(ctl.snapshot().profile.unwrap().display_name, "Ana");

  ctl.refresh_profile().await;
  assert_eq!(ctl.snapshot().profile.unwrap().display_name, "Ana Paula");
}

#[tokio::test]
async fn observers_are_notified_of_transitions() {
  let backend = backend();
  let ctl = controller(&backend, &MemoryTokenStore::new());
  let mut rx = ctl.state();
  assert!(!rx.has_changed().unwrap());

  ctl.restore_session().await;
  assert!(rx.has_changed().unwrap());
  assert_eq!(rx.borrow_and_update().gate(), NavigationGate::SignIn);
}

#[tokio::test]
async fn loading_settles_once_per_restore() {
  let backend = backend();
  let tokens = persisted(&backend, &ana(), Duration::hours(1));
  let ctl = controller(&backend, &tokens);

  let seen = Arc::new(parking_lot::Mutex::new(vec![ctl.snapshot().is_auth_loading()]));
  let mut rx = ctl.state();
  let recorder = tokio::spawn({
    let seen = seen.clone();
    async move {
      while rx.changed().await.is_ok() {
        let loading = rx.borrow_and_update().is_auth_loading();
        seen.lock().push(loading);
      }
    }
  });

  ctl.restore_session().await;
  wait_until(&ctl, |s| s.link == LinkState::Live).await;
  backend.set_profile(&ana(), Some(Profile::new("Ana Paula", AccountKind::Consumer)));
  ctl.toggle_favorite(EventId::new("e2")).await;
  wait_until(&ctl, |s| s.profile.as_ref().is_some_and(|p| p.display_name == "Ana Paula")).await;
  settle().await;
  recorder.abort();

  let mut flips = seen.lock().clone();
  flips.dedup();
  assert_eq!(flips, vec![true, false]);
}

// ─── Toggles ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_toggles_reconcile_through_push() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;

  let (a, b) = tokio::join!(ctl.toggle_favorite("e2".into()), ctl.toggle_favorite("e2".into()));
  let mut results = Vec::new();
  for outcome in [a, b] {
    match outcome {
      ToggleOutcome::Confirmed(m) => results.push(m),
      other => panic!("unexpected outcome: {other:?}"),
    }
  }
  results.sort_by_key(|m| m.is_member());
  assert_eq!(results, vec![Membership::Removed, Membership::Added]);

  settle().await;
  assert_eq!(ctl.snapshot().favorited_ids(), &ids(&["e1"]));
  assert_eq!(backend.profile(&ana()).unwrap().favorited_ids, ids(&["e1"]));
  assert_eq!(backend.toggle_calls(), 2);
}

#[tokio::test]
async fn confirmed_toggle_arrives_through_channel() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;

  let outcome = ctl.toggle_confirmed("e5".into()).await;
  assert!(matches!(outcome, ToggleOutcome::Confirmed(Membership::Added)));

  let s = wait_until(&ctl, |s| !s.confirmed_ids().is_empty()).await;
  assert_eq!(s.confirmed_ids(), &ids(&["e5"]));
  assert_eq!(s.favorited_ids(), &ids(&["e1"]));
}

#[tokio::test]
async fn push_toggle_failure_leaves_local_state() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;
  backend.set_offline(true);

  let outcome = ctl.toggle_favorite("e2".into()).await;
  assert!(matches!(outcome, ToggleOutcome::Unconfirmed));
  settle().await;
  assert_eq!(ctl.snapshot().favorited_ids(), &ids(&["e1"]));
}

#[tokio::test]
async fn toggle_without_session_sends_nothing() {
  let backend = backend();
  let ctl = controller(&backend, &MemoryTokenStore::new());
  ctl.restore_session().await;

  assert!(matches!(ctl.toggle_favorite("e2".into()).await, ToggleOutcome::NoSession));
  assert_eq!(backend.toggle_calls(), 0);
}

#[tokio::test]
async fn optimistic_toggle_is_visible_before_confirmation() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = controller_with(&backend, &tokens, ToggleStrategy::OptimisticLocal);
  ctl.restore_session().await;
  ctl.login("ana@example.com", "secret1").await.unwrap();
  wait_until(&ctl, |s| s.link == LinkState::Live).await;
  assert!(ctl.toggle_strategy().may_drift());

  let ToggleOutcome::Optimistic { membership, remote } = ctl.toggle_favorite("e2".into()).await else {
    panic!("expected optimistic outcome");
  };
  assert_eq!(membership, Membership::Added);
  assert_eq!(ctl.snapshot().favorited_ids(), &ids(&["e1", "e2"]));

  remote.await.unwrap();
  settle().await;
  assert_eq!(ctl.snapshot().favorited_ids(), &ids(&["e1", "e2"]));
  assert_eq!(backend.profile(&ana()).unwrap().favorited_ids, ids(&["e1", "e2"]));
}

#[tokio::test]
async fn optimistic_toggles_compose_on_latest_snapshot() {
  let backend = backend();
  let ctl = controller_with(&backend, &MemoryTokenStore::new(), ToggleStrategy::OptimisticLocal);
  ctl.restore_session().await;
  ctl.login("ana@example.com", "secret1").await.unwrap();
  wait_until(&ctl, |s| s.link == LinkState::Live).await;

  let first = ctl.toggle_favorite("e2".into()).await;
  let second = ctl.toggle_favorite("e2".into()).await;
  for outcome in [first, second] {
    if let ToggleOutcome::Optimistic { remote, .. } = outcome {
      remote.await.unwrap();
    }
  }
  settle().await;
  assert_eq!(ctl.snapshot().favorited_ids(), &ids(&["e1"]));
  assert_eq!(backend.profile(&ana()).unwrap().favorited_ids, ids(&["e1"]));
}

#[tokio::test]
async fn optimistic_failure_is_not_rolled_back() {
  let backend = backend();
  let ctl = controller_with(&backend, &MemoryTokenStore::new(), ToggleStrategy::OptimisticLocal);
  ctl.restore_session().await;
  ctl.login("ana@example.com", "secret1").await.unwrap();
  wait_until(&ctl, |s| s.link == LinkState::Live).await;
  backend.set_offline(true);

  let ToggleOutcome::Optimistic { remote, .. } = ctl.toggle_favorite("e2".into()).await else {
    panic!("expected optimistic outcome");
  };
  remote.await.unwrap();
  settle().await;

  // Local and remote now disagree until the next push.
  assert_eq!(ctl.snapshot().favorited_ids(), &ids(&["e1", "e2"]));
  assert_eq!(backend.profile(&ana()).unwrap().favorited_ids, ids(&["e1"]));
}

#[tokio::test]
async fn optimistic_toggle_needs_a_snapshot() {
  let backend = backend();
  let ghost = backend.add_account("u3", "ghost@example.com", "secret3", None);
  let tokens = persisted(&backend, &ghost, Duration::hours(1));
  let ctl = controller_with(&backend, &tokens, ToggleStrategy::OptimisticLocal);
  ctl.restore_session().await;
  wait_until(&ctl, |s| !s.is_auth_loading()).await;

  assert!(matches!(ctl.toggle_favorite("e2".into()).await, ToggleOutcome::NoSnapshot));
  assert_eq!(backend.toggle_calls(), 0);
}

// ─── Teardown ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dispose_drops_buffered_events() {
  let backend = backend();
  let ctl = controller(&backend, &MemoryTokenStore::new());
  ctl.restore_session().await;
  ctl.login("ana@example.com", "secret1").await.unwrap();
  // The first snapshot is buffered; queue another before the pump runs.
  backend.set_profile(&ana(), Some(Profile::new("Renamed", AccountKind::Merchant)));

  ctl.dispose();
  settle().await;

  let s = ctl.snapshot();
  assert!(s.is_disposed());
  assert_eq!(s.link, LinkState::Cancelled);
  assert_eq!(s.profile.unwrap().display_name, "Ana");
  assert_eq!(backend.live_channels(&ana()), 0);
}

#[tokio::test]
async fn disposed_controller_ignores_operations() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;
  ctl.dispose();
  ctl.dispose();

  assert!(matches!(ctl.toggle_favorite("e2".into()).await, ToggleOutcome::NoSession));
  assert_eq!(ctl.login("bia@example.com", "secret2").await, Err(AuthError::Superseded));
  assert_eq!(ctl.snapshot().identity_id(), Some(&ana()));
  assert_eq!(backend.toggle_calls(), 0);
}

#[tokio::test]
async fn dropping_controller_cancels_channel() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;
  let container = ctl.container().clone();
  assert_eq!(backend.live_channels(&ana()), 1);

  drop(ctl);
  assert_eq!(backend.live_channels(&ana()), 0);
  assert!(container.snapshot().is_disposed());
}

// ─── Account management ──────────────────────────────────────────────────────

fn merchant_signup() -> SignupRequest {
  SignupRequest {
    display_name:  "Carla".into(),
    email:         "carla@example.com".into(),
    secret:        "secret3".into(),
    account_kind:  AccountKind::Merchant,
    business_name: Some("Café da Carla".into()),
    phone:         Some("+55 11 5555-0000".into()),
    address:       Some("Rua das Flores, 10".into()),
  }
}

#[tokio::test]
async fn signup_does_not_sign_in() {
  let backend = backend();
  let ctl = controller(&backend, &MemoryTokenStore::new());
  ctl.restore_session().await;

  ctl.signup(&merchant_signup()).await.unwrap();
  assert!(ctl.snapshot().identity.is_none());

  ctl.login("carla@example.com", "secret3").await.unwrap();
  assert_eq!(ctl.snapshot().gate(), NavigationGate::Home(AccountKind::Merchant));
}

#[tokio::test]
async fn signup_with_registered_email_fails() {
  let backend = backend();
  let ctl = controller(&backend, &MemoryTokenStore::new());
  let mut request = merchant_signup();
  request.email = "ANA@example.com".into();

  assert_eq!(ctl.signup(&request).await.unwrap_err(), AuthError::EmailInUse);
}

#[tokio::test]
async fn change_password_requires_session_and_current_secret() {
  let backend = backend();
  let ctl = controller(&backend, &MemoryTokenStore::new());
  ctl.restore_session().await;
  assert_eq!(ctl.change_password("secret1", "secret9").await, Err(AuthError::NotSignedIn));

  ctl.login("ana@example.com", "secret1").await.unwrap();
  assert_eq!(ctl.change_password("wrong", "secret9").await, Err(AuthError::InvalidCredentials));
  assert_eq!(ctl.change_password("secret1", "secret9").await, Ok(()));
  assert_eq!(backend.secret(&ana()).as_deref(), Some("secret9"));

  ctl.logout().await;
  assert_eq!(ctl.login("ana@example.com", "secret9").await, Ok(ana()));
}

#[tokio::test]
async fn password_reset_needs_known_account() {
  let backend = backend();
  let ctl = controller(&backend, &MemoryTokenStore::new());

  assert_eq!(ctl.request_password_reset("nobody@example.com").await, Err(AuthError::UnknownAccount));
  assert_eq!(ctl.request_password_reset("bia@example.com").await, Ok(()));
  assert_eq!(backend.reset_requests(), vec!["bia@example.com".to_owned()]);
}

#[tokio::test]
async fn profile_update_arrives_through_channel() {
  let backend = backend();
  let tokens = MemoryTokenStore::new();
  let ctl = controller(&backend, &tokens);
  ctl.restore_session().await;

  let update = ProfileUpdate { display_name: Some("Ana Paula".into()), ..Default::default() };
  assert!(matches!(ctl.update_profile(&update).await, Err(SessionError::NotSignedIn)));
  assert!(matches!(ctl.update_profile(&ProfileUpdate::default()).await, Err(SessionError::EmptyUpdate)));

  ctl.login("ana@example.com", "secret1").await.unwrap();
  ctl.update_profile(&update).await.unwrap();
  let s = wait_until(&ctl, |s| s.profile.as_ref().is_some_and(|p| p.display_name == "Ana Paula")).await;
  assert_eq!(s.favorited_ids(), &ids(&["e1"]));
}

#[tokio::test]
async fn profile_update_failure_is_returned() {
  let backend = backend();
  let ctl = signed_in(&backend, &MemoryTokenStore::new()).await;
  backend.set_offline(true);

  let update = ProfileUpdate { photo: Some("https://img.example/ana.png".into()), ..Default::default() };
  assert!(matches!(ctl.update_profile(&update).await, Err(SessionError::Remote(_))));
}
