//! [`HttpBackend`]: the PointDV REST API as a session [`Backend`].
//!
//! The server has no push transport, so the live profile channel polls
//! `GET /api/users/me` and emits only when the record changes.
//!
//! [`Backend`]: pointdv_core::Backend

use std::time::Duration;

use pointdv_core::{
  AuthError, AuthToken, ChannelError, ChannelEvent, CredentialService, EventId, FeedSender,
  Identity, IdentityId, MIN_SECRET_LEN, Membership, MembershipEndpoint, PreferenceSet, Profile,
  ProfileChannel, ProfileUpdate, RemoteError, SignupRequest, Subscription, Verified,
  channel::feed, normalise_email,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, trace};

use crate::wire::{
  ChangePasswordBody, ErrorBody, LoginBody, LoginResponse, MeResponse, ResetBody, SignupBody,
  SignupResponse, ToggleBody, ToggleResponse, UpdateBody,
};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Transient failures tolerated before the first record is delivered.
const FIRST_FETCH_ATTEMPTS: u32 = 3;

/// HTTP client for the PointDV API.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpBackend {
  client:        Client,
  base_url:      String,
  poll_interval: Duration,
}

impl HttpBackend {
  /// `poll_interval` is raised to at least one millisecond.
  pub fn new(base_url: impl Into<String>, poll_interval: Duration) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
    Ok(Self { client, base_url: base_url.into(), poll_interval })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.base_url.trim_end_matches('/'), path)
  }

  fn authed(&self, req: RequestBuilder, identity: &Identity) -> RequestBuilder {
    req.bearer_auth(identity.token.expose())
  }

  /// `GET /api/users/me`
  async fn fetch_me(&self, identity: &Identity) -> Result<Option<Profile>, ChannelError> {
    let resp = self
      .authed(self.client.get(self.url("/users/me")), identity)
      .send()
      .await
      .map_err(|e| ChannelError::Transient(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(channel_error(status, error_message(resp).await));
    }
    let body: MeResponse =
      resp.json().await.map_err(|e| ChannelError::Transient(format!("decoding profile: {e}")))?;
    Ok(body.user.and_then(|u| u.into_profile()))
  }
}

/// Validate an e-mail and trim it. Case is kept: the server compares stored
/// addresses verbatim.
fn outbound_email(email: &str) -> Result<&str, AuthError> {
  normalise_email(email)?;
  Ok(email.trim())
}

/// Read the `{ "error": … }` body of a failed response, if any.
async fn error_message(resp: Response) -> Option<String> {
  resp.json::<ErrorBody>().await.ok().map(|b| b.error)
}

// ─── Status mapping ──────────────────────────────────────────────────────────

fn rejected(status: StatusCode, message: Option<String>) -> String {
  message.unwrap_or_else(|| status.to_string())
}

/// `POST /api/auth/login`: unknown user and wrong password are both 400.
pub(crate) fn login_error(status: StatusCode, message: Option<String>) -> AuthError {
  match status {
    StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => AuthError::InvalidCredentials,
    _ => AuthError::Rejected(rejected(status, message)),
  }
}

/// `POST /api/auth/signup`: 400 means the e-mail is taken.
pub(crate) fn signup_error(status: StatusCode, message: Option<String>) -> AuthError {
  match status {
    StatusCode::BAD_REQUEST | StatusCode::CONFLICT => AuthError::EmailInUse,
    _ => AuthError::Rejected(rejected(status, message)),
  }
}

/// `POST /api/auth/change-password`: 400 means the current secret is wrong.
pub(crate) fn change_password_error(status: StatusCode, message: Option<String>) -> AuthError {
  match status {
    StatusCode::BAD_REQUEST => AuthError::InvalidCredentials,
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AuthError::Expired,
    _ => AuthError::Rejected(rejected(status, message)),
  }
}

/// `POST /api/auth/reset-password`: 404 means no such account.
pub(crate) fn reset_error(status: StatusCode, message: Option<String>) -> AuthError {
  match status {
    StatusCode::NOT_FOUND => AuthError::UnknownAccount,
    _ => AuthError::Rejected(rejected(status, message)),
  }
}

pub(crate) fn remote_error(status: StatusCode, message: Option<String>) -> RemoteError {
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::NotSignedIn,
    _ => RemoteError::Rejected(rejected(status, message)),
  }
}

/// A rejected token or a missing record reads as "not readable"; anything
/// else is worth retrying.
pub(crate) fn channel_error(status: StatusCode, message: Option<String>) -> ChannelError {
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
      ChannelError::PermissionDenied
    }
    _ => ChannelError::Transient(rejected(status, message)),
  }
}

fn network(e: reqwest::Error) -> AuthError { AuthError::Network(e.to_string()) }

// ─── CredentialService ───────────────────────────────────────────────────────

impl CredentialService for HttpBackend {
  async fn verify(&self, email: &str, secret: &str) -> Result<Verified, AuthError> {
    let email = outbound_email(email)?;
    let resp = self
      .client
      .post(self.url("/auth/login"))
      .json(&LoginBody { email, password: secret })
      .send()
      .await
      .map_err(network)?;

    let status = resp.status();
    if !status.is_success() {
      return Err(login_error(status, error_message(resp).await));
    }
    let body: LoginResponse =
      resp.json().await.map_err(|e| AuthError::Rejected(format!("decoding login: {e}")))?;

    let id = body
      .user
      .identity_id()
      .ok_or_else(|| AuthError::Rejected("login response without user id".into()))?;
    let account = body
      .user
      .into_profile()
      .ok_or_else(|| AuthError::Rejected("login response without account kind".into()))?;
    Ok(Verified { identity: Identity::new(id, AuthToken::new(body.token)), account })
  }

  async fn signup(&self, request: &SignupRequest) -> Result<IdentityId, AuthError> {
    let email = outbound_email(&request.email)?;
    if request.secret.len() < MIN_SECRET_LEN {
      return Err(AuthError::WeakSecret);
    }
    let resp = self
      .client
      .post(self.url("/auth/signup"))
      .json(&SignupBody::new(request, email))
      .send()
      .await
      .map_err(network)?;

    let status = resp.status();
    if !status.is_success() {
      return Err(signup_error(status, error_message(resp).await));
    }
    let body: SignupResponse =
      resp.json().await.map_err(|e| AuthError::Rejected(format!("decoding signup: {e}")))?;
    Ok(IdentityId::new(body.user.id.to_string()))
  }

  async fn change_password(&self, identity: &Identity, current: &str, new: &str) -> Result<(), AuthError> {
    if new.len() < MIN_SECRET_LEN {
      return Err(AuthError::WeakSecret);
    }
    let resp = self
      .authed(self.client.post(self.url("/auth/change-password")), identity)
      .json(&ChangePasswordBody { senha_atual: current, nova_senha: new })
      .send()
      .await
      .map_err(network)?;

    let status = resp.status();
    if !status.is_success() {
      return Err(change_password_error(status, error_message(resp).await));
    }
    Ok(())
  }

  async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
    let email = outbound_email(email)?;
    let resp = self
      .client
      .post(self.url("/auth/reset-password"))
      .json(&ResetBody { email })
      .send()
      .await
      .map_err(network)?;

    let status = resp.status();
    if !status.is_success() {
      return Err(reset_error(status, error_message(resp).await));
    }
    Ok(())
  }
}

// ─── ProfileChannel ──────────────────────────────────────────────────────────

impl ProfileChannel for HttpBackend {
  async fn subscribe(&self, identity: &Identity) -> Result<Subscription, ChannelError> {
    let mut tracker = PollTracker::default();
    let (tx, subscription) = feed();
    match tracker.observe(self.fetch_me(identity).await) {
      Step::Send(event) => {
        tx.send(event);
      }
      Step::Skip => debug!(identity = %identity.id, "first profile fetch failed; polling"),
      Step::Fail(e) => return Err(e),
    }
    tokio::spawn(poll(self.clone(), identity.clone(), tx, tracker));
    Ok(subscription)
  }

  async fn get(&self, identity: &Identity) -> Result<Option<Profile>, ChannelError> {
    self.fetch_me(identity).await
  }

  async fn update(&self, identity: &Identity, update: &ProfileUpdate) -> Result<(), RemoteError> {
    let resp = self
      .authed(self.client.put(self.url("/users/me")), identity)
      .json(&UpdateBody::from(update))
      .send()
      .await
      .map_err(|e| RemoteError::Network(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(remote_error(status, error_message(resp).await));
    }
    Ok(())
  }
}

fn event_for(profile: Option<Profile>) -> ChannelEvent {
  match profile {
    Some(profile) => ChannelEvent::Snapshot(profile),
    None => ChannelEvent::Absent,
  }
}

/// What one fetch result means for the feed.
#[derive(Debug, PartialEq)]
enum Step {
  Send(ChannelEvent),
  Skip,
  Fail(ChannelError),
}

/// Dedupes polled records and decides when a failure ends the channel.
///
/// Transient failures are retried. Before anything has been delivered only
/// [`FIRST_FETCH_ATTEMPTS`] of them are tolerated, so a channel that never
/// reaches the server still fails instead of leaving the session loading.
#[derive(Debug, Default)]
struct PollTracker {
  last:     Option<Option<Profile>>,
  failures: u32,
}

impl PollTracker {
  fn observe(&mut self, result: Result<Option<Profile>, ChannelError>) -> Step {
    match result {
      Ok(profile) if self.last.as_ref() == Some(&profile) => Step::Skip,
      Ok(profile) => {
        self.last = Some(profile.clone());
        Step::Send(event_for(profile))
      }
      Err(ChannelError::Transient(e)) => {
        if self.last.is_none() {
          self.failures += 1;
          if self.failures >= FIRST_FETCH_ATTEMPTS {
            return Step::Fail(ChannelError::Transient(e));
          }
        }
        debug!(error = %e, "profile fetch failed; retrying");
        Step::Skip
      }
      Err(e) => Step::Fail(e),
    }
  }
}

/// Re-read the record every `poll_interval` until the subscription is
/// cancelled, pushing it whenever it differs from the last one sent.
async fn poll(backend: HttpBackend, identity: Identity, tx: FeedSender, mut tracker: PollTracker) {
  let mut ticker = tokio::time::interval(backend.poll_interval);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  ticker.tick().await;

  loop {
    tokio::select! {
      _ = tx.cancelled() => break,
      _ = ticker.tick() => {}
    }

    let current = tokio::select! {
      _ = tx.cancelled() => break,
      current = backend.fetch_me(&identity) => current,
    };

    match tracker.observe(current) {
      Step::Send(event) => {
        if !tx.send(event) {
          break;
        }
      }
      Step::Skip => trace!(identity = %identity.id, "nothing new"),
      Step::Fail(e) => {
        tx.send(ChannelEvent::Failed(e));
        break;
      }
    }
  }
  debug!(identity = %identity.id, "profile poll stopped");
}

// ─── MembershipEndpoint ──────────────────────────────────────────────────────

fn membership_path(set: PreferenceSet) -> &'static str {
  match set {
    PreferenceSet::Favorites => "/users/favorites",
    PreferenceSet::Confirmed => "/users/confirmed",
  }
}

impl MembershipEndpoint for HttpBackend {
  async fn toggle_membership(
    &self,
    identity: &Identity,
    set: PreferenceSet,
    item: &EventId,
  ) -> Result<Membership, RemoteError> {
    let resp = self
      .authed(self.client.post(self.url(membership_path(set))), identity)
      .json(&ToggleBody { event_id: item.as_str() })
      .send()
      .await
      .map_err(|e| RemoteError::Network(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(remote_error(status, error_message(resp).await));
    }
    let body: ToggleResponse = resp.json().await.map_err(|e| RemoteError::Decode(e.to_string()))?;
    Ok(body.status)
  }
}
