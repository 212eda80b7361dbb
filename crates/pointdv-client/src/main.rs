//! `pointdv`: command-line harness for the PointDV session core.
//!
//! Every run boots a controller, restores the persisted session, performs one
//! command and tears the controller down.
//!
//! # Usage
//!
//! ```text
//! pointdv login --email ana@example.com --password secret1
//! pointdv favorite 42
//! pointdv watch
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pointdv_client::{ClientConfig, HttpBackend, expand_tilde};
use pointdv_core::{AccountKind, AuthError, EventId, Membership, ProfileUpdate, SignupRequest};
use pointdv_session::{AuthTransitionController, NavigationGate, SessionState, ToggleOutcome};
use pointdv_store_sqlite::SqliteTokenStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

type Controller = AuthTransitionController<HttpBackend, SqliteTokenStore>;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pointdv", author, version, about = "PointDV session client")]
struct Cli {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE", default_value = "~/.config/pointdv/config.toml")]
  config: PathBuf,

  /// Base URL of the PointDV API; overrides the config file.
  #[arg(long, env = "POINTDV_URL")]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Sign in and remember the session.
  Login {
    #[arg(long)]
    email:    String,
    #[arg(long, env = "POINTDV_PASSWORD", hide_env_values = true)]
    password: String,
  },
  /// Forget the session.
  Logout,
  /// Show the current session.
  Status,
  /// Toggle an event in the favorites.
  Favorite { event: String },
  /// Toggle attendance confirmation for an event.
  Confirm { event: String },
  /// Create an account. Does not sign in.
  Signup {
    #[arg(long)]
    name:          String,
    #[arg(long)]
    email:         String,
    #[arg(long, env = "POINTDV_PASSWORD", hide_env_values = true)]
    password:      String,
    #[arg(long, value_enum, default_value_t = Kind::Consumer)]
    kind:          Kind,
    #[arg(long)]
    business_name: Option<String>,
    #[arg(long)]
    phone:         Option<String>,
    #[arg(long)]
    address:       Option<String>,
  },
  /// Edit profile fields of the signed-in account.
  EditProfile {
    #[arg(long)]
    name:          Option<String>,
    #[arg(long)]
    photo:         Option<String>,
    #[arg(long)]
    business_name: Option<String>,
    #[arg(long)]
    phone:         Option<String>,
    #[arg(long)]
    address:       Option<String>,
  },
  ChangePassword {
    #[arg(long)]
    current: String,
    #[arg(long)]
    new:     String,
  },
  ResetPassword {
    #[arg(long)]
    email: String,
  },
  /// Print every session change until Ctrl-C.
  Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
  Consumer,
  Merchant,
}

impl From<Kind> for AccountKind {
  fn from(kind: Kind) -> Self {
    match kind {
      Kind::Consumer => AccountKind::Consumer,
      Kind::Merchant => AccountKind::Merchant,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config_path = expand_tilde(&cli.config);
  let mut config = ClientConfig::load(Some(&config_path))
    .with_context(|| format!("failed to read config from {config_path:?}"))?;
  if let Some(url) = cli.url {
    config.base_url = url;
  }

  let backend = HttpBackend::new(config.base_url.clone(), config.poll_interval())
    .context("failed to build HTTP client")?;
  let store_path = config.store_path();
  let tokens = SqliteTokenStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open credential store at {store_path:?}"))?;

  let controller = Controller::new(Arc::new(backend), tokens, config.session_config());
  controller.restore_session().await;

  let result = run(&controller, cli.command).await;
  controller.dispose();
  result
}

async fn run(controller: &Controller, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Login { email, password } => {
      let id = controller.login(&email, &password).await.map_err(auth_failure)?;
      println!("signed in as {id}");
      print_state(&controller.snapshot());
    }
    Command::Logout => {
      controller.logout().await;
      println!("signed out");
    }
    Command::Status => print_state(&settled(controller).await),
    Command::Favorite { event } => {
      settled(controller).await;
      let id = EventId::new(event);
      report(&id, controller.toggle_favorite(id.clone()).await).await?;
    }
    Command::Confirm { event } => {
      settled(controller).await;
      let id = EventId::new(event);
      report(&id, controller.toggle_confirmed(id.clone()).await).await?;
    }
    Command::Signup { name, email, password, kind, business_name, phone, address } => {
      let request = SignupRequest {
        display_name: name,
        email,
        secret: password,
        account_kind: kind.into(),
        business_name,
        phone,
        address,
      };
      controller.signup(&request).await.map_err(auth_failure)?;
      println!("account created; sign in with `pointdv login`");
    }
    Command::EditProfile { name, photo, business_name, phone, address } => {
      let update = ProfileUpdate { display_name: name, photo, business_name, phone, address };
      controller.update_profile(&update).await.context("profile update failed")?;
      println!("profile updated");
    }
    Command::ChangePassword { current, new } => {
      controller.change_password(&current, &new).await.map_err(auth_failure)?;
      println!("password changed");
    }
    Command::ResetPassword { email } => {
      controller.request_password_reset(&email).await.map_err(auth_failure)?;
      println!("reset link sent to {email}");
    }
    Command::Watch => watch(controller).await?,
  }
  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn auth_failure(e: AuthError) -> anyhow::Error {
  let message = e.user_message();
  anyhow::Error::new(e).context(message)
}

/// Wait for the restored session to leave the loading phases.
async fn settled(controller: &Controller) -> SessionState {
  let mut rx = controller.state();
  let waited = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| !s.is_auth_loading()))
    .await
    .ok()
    .and_then(|r| r.ok().map(|s| s.clone()));
  match waited {
    Some(state) => state,
    None => {
      tracing::warn!("profile did not arrive in time");
      controller.snapshot()
    }
  }
}

async fn report(item: &EventId, outcome: ToggleOutcome) -> anyhow::Result<()> {
  match outcome {
    ToggleOutcome::NoSession => bail!("not signed in"),
    ToggleOutcome::NoSnapshot => bail!("profile not loaded yet"),
    ToggleOutcome::Unconfirmed => bail!("the server did not accept the change"),
    ToggleOutcome::Confirmed(membership) => println!("{item}: {}", describe(membership)),
    ToggleOutcome::Optimistic { membership, remote } => {
      println!("{item}: {} (pending)", describe(membership));
      remote.await.context("background toggle panicked")?;
    }
  }
  Ok(())
}

fn describe(membership: Membership) -> &'static str {
  match membership {
    Membership::Added => "added",
    Membership::Removed => "removed",
  }
}

async fn watch(controller: &Controller) -> anyhow::Result<()> {
  let mut rx = controller.state();
  print_state(&rx.borrow_and_update());
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      changed = rx.changed() => {
        if changed.is_err() {
          break;
        }
        let state = rx.borrow_and_update().clone();
        print_state(&state);
      }
    }
  }
  Ok(())
}

fn print_state(state: &SessionState) {
  match (state.gate(), state.identity_id()) {
    (NavigationGate::Hold, _) => println!("loading…"),
    (NavigationGate::SignIn, None) => println!("signed out"),
    (NavigationGate::SignIn, Some(id)) => println!("signed in as {id}; profile unavailable"),
    (NavigationGate::Home(kind), id) => {
      let name = state.profile.as_ref().map_or("", |p| p.display_name.as_str());
      let id = id.map(|i| i.to_string()).unwrap_or_default();
      println!("{name} ({id}), {}", kind.as_str());
      let favorites: Vec<&str> = state.favorited_ids().iter().map(EventId::as_str).collect();
      println!("  favorites: [{}]", favorites.join(", "));
      println!("  confirmed: {}", state.confirmed_ids().len());
      println!("  link:      {:?}", state.link);
    }
  }
}
