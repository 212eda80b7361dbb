//! JSON bodies of the PointDV REST API.
//!
//! Field names follow the server's Portuguese schema. Numeric database ids are
//! accepted wherever the server may send them and kept as strings locally.

use std::{collections::BTreeSet, fmt};

use pointdv_core::{
  AccountKind, EventId, IdentityId, Membership, Profile, ProfileUpdate, SignupRequest,
};
use serde::{Deserialize, Serialize};

/// An id the server may encode as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
  Number(i64),
  Text(String),
}

impl fmt::Display for WireId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Number(n) => write!(f, "{n}"),
      Self::Text(s) => f.write_str(s),
    }
  }
}

// ─── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LoginBody<'a> {
  pub email:    &'a str,
  pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SignupBody<'a> {
  pub nome:     &'a str,
  pub email:    &'a str,
  pub password: &'a str,
  #[serde(rename = "tipoConta")]
  pub tipo_conta: AccountKind,
  #[serde(rename = "nomeNegocio", skip_serializing_if = "Option::is_none")]
  pub nome_negocio: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub telefone: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub endereco: Option<&'a str>,
}

impl<'a> SignupBody<'a> {
  /// Business fields are only sent for merchant accounts.
  pub fn new(request: &'a SignupRequest, email: &'a str) -> Self {
    let merchant = request.account_kind.has_business_details();
    Self {
      nome: &request.display_name,
      email,
      password: &request.secret,
      tipo_conta: request.account_kind,
      nome_negocio: request.business_name.as_deref().filter(|_| merchant),
      telefone: request.phone.as_deref().filter(|_| merchant),
      endereco: request.address.as_deref(),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ToggleBody<'a> {
  #[serde(rename = "eventId")]
  pub event_id: &'a str,
}

/// `PUT /api/users/me`. Absent fields are left unchanged by the server.
#[derive(Debug, Serialize)]
pub struct UpdateBody<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub nome: Option<&'a str>,
  #[serde(rename = "nomeNegocio", skip_serializing_if = "Option::is_none")]
  pub nome_negocio: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub telefone: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub endereco: Option<&'a str>,
  #[serde(rename = "fotoPerfil", skip_serializing_if = "Option::is_none")]
  pub foto_perfil: Option<&'a str>,
}

impl<'a> From<&'a ProfileUpdate> for UpdateBody<'a> {
  fn from(update: &'a ProfileUpdate) -> Self {
    Self {
      nome:         update.display_name.as_deref(),
      nome_negocio: update.business_name.as_deref(),
      telefone:     update.phone.as_deref(),
      endereco:     update.address.as_deref(),
      foto_perfil:  update.photo.as_deref(),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordBody<'a> {
  #[serde(rename = "senhaAtual")]
  pub senha_atual: &'a str,
  #[serde(rename = "novaSenha")]
  pub nova_senha:  &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResetBody<'a> {
  pub email: &'a str,
}

// ─── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
  pub token: String,
  pub user:  WireUser,
}

#[derive(Debug, Deserialize)]
pub struct MeResponse {
  pub user: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
pub struct SignupResponse {
  pub user: CreatedUser,
}

#[derive(Debug, Deserialize)]
pub struct CreatedUser {
  pub id: WireId,
}

#[derive(Debug, Deserialize)]
pub struct ToggleResponse {
  pub status: Membership,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
  pub error: String,
}

/// The user record as returned by login and `GET /api/users/me`.
#[derive(Debug, Deserialize)]
pub struct WireUser {
  pub id:    Option<WireId>,
  pub nome:  Option<String>,
  pub email: Option<String>,
  #[serde(rename = "tipoConta")]
  pub tipo_conta: Option<AccountKind>,
  #[serde(rename = "nomeNegocio")]
  pub nome_negocio: Option<String>,
  pub telefone: Option<String>,
  pub endereco: Option<String>,
  #[serde(rename = "fotoPerfil")]
  pub foto_perfil: Option<String>,
  #[serde(default)]
  pub favoritos: Vec<WireId>,
  #[serde(default, rename = "eventosConfirmados")]
  pub eventos_confirmados: Vec<WireId>,
}

impl WireUser {
  pub fn identity_id(&self) -> Option<IdentityId> {
    self.id.as_ref().map(|id| IdentityId::new(id.to_string()))
  }

  /// `None` when the record carries no account kind, i.e. the user row is
  /// missing and only the preference lists came back.
  pub fn into_profile(self) -> Option<Profile> {
    let kind = self.tipo_conta?;
    let mut profile = Profile::new(self.nome.unwrap_or_default(), kind);
    profile.email = self.email;
    profile.address = self.endereco;
    profile.photo = self.foto_perfil;
    profile.business_name = self.nome_negocio;
    profile.phone = self.telefone;
    profile.favorited_ids = event_ids(self.favoritos);
    profile.confirmed_ids = event_ids(self.eventos_confirmados);
    Some(profile)
  }
}

fn event_ids(ids: Vec<WireId>) -> BTreeSet<EventId> {
  ids.into_iter().map(|id| EventId::new(id.to_string())).collect()
}
