use async_trait::async_trait;
use fuschia_trigger_config::CredentialsDef;

use crate::error::PubSubError;

/// Resolved credentials handed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
  pub project_id: Option<String>,
  /// Identity the subscriber acts as.
  pub principal: String,
  pub scopes: Vec<String>,
}

/// Turns credential settings into [`Credentials`].
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
  async fn credentials(&self, def: &CredentialsDef) -> Result<Credentials, PubSubError>;
}

/// Credentials taken directly from the settings, without contacting any
/// identity service.
///
/// The principal is the impersonated account if set, then the service
/// account, then `application-default`.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials;

#[async_trait]
impl CredentialsProvider for StaticCredentials {
  async fn credentials(&self, def: &CredentialsDef) -> Result<Credentials, PubSubError> {
    if let Some(key) = &def.service_account
      && key.trim().is_empty()
    {
      return Err(PubSubError::credentials("service account key is empty"));
    }

    let principal = def
      .impersonated_service_account
      .clone()
      .or_else(|| def.service_account.as_ref().map(|_| "service-account".to_string()))
      .unwrap_or_else(|| "application-default".to_string());

    Ok(Credentials {
      project_id: def.project_id.clone(),
      principal,
      scopes: def.scopes.clone(),
    })
  }
}
