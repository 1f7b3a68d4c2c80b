use serde::{Deserialize, Serialize};

/// Default OAuth scope requested for Google Cloud credentials.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Where a trigger gets its broker credentials from.
///
/// The trigger runtime never builds credentials itself; it hands these
/// settings to a `CredentialsProvider`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsDef {
  /// Project the topic and subscription live in.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub project_id: Option<String>,

  /// Service account key (JSON contents), if not using ambient credentials.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub service_account: Option<String>,

  /// Service account to impersonate.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub impersonated_service_account: Option<String>,

  #[serde(default = "default_scopes")]
  pub scopes: Vec<String>,
}

impl Default for CredentialsDef {
  fn default() -> Self {
    Self {
      project_id: None,
      service_account: None,
      impersonated_service_account: None,
      scopes: default_scopes(),
    }
  }
}

fn default_scopes() -> Vec<String> {
  vec![CLOUD_PLATFORM_SCOPE.to_string()]
}
