//! The `external_account` credential configuration consumed by `gcloud` and the
//! Google client libraries.
//!
//! Field names, nesting and the `text` format tag are an external contract, see
//! <https://google.aip.dev/auth/4117>. Serialization is deterministic: keys are
//! emitted in declaration order.
use serde::Serialize;
use snafu::{ResultExt, Snafu};

use crate::constants::{IAM_AUDIENCE_PREFIX, sa_token_path};

pub const EXTERNAL_ACCOUNT_TYPE: &str = "external_account";
pub const JWT_SUBJECT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";
pub const STS_TOKEN_URL: &str = "https://sts.googleapis.com/v1/token";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize external account credentials to JSON"))]
    SerializeCredentials { source: serde_json::Error },
}

/// Configuration for fetching tokens with external credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExternalAccountCredentials {
    /// Always `external_account`.
    #[serde(rename = "type")]
    pub type_: String,

    /// The STS audience, i.e. the resource name of the workload identity pool
    /// provider prefixed with `//iam.googleapis.com/`.
    pub audience: String,

    pub subject_token_type: String,

    /// The STS token exchange endpoint.
    pub token_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_info_url: Option<String>,

    pub service_account_impersonation_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_impersonation_lifetime_seconds: Option<i64>,

    pub credential_source: CredentialSource,
}

/// Where the subject token is read from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CredentialSource {
    pub file: String,
    pub format: CredentialFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CredentialFormat {
    /// Either `text` or `json`.
    #[serde(rename = "type")]
    pub type_: String,
}

impl ExternalAccountCredentials {
    /// Creates credentials for the given (already prefixed) `audience`, which
    /// impersonate `service_account_email` using the projected Kubernetes
    /// service account token.
    pub fn new(audience: impl Into<String>, service_account_email: &str) -> Self {
        Self {
            type_: EXTERNAL_ACCOUNT_TYPE.to_owned(),
            audience: audience.into(),
            subject_token_type: JWT_SUBJECT_TOKEN_TYPE.to_owned(),
            token_url: STS_TOKEN_URL.to_owned(),
            token_info_url: None,
            service_account_impersonation_url: impersonation_url(service_account_email),
            service_account_impersonation_lifetime_seconds: None,
            credential_source: CredentialSource {
                file: sa_token_path(),
                format: CredentialFormat {
                    type_: "text".to_owned(),
                },
            },
        }
    }

    /// Creates credentials for a workload identity provider resource name like
    /// `projects/123/locations/global/workloadIdentityPools/p/providers/q`.
    pub fn for_provider(workload_identity_provider: &str, service_account_email: &str) -> Self {
        Self::new(
            format!("{IAM_AUDIENCE_PREFIX}{workload_identity_provider}"),
            service_account_email,
        )
    }

    /// Renders the credentials as JSON. Set `indent` to pretty print with two
    /// spaces of indentation.
    pub fn render(&self, indent: bool) -> Result<String, Error> {
        if indent {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
        .context(SerializeCredentialsSnafu)
    }
}

fn impersonation_url(service_account_email: &str) -> String {
    format!(
        "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/{service_account_email}:generateAccessToken"
    )
}
