//! Annotation keys understood (and written) by the mutator.
//!
//! All keys share a configurable domain prefix, e.g. `cloud.google.com`, which
//! results in keys like `cloud.google.com/workload-identity-provider`. The
//! domain is validated once, using the same rules Kubernetes applies to the
//! prefix segment of annotation keys.
//!
//! See <https://kubernetes.io/docs/concepts/overview/working-with-objects/annotations/>
//! for more information on Kubernetes annotations.
use std::{fmt::Display, ops::Deref, str::FromStr, sync::LazyLock};

use regex::Regex;
use snafu::{Snafu, ensure};

use crate::constants::DEFAULT_ANNOTATION_DOMAIN;

/// Name of the annotation holding the full workload identity provider resource
/// name. Read from the ServiceAccount, written to the Pod.
pub const WORKLOAD_IDENTITY_PROVIDER: &str = "workload-identity-provider";

/// Name of the annotation holding the GCP service account email to impersonate.
pub const SERVICE_ACCOUNT_EMAIL: &str = "service-account-email";

/// Name of the audience annotation. The Pod value wins over the ServiceAccount
/// value.
pub const AUDIENCE: &str = "audience";

/// UserID used as `securityContext.runAsUser` of the gcloud setup container.
pub const RUN_AS_USER: &str = "gcloud-run-as-user";

/// Token expiration in seconds. The Pod value wins over the ServiceAccount
/// value.
pub const TOKEN_EXPIRATION: &str = "token-expiration";

/// Comma-separated list of (init) container names which are left untouched.
pub const SKIP_CONTAINERS: &str = "skip-containers";

/// Selects how credentials are delivered, either `gcloud` or `direct`.
pub const INJECTION_MODE: &str = "injection-mode";

/// Carries the rendered `external_account` credentials in direct mode. It is
/// exposed to the containers via a downward API volume.
pub const EXTERNAL_CREDENTIALS_JSON: &str = "external-credential-config-json";

const DOMAIN_MAX_LEN: usize = 253;

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z](\.?[a-zA-Z0-9-])*\.[a-zA-Z]{2,}\.?$")
        .expect("failed to compile annotation domain regex")
});

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum AnnotationDomainError {
    #[snafu(display("annotation domain cannot be empty"))]
    DomainEmpty,

    #[snafu(display(
        "annotation domain exceeds the maximum length - expected 253 characters or less, got {length}"
    ))]
    DomainTooLong { length: usize },

    #[snafu(display("annotation domain contains non-ascii characters"))]
    DomainNotAscii,

    #[snafu(display("annotation domain {domain:?} violates the kubernetes key prefix format"))]
    DomainInvalid { domain: String },
}

/// A validated domain which prefixes every annotation key.
///
/// Instances of this struct are always valid. Read-only access to the inner
/// value is provided via [`Deref`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationDomain(String);

impl FromStr for AnnotationDomain {
    type Err = AnnotationDomainError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();

        ensure!(!input.is_empty(), DomainEmptySnafu);
        ensure!(
            input.len() <= DOMAIN_MAX_LEN,
            DomainTooLongSnafu {
                length: input.len()
            }
        );
        ensure!(input.is_ascii(), DomainNotAsciiSnafu);
        ensure!(
            DOMAIN_REGEX.is_match(input),
            DomainInvalidSnafu { domain: input }
        );

        Ok(Self(input.to_owned()))
    }
}

impl Default for AnnotationDomain {
    fn default() -> Self {
        Self(DEFAULT_ANNOTATION_DOMAIN.to_owned())
    }
}

impl Deref for AnnotationDomain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for AnnotationDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AnnotationDomain {
    /// Returns the fully-qualified annotation key `<domain>/<name>`.
    ///
    /// ```
    /// use gcp_workload_identity_webhook::annotations::{AnnotationDomain, AUDIENCE};
    ///
    /// let domain = AnnotationDomain::default();
    /// assert_eq!(domain.key(AUDIENCE), "cloud.google.com/audience");
    /// ```
    pub fn key(&self, name: &str) -> String {
        format!("{}/{name}", self.0)
    }
}
