//! Resolves the workload identity configuration of a ServiceAccount from its
//! annotations.
use std::{collections::BTreeMap, num::ParseIntError, str::FromStr, sync::LazyLock};

use k8s_openapi::api::core::v1::ServiceAccount;
use regex::Regex;
use snafu::{ResultExt, Snafu, ensure};
use strum::{Display, EnumString};
use tracing::debug;

use crate::annotations::{self, AnnotationDomain};

/// The format every workload identity provider annotation must follow.
pub const WORKLOAD_IDENTITY_PROVIDER_FORMAT: &str = "projects/{ProjectNumber}/locations/{Location}/workloadIdentityPools/{PoolId}/providers/{ProviderId}";

static WORKLOAD_IDENTITY_PROVIDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^projects/.+/locations/.+/workloadIdentityPools/.+/providers/.+$")
        .expect("failed to compile workload identity provider regex")
});

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("{key} must be positive integer string"))]
    ParseIntegerAnnotation { source: ParseIntError, key: String },

    #[snafu(display("{key} mode must be 'direct', 'gcloud' or unset, got {value:?}"))]
    InvalidInjectionMode {
        source: strum::ParseError,
        key: String,
        value: String,
    },

    #[snafu(display("{key} must be form of {WORKLOAD_IDENTITY_PROVIDER_FORMAT}"))]
    InvalidWorkloadIdentityProvider { key: String },
}

/// Selects how the credentials end up in the containers.
///
/// [`InjectionMode::Undefined`] behaves exactly like [`InjectionMode::GCloud`],
/// it only records that no explicit choice was made.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum InjectionMode {
    #[default]
    #[strum(serialize = "")]
    Undefined,

    /// A `gcloud` init container creates the credential configuration at Pod
    /// start and logs in.
    #[strum(serialize = "gcloud")]
    GCloud,

    /// The credential configuration is rendered into a Pod annotation and
    /// exposed as a file via the downward API.
    #[strum(serialize = "direct")]
    Direct,
}

impl InjectionMode {
    /// Whether the gcloud setup init container and config volume are used.
    pub fn uses_gcloud(self) -> bool {
        match self {
            Self::Undefined | Self::GCloud => true,
            Self::Direct => false,
        }
    }
}

/// Workload identity settings declared on a ServiceAccount.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Full resource name of the workload identity pool provider.
    pub workload_identity_provider: String,

    /// The GCP service account to impersonate. May be empty.
    pub service_account_email: String,

    pub audience: Option<String>,
    pub token_expiration_seconds: Option<i64>,
    pub run_as_user: Option<i64>,
    pub injection_mode: InjectionMode,
}

impl IdentityConfig {
    /// Resolves the config from the annotations of `service_account`.
    ///
    /// See [`IdentityConfig::from_annotations`] for details.
    pub fn from_service_account(
        domain: &AnnotationDomain,
        service_account: &ServiceAccount,
    ) -> Result<Option<Self>> {
        match &service_account.metadata.annotations {
            Some(annotations) => Self::from_annotations(domain, annotations),
            None => Ok(None),
        }
    }

    /// Resolves the config from ServiceAccount annotations.
    ///
    /// Returns `Ok(None)` if the workload identity provider annotation is
    /// absent, in which case no other annotation is looked at. Malformed
    /// values of any present annotation are reported as errors.
    pub fn from_annotations(
        domain: &AnnotationDomain,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Option<Self>> {
        let provider_key = domain.key(annotations::WORKLOAD_IDENTITY_PROVIDER);
        let Some(workload_identity_provider) = annotations.get(&provider_key) else {
            debug!(
                annotation = provider_key,
                "ServiceAccount has no workload identity provider annotation"
            );
            return Ok(None);
        };

        let service_account_email = annotations
            .get(&domain.key(annotations::SERVICE_ACCOUNT_EMAIL))
            .cloned()
            .unwrap_or_default();
        let audience = annotations.get(&domain.key(annotations::AUDIENCE)).cloned();
        let token_expiration_seconds =
            parse_integer_annotation(domain, annotations, annotations::TOKEN_EXPIRATION)?;
        let run_as_user = parse_integer_annotation(domain, annotations, annotations::RUN_AS_USER)?;

        let injection_mode_key = domain.key(annotations::INJECTION_MODE);
        let injection_mode = match annotations.get(&injection_mode_key) {
            Some(value) => {
                InjectionMode::from_str(value).with_context(|_| InvalidInjectionModeSnafu {
                    key: injection_mode_key.clone(),
                    value: value.clone(),
                })?
            }
            None => InjectionMode::Undefined,
        };

        ensure!(
            WORKLOAD_IDENTITY_PROVIDER_REGEX.is_match(workload_identity_provider),
            InvalidWorkloadIdentityProviderSnafu { key: provider_key }
        );

        Ok(Some(Self {
            workload_identity_provider: workload_identity_provider.clone(),
            service_account_email,
            audience,
            token_expiration_seconds,
            run_as_user,
            injection_mode,
        }))
    }
}

/// Parses the annotation `name` as a signed 64-bit integer, if present.
pub(crate) fn parse_integer_annotation(
    domain: &AnnotationDomain,
    annotations: &BTreeMap<String, String>,
    name: &str,
) -> Result<Option<i64>> {
    let key = domain.key(name);
    annotations
        .get(&key)
        .map(|value| value.parse::<i64>())
        .transpose()
        .context(ParseIntegerAnnotationSnafu { key })
}
