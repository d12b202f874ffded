//! Turns Pod admission requests into admission responses.
//!
//! Fetching the ServiceAccount is left to the caller, which keeps everything
//! in here free of I/O. Use [`service_account_name`] to find out which
//! ServiceAccount (in the namespace of the request) is needed.
use std::{error::Error as StdError, fmt::Write};

use k8s_openapi::api::core::v1::{Pod, ServiceAccount};
use kube::{
    ResourceExt,
    core::{
        Status,
        admission::{AdmissionRequest, AdmissionResponse, SerializePatchError},
    },
};
use snafu::{ResultExt, Snafu};
use tracing::{debug, instrument, warn};

use crate::{
    identity::{self, IdentityConfig},
    mutator::{self, PodMutator},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "failed to resolve the workload identity config of ServiceAccount {service_account:?}"
    ))]
    ResolveIdentityConfig {
        source: identity::Error,
        service_account: String,
    },

    #[snafu(display("failed to mutate Pod"))]
    MutatePod { source: mutator::Error },

    #[snafu(display("failed to serialize Pod to JSON"))]
    SerializePod { source: serde_json::Error },

    #[snafu(display("failed to serialize JSON patch"))]
    SerializePatch { source: SerializePatchError },
}

impl Error {
    /// Invalid annotations are the client's fault, failing serialization is
    /// ours.
    pub fn http_return_code(&self) -> u16 {
        match self {
            Self::ResolveIdentityConfig { .. } | Self::MutatePod { .. } => 400,
            Self::SerializePod { .. } | Self::SerializePatch { .. } => 500,
        }
    }

    fn status_reason(&self) -> &'static str {
        match self.http_return_code() {
            400 => "BadRequest",
            _ => "InternalError",
        }
    }

    /// The message of this error and all of its sources, separated by colons.
    pub fn as_human_readable_error_message(&self) -> String {
        let mut error_message = self.to_string();

        let mut source = self.source();
        while let Some(err) = source {
            write!(error_message, ": {err}").expect("Writing to Strings can not fail");
            source = err.source();
        }

        error_message
    }
}

/// The name of the ServiceAccount the Pod runs as, if any. Mirror Pods
/// created by the kubelet have none.
pub fn service_account_name(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.service_account_name.as_deref())
        .filter(|name| !name.is_empty())
}

/// Answers a Pod admission request.
///
/// The request is always allowed, unless the ServiceAccount carries an invalid
/// workload identity config or the Pod can't be mutated. If the
/// ServiceAccount is configured for workload identity, the response contains
/// the JSON patch transforming the Pod into the mutated one.
#[instrument(
    skip_all,
    fields(
        request.uid = %request.uid,
        request.namespace = request.namespace.as_deref(),
        request.name = %request.name,
    )
)]
pub fn mutate_pod_request(
    mutator: &PodMutator,
    request: &AdmissionRequest<Pod>,
    service_account: Option<&ServiceAccount>,
) -> AdmissionResponse {
    match try_mutate_pod_request(mutator, request, service_account) {
        Ok(response) => response,
        Err(err) => {
            let message = err.as_human_readable_error_message();
            let code = err.http_return_code();
            warn!(error = %message, code, "denying Pod admission");

            let mut response = AdmissionResponse::from(request).deny(&message);
            response.result = Status::failure(&message, err.status_reason()).with_code(code);
            response
        }
    }
}

fn try_mutate_pod_request(
    mutator: &PodMutator,
    request: &AdmissionRequest<Pod>,
    service_account: Option<&ServiceAccount>,
) -> Result<AdmissionResponse, Error> {
    let response = AdmissionResponse::from(request);

    let Some(pod) = &request.object else {
        debug!("admission request contains no Pod, allowing");
        return Ok(response);
    };

    let Some(service_account_name) = service_account_name(pod) else {
        debug!("Pod has no ServiceAccount (probably a mirror Pod), skipping");
        return Ok(response);
    };

    let Some(service_account) = service_account else {
        debug!(
            service_account = service_account_name,
            "ServiceAccount not found, skipping"
        );
        return Ok(response);
    };

    match pod_patch(mutator, pod, service_account)? {
        Some(patch) => response.with_patch(patch).context(SerializePatchSnafu),
        None => Ok(response),
    }
}

/// Computes the JSON patch which injects the workload identity configured on
/// `service_account` into `pod`.
///
/// Returns `Ok(None)` if the ServiceAccount isn't configured for workload
/// identity.
pub fn pod_patch(
    mutator: &PodMutator,
    pod: &Pod,
    service_account: &ServiceAccount,
) -> Result<Option<json_patch::Patch>, Error> {
    let config = IdentityConfig::from_service_account(
        &mutator.settings().annotation_domain,
        service_account,
    )
    .with_context(|_| ResolveIdentityConfigSnafu {
        service_account: service_account.name_any(),
    })?;
    let Some(config) = config else {
        return Ok(None);
    };

    let mutated = mutator.mutate(pod, &config).context(MutatePodSnafu)?;

    let original = serde_json::to_value(pod).context(SerializePodSnafu)?;
    let mutated = serde_json::to_value(&mutated).context(SerializePodSnafu)?;
    Ok(Some(json_patch::diff(&original, &mutated)))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn pod(yaml: &str) -> Pod {
        serde_yaml::from_str(yaml).expect("test YAML is valid")
    }

    #[test]
    fn service_account_name_of_regular_pod() {
        let pod = pod(indoc! {"
            metadata:
              name: app
            spec:
              serviceAccountName: app
              containers: []
        "});
        assert_eq!(service_account_name(&pod), Some("app"));
    }

    #[test]
    fn service_account_name_of_mirror_pod() {
        let without = pod(indoc! {"
            metadata:
              name: static-web
            spec:
              containers: []
        "});
        let empty = pod(indoc! {"
            metadata:
              name: static-web
            spec:
              serviceAccountName: ''
              containers: []
        "});

        assert_eq!(service_account_name(&without), None);
        assert_eq!(service_account_name(&empty), None);
    }

    #[test]
    fn error_message_contains_all_sources() {
        let service_account: ServiceAccount = serde_yaml::from_str(indoc! {"
            metadata:
              name: app
              annotations:
                cloud.google.com/workload-identity-provider: my-provider
        "})
        .expect("test YAML is valid");
        let pod = pod(indoc! {"
            metadata:
              name: app
            spec:
              serviceAccountName: app
              containers: []
        "});

        let err = pod_patch(&PodMutator::default(), &pod, &service_account).unwrap_err();

        assert_eq!(err.http_return_code(), 400);
        assert_eq!(
            err.as_human_readable_error_message(),
            "failed to resolve the workload identity config of ServiceAccount \"app\": \
            cloud.google.com/workload-identity-provider must be form of \
            projects/{ProjectNumber}/locations/{Location}/workloadIdentityPools/{PoolId}/providers/{ProviderId}"
        );
    }

    #[test]
    fn invalid_pod_annotation_is_a_bad_request() {
        let service_account: ServiceAccount = serde_yaml::from_str(indoc! {"
            metadata:
              name: app
              annotations:
                cloud.google.com/workload-identity-provider: projects/123/locations/global/workloadIdentityPools/p/providers/q
        "})
        .expect("test YAML is valid");
        let pod = pod(indoc! {"
            metadata:
              name: app
              annotations:
                cloud.google.com/token-expiration: 1d
            spec:
              serviceAccountName: app
              containers: []
        "});

        let err = pod_patch(&PodMutator::default(), &pod, &service_account).unwrap_err();

        assert!(matches!(err, Error::MutatePod { .. }));
        assert_eq!(err.http_return_code(), 400);
        assert_eq!(err.status_reason(), "BadRequest");
    }

    #[test]
    fn serialization_failure_is_an_internal_error() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::SerializePod { source };

        assert_eq!(err.http_return_code(), 500);
        assert_eq!(err.status_reason(), "InternalError");
    }

    #[test]
    fn no_patch_without_provider() {
        let service_account = ServiceAccount::default();
        let pod = pod(indoc! {"
            metadata:
              name: app
            spec:
              serviceAccountName: default
              containers: []
        "});

        let patch = pod_patch(&PodMutator::default(), &pod, &service_account).unwrap();
        assert!(patch.is_none());
    }
}
