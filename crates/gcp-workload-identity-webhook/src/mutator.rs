//! Injects workload identity federation credentials into Pods.
//!
//! The [`PodMutator`] is the core of the webhook. Given a Pod and the
//! [`IdentityConfig`] of its ServiceAccount, it returns a new Pod which
//!
//! - carries the effective settings as annotations,
//! - has a projected service account token volume bound to the STS audience,
//! - depending on the [`InjectionMode`], either runs a gcloud setup init
//!   container or exposes a rendered credential configuration via the
//!   downward API,
//! - mounts all of the above into every container not listed in the
//!   skip-containers annotation.
//!
//! Mutating an already mutated Pod yields the same Pod again.
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::LazyLock,
};

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use regex::Regex;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info, instrument};

use crate::{
    annotations::{self, AnnotationDomain},
    artifacts::{self, SetupContainerParams},
    constants::GCLOUD_SETUP_CONTAINER_NAME,
    credentials::{self, ExternalAccountCredentials},
    identity::{self, IdentityConfig, InjectionMode, parse_integer_annotation},
    merge::{add_if_absent_by_name, add_or_replace_by_name, prepend_or_replace_by_name},
    settings::MutatorSettings,
};

static SERVICE_ACCOUNT_PROJECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(.*).iam.gserviceaccount.com")
        .expect("failed to compile service account project regex")
});

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse the token expiration annotation of the Pod"))]
    ParseTokenExpiration { source: identity::Error },

    #[snafu(display("failed to render the external credential configuration"))]
    RenderCredentials { source: credentials::Error },
}

/// Mutates Pods according to the [`MutatorSettings`] it was created with.
///
/// The mutator holds no mutable state, so a single instance can be shared
/// between all admission requests.
#[derive(Clone, Debug, Default)]
pub struct PodMutator {
    settings: MutatorSettings,
}

/// The values resolved from the Pod, the [`IdentityConfig`] and the defaults,
/// in that order of precedence.
#[derive(Debug)]
struct EffectiveValues {
    audience: String,
    token_expiration_seconds: i64,
    project: String,
    credentials_json: Option<String>,
}

impl PodMutator {
    pub fn new(settings: MutatorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MutatorSettings {
        &self.settings
    }

    /// Returns a copy of `pod` with the workload identity artifacts for
    /// `config` injected.
    ///
    /// Everything that can fail is resolved before the copy is made, so on
    /// error no partially mutated Pod exists.
    #[instrument(
        skip(self, pod, config),
        fields(
            pod.namespace = pod.metadata.namespace.as_deref(),
            pod.name = pod.metadata.name.as_deref(),
            pod.generate_name = pod.metadata.generate_name.as_deref(),
        )
    )]
    pub fn mutate(&self, pod: &Pod, config: &IdentityConfig) -> Result<Pod> {
        let domain = &self.settings.annotation_domain;
        let empty_annotations = BTreeMap::new();
        let pod_annotations = pod
            .metadata
            .annotations
            .as_ref()
            .unwrap_or(&empty_annotations);

        let effective = self.resolve_effective_values(pod_annotations, config)?;
        let skip_containers = skip_containers(domain, pod_annotations);

        if config.injection_mode == InjectionMode::Undefined {
            debug!("no injection mode configured, falling back to gcloud");
        }

        let mut pod = pod.clone();
        write_annotations(
            pod.metadata.annotations.get_or_insert_with(BTreeMap::new),
            domain,
            config,
            &effective,
        );

        let spec = pod.spec.get_or_insert_with(PodSpec::default);
        let volumes = spec.volumes.get_or_insert_with(Vec::new);
        for volume in artifacts::volumes(
            domain,
            &effective.audience,
            effective.token_expiration_seconds,
            self.settings.default_mode,
            config.injection_mode,
        ) {
            add_or_replace_by_name(volumes, volume);
        }

        if config.injection_mode.uses_gcloud() {
            let setup_container = artifacts::gcloud_setup_container(&SetupContainerParams {
                workload_identity_provider: &config.workload_identity_provider,
                service_account_email: &config.service_account_email,
                project: &effective.project,
                image: &self.settings.gcloud_image,
                run_as_user: config.run_as_user,
                resources: self.settings.setup_container_resources.as_ref(),
            });
            prepend_or_replace_by_name(
                spec.init_containers.get_or_insert_with(Vec::new),
                setup_container,
            );
        }

        for container in spec
            .init_containers
            .iter_mut()
            .flatten()
            .chain(spec.containers.iter_mut())
        {
            if skip_containers.contains(container.name.as_str()) {
                debug!(container = container.name.as_str(), "skipping container");
                continue;
            }
            self.mutate_container(container, config.injection_mode, &effective.project);
        }

        info!(
            injection_mode = %config.injection_mode,
            audience = effective.audience.as_str(),
            token_expiration_seconds = effective.token_expiration_seconds,
            "injected workload identity credentials"
        );

        Ok(pod)
    }

    fn resolve_effective_values(
        &self,
        pod_annotations: &BTreeMap<String, String>,
        config: &IdentityConfig,
    ) -> Result<EffectiveValues> {
        let domain = &self.settings.annotation_domain;

        let audience = pod_annotations
            .get(&domain.key(annotations::AUDIENCE))
            .or(config.audience.as_ref())
            .unwrap_or(&self.settings.default_audience)
            .clone();

        let token_expiration_seconds =
            parse_integer_annotation(domain, pod_annotations, annotations::TOKEN_EXPIRATION)
                .context(ParseTokenExpirationSnafu)?
                .or(config.token_expiration_seconds)
                .unwrap_or(self.settings.default_token_expiration_seconds)
                .max(self.settings.min_token_expiration_seconds);

        let credentials_json = match config.injection_mode {
            InjectionMode::Direct => Some(
                ExternalAccountCredentials::for_provider(
                    &config.workload_identity_provider,
                    &config.service_account_email,
                )
                .render(false)
                .context(RenderCredentialsSnafu)?,
            ),
            InjectionMode::GCloud | InjectionMode::Undefined => None,
        };

        Ok(EffectiveValues {
            audience,
            token_expiration_seconds,
            project: project_of(&config.service_account_email),
            credentials_json,
        })
    }

    fn mutate_container(&self, container: &mut Container, mode: InjectionMode, project: &str) {
        let volume_mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        for volume_mount in artifacts::volume_mounts(mode) {
            add_or_replace_by_name(volume_mounts, volume_mount);
        }

        let env = container.env.get_or_insert_with(Vec::new);
        for env_var in artifacts::env_vars_to_add_or_replace(mode) {
            add_or_replace_by_name(env, env_var);
        }
        for env_var in artifacts::env_vars_to_add_if_absent(&self.settings.default_region, project)
        {
            add_if_absent_by_name(env, env_var);
        }
    }
}

fn write_annotations(
    pod_annotations: &mut BTreeMap<String, String>,
    domain: &AnnotationDomain,
    config: &IdentityConfig,
    effective: &EffectiveValues,
) {
    pod_annotations.insert(
        domain.key(annotations::WORKLOAD_IDENTITY_PROVIDER),
        config.workload_identity_provider.clone(),
    );
    pod_annotations.insert(
        domain.key(annotations::SERVICE_ACCOUNT_EMAIL),
        config.service_account_email.clone(),
    );
    pod_annotations.insert(
        domain.key(annotations::AUDIENCE),
        effective.audience.clone(),
    );
    pod_annotations.insert(
        domain.key(annotations::TOKEN_EXPIRATION),
        effective.token_expiration_seconds.to_string(),
    );

    if let Some(credentials_json) = &effective.credentials_json {
        pod_annotations.insert(
            domain.key(annotations::EXTERNAL_CREDENTIALS_JSON),
            credentials_json.clone(),
        );
    }
}

/// The names of all containers which must not be mutated. The setup container
/// is always part of them.
fn skip_containers<'a>(
    domain: &AnnotationDomain,
    pod_annotations: &'a BTreeMap<String, String>,
) -> BTreeSet<&'a str> {
    pod_annotations
        .get(&domain.key(annotations::SKIP_CONTAINERS))
        .into_iter()
        .flat_map(|names| names.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .chain([GCLOUD_SETUP_CONTAINER_NAME])
        .collect()
}

/// Extracts the project id from a GCP service account email like
/// `app@my-project.iam.gserviceaccount.com`. Returns an empty string for any
/// other email. The dots of the domain match any character.
fn project_of(service_account_email: &str) -> String {
    SERVICE_ACCOUNT_PROJECT_REGEX
        .captures(service_account_email)
        .and_then(|captures| captures.get(1))
        .map(|project| project.as_str().to_owned())
        .unwrap_or_default()
}
