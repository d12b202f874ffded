//! Volumes, mounts, env vars and the setup container injected into Pods.
//!
//! Which artifacts are used only depends on the [`InjectionMode`]:
//!
//! | Mode             | Volumes                        | Env                                                    |
//! |------------------|--------------------------------|--------------------------------------------------------|
//! | GCloud/Undefined | SA token + gcloud config       | `GOOGLE_APPLICATION_CREDENTIALS`, `CLOUDSDK_CONFIG`    |
//! | Direct           | SA token + downward API config | `GOOGLE_APPLICATION_CREDENTIALS`                       |
use k8s_openapi::api::core::v1::{
    Container, DownwardAPIVolumeFile, DownwardAPIVolumeSource, EmptyDirVolumeSource, EnvVar,
    ObjectFieldSelector, ResourceRequirements, Volume, VolumeMount,
};

use crate::{
    annotations::{self, AnnotationDomain},
    builder::{
        ContainerBuilder, ProjectedVolumeSourceBuilder, SecurityContextBuilder, VolumeBuilder,
        VolumeMountBuilder, container::env_var,
    },
    constants::{
        EXTERNAL_CREDENTIAL_CONFIG_FILE_NAME, EXTERNAL_CREDENTIAL_CONFIG_MOUNT_PATH,
        EXTERNAL_CREDENTIAL_CONFIG_VOLUME_NAME, GCLOUD_CONFIG_MOUNT_PATH,
        GCLOUD_CONFIG_VOLUME_NAME, GCLOUD_SETUP_CONTAINER_NAME, SA_TOKEN_FILE_NAME,
        SA_TOKEN_MOUNT_PATH, SA_TOKEN_VOLUME_NAME, env, sa_token_path,
    },
    identity::InjectionMode,
};

/// Everything the gcloud setup init container needs to know.
#[derive(Clone, Copy, Debug)]
pub struct SetupContainerParams<'a> {
    pub workload_identity_provider: &'a str,
    pub service_account_email: &'a str,
    pub project: &'a str,
    pub image: &'a str,
    pub run_as_user: Option<i64>,
    pub resources: Option<&'a ResourceRequirements>,
}

/// The volumes to add or replace in the Pod.
pub fn volumes(
    domain: &AnnotationDomain,
    audience: &str,
    expiration_seconds: i64,
    default_mode: i32,
    mode: InjectionMode,
) -> Vec<Volume> {
    let token_volume = sa_token_volume(audience, expiration_seconds, default_mode);

    if mode.uses_gcloud() {
        vec![token_volume, gcloud_config_volume()]
    } else {
        vec![
            token_volume,
            external_credential_config_volume(domain, default_mode),
        ]
    }
}

/// A projected service account token bound to `audience`.
pub fn sa_token_volume(audience: &str, expiration_seconds: i64, default_mode: i32) -> Volume {
    VolumeBuilder::new(SA_TOKEN_VOLUME_NAME)
        .projected(
            ProjectedVolumeSourceBuilder::new()
                .add_service_account_token(audience, expiration_seconds, SA_TOKEN_FILE_NAME)
                .default_mode(default_mode)
                .build(),
        )
        .build()
}

/// Scratch space used as gcloud's config directory.
pub fn gcloud_config_volume() -> Volume {
    VolumeBuilder::new(GCLOUD_CONFIG_VOLUME_NAME)
        .empty_dir(EmptyDirVolumeSource::default())
        .build()
}

/// Exposes the credentials rendered into the Pod annotation as a file.
pub fn external_credential_config_volume(domain: &AnnotationDomain, default_mode: i32) -> Volume {
    let annotation_key = domain.key(annotations::EXTERNAL_CREDENTIALS_JSON);

    VolumeBuilder::new(EXTERNAL_CREDENTIAL_CONFIG_VOLUME_NAME)
        .downward_api(DownwardAPIVolumeSource {
            items: Some(vec![DownwardAPIVolumeFile {
                path: EXTERNAL_CREDENTIAL_CONFIG_FILE_NAME.to_owned(),
                field_ref: Some(ObjectFieldSelector {
                    api_version: Some("v1".to_owned()),
                    field_path: format!("metadata.annotations['{annotation_key}']"),
                }),
                ..DownwardAPIVolumeFile::default()
            }]),
            default_mode: Some(default_mode),
        })
        .build()
}

/// The volume mounts to add or replace in every mutated container.
pub fn volume_mounts(mode: InjectionMode) -> Vec<VolumeMount> {
    let token_mount = VolumeMountBuilder::new(SA_TOKEN_VOLUME_NAME, SA_TOKEN_MOUNT_PATH)
        .read_only(true)
        .build();

    let config_mount = if mode.uses_gcloud() {
        // gcloud writes its state into this directory
        VolumeMountBuilder::new(GCLOUD_CONFIG_VOLUME_NAME, GCLOUD_CONFIG_MOUNT_PATH).build()
    } else {
        VolumeMountBuilder::new(
            EXTERNAL_CREDENTIAL_CONFIG_VOLUME_NAME,
            EXTERNAL_CREDENTIAL_CONFIG_MOUNT_PATH,
        )
        .read_only(true)
        .build()
    };

    vec![token_mount, config_mount]
}

/// The env vars to add or replace in every mutated container.
pub fn env_vars_to_add_or_replace(mode: InjectionMode) -> Vec<EnvVar> {
    if mode.uses_gcloud() {
        vec![
            env_var(
                env::GOOGLE_APPLICATION_CREDENTIALS,
                format!("{GCLOUD_CONFIG_MOUNT_PATH}/{EXTERNAL_CREDENTIAL_CONFIG_FILE_NAME}"),
            ),
            env_var(env::CLOUDSDK_CONFIG, GCLOUD_CONFIG_MOUNT_PATH),
        ]
    } else {
        vec![env_var(
            env::GOOGLE_APPLICATION_CREDENTIALS,
            format!("{EXTERNAL_CREDENTIAL_CONFIG_MOUNT_PATH}/{EXTERNAL_CREDENTIAL_CONFIG_FILE_NAME}"),
        )]
    }
}

/// The env vars which are only added if the container doesn't define them
/// already. Empty values are skipped.
pub fn env_vars_to_add_if_absent(region: &str, project: &str) -> Vec<EnvVar> {
    [
        (env::CLOUDSDK_COMPUTE_REGION, region),
        (env::CLOUDSDK_CORE_PROJECT, project),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(name, value)| env_var(name, value))
    .collect()
}

/// The init container which creates the credential configuration and logs in
/// with gcloud, before any other init container runs.
pub fn gcloud_setup_container(params: &SetupContainerParams<'_>) -> Container {
    let mut builder = ContainerBuilder::new(GCLOUD_SETUP_CONTAINER_NAME);
    builder
        .image(params.image)
        .command(vec![
            "sh".to_owned(),
            "-c".to_owned(),
            gcloud_setup_script(!params.service_account_email.is_empty()),
        ])
        .add_env_var(
            env::GCP_WORKLOAD_IDENTITY_PROVIDER,
            params.workload_identity_provider,
        )
        .add_env_var(env::CLOUDSDK_CONFIG, GCLOUD_CONFIG_MOUNT_PATH);

    if !params.service_account_email.is_empty() {
        builder.add_env_var(env::GCP_SERVICE_ACCOUNT, params.service_account_email);
    }
    if !params.project.is_empty() {
        builder.add_env_var(env::CLOUDSDK_CORE_PROJECT, params.project);
    }

    builder
        .add_volume_mounts(volume_mounts(InjectionMode::GCloud))
        .security_context(
            SecurityContextBuilder::restricted()
                .run_as_user_opt(params.run_as_user)
                .build(),
        )
        .resources_opt(params.resources.cloned())
        .build()
}

/// The shell script run by the setup container. `$(VAR)` references are
/// expanded by the kubelet from the container's env.
fn gcloud_setup_script(with_service_account: bool) -> String {
    let mut create_cred_config_args = vec![format!("$({})", env::GCP_WORKLOAD_IDENTITY_PROVIDER)];
    if with_service_account {
        create_cred_config_args.push(format!("--service-account=$({})", env::GCP_SERVICE_ACCOUNT));
    }
    create_cred_config_args.push(format!(
        "--output-file=$({})/{EXTERNAL_CREDENTIAL_CONFIG_FILE_NAME}",
        env::CLOUDSDK_CONFIG
    ));
    create_cred_config_args.push(format!("--credential-source-file={}", sa_token_path()));

    let login_args = [format!(
        "--cred-file=$({})/{EXTERNAL_CREDENTIAL_CONFIG_FILE_NAME}",
        env::CLOUDSDK_CONFIG
    )];

    format!(
        "gcloud iam workload-identity-pools create-cred-config \\\n  {}\ngcloud auth login \\\n  {}\n",
        create_cred_config_args.join(" \\\n  "),
        login_args.join(" \\\n  "),
    )
}
