//! Default values and fixed names baked into the injected Pod artifacts.
pub const DEFAULT_ANNOTATION_DOMAIN: &str = "cloud.google.com";
pub const DEFAULT_AUDIENCE: &str = "sts.googleapis.com";
pub const DEFAULT_TOKEN_EXPIRATION_SECONDS: i64 = 24 * 60 * 60;
pub const DEFAULT_MIN_TOKEN_EXPIRATION_SECONDS: i64 = 60 * 60;
pub const DEFAULT_GCLOUD_IMAGE: &str = "google/cloud-sdk:slim";
pub const DEFAULT_VOLUME_MODE: i32 = 0o440;

/// Prefix of the audience handed to the STS token exchange.
pub const IAM_AUDIENCE_PREFIX: &str = "//iam.googleapis.com/";

pub const EXTERNAL_CREDENTIAL_CONFIG_FILE_NAME: &str = "federation.json";

pub const SA_TOKEN_VOLUME_NAME: &str = "gcp-iam-token";
pub const SA_TOKEN_MOUNT_PATH: &str = "/var/run/secrets/sts.googleapis.com/serviceaccount";
pub const SA_TOKEN_FILE_NAME: &str = "token";

pub const GCLOUD_CONFIG_VOLUME_NAME: &str = "gcloud-config";
pub const GCLOUD_CONFIG_MOUNT_PATH: &str = "/var/run/secrets/gcloud/config";

pub const EXTERNAL_CREDENTIAL_CONFIG_VOLUME_NAME: &str = "external-credential-config";
pub const EXTERNAL_CREDENTIAL_CONFIG_MOUNT_PATH: &str =
    "/var/run/secrets/gcloud/external-credential-config";

pub const GCLOUD_SETUP_CONTAINER_NAME: &str = "gcloud-setup";

pub mod env {
    pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
    pub const CLOUDSDK_CONFIG: &str = "CLOUDSDK_CONFIG";
    pub const CLOUDSDK_COMPUTE_REGION: &str = "CLOUDSDK_COMPUTE_REGION";
    pub const CLOUDSDK_CORE_PROJECT: &str = "CLOUDSDK_CORE_PROJECT";
    pub const GCP_WORKLOAD_IDENTITY_PROVIDER: &str = "GCP_WORKLOAD_IDENTITY_PROVIDER";
    pub const GCP_SERVICE_ACCOUNT: &str = "GCP_SERVICE_ACCOUNT";
}

/// Path of the projected service account token inside every mutated container.
pub fn sa_token_path() -> String {
    format!("{SA_TOKEN_MOUNT_PATH}/{SA_TOKEN_FILE_NAME}")
}
