//! Process-wide settings of the Pod mutator.
//!
//! [`MutatorOptions`] is meant to be flattened into the CLI arguments of the
//! hosting webhook binary, and is turned into validated [`MutatorSettings`]
//! via [`TryFrom`].
//!
//! ```
//! use clap::Parser;
//! use gcp_workload_identity_webhook::settings::{MutatorOptions, MutatorSettings};
//!
//! #[derive(clap::Parser)]
//! struct Opts {
//!     #[command(flatten)]
//!     mutator: MutatorOptions,
//! }
//!
//! let opts = Opts::parse_from(["webhook", "--gcp-default-region", "europe-west3"]);
//! let settings = MutatorSettings::try_from(opts.mutator).unwrap();
//! assert_eq!(settings.default_region, "europe-west3");
//! ```
use std::{num::ParseIntError, str::FromStr};

use k8s_openapi::api::core::v1::ResourceRequirements;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    annotations::{AnnotationDomain, AnnotationDomainError},
    constants::{
        DEFAULT_AUDIENCE, DEFAULT_GCLOUD_IMAGE, DEFAULT_MIN_TOKEN_EXPIRATION_SECONDS,
        DEFAULT_TOKEN_EXPIRATION_SECONDS, DEFAULT_VOLUME_MODE,
    },
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid annotation prefix"))]
    InvalidAnnotationDomain { source: AnnotationDomainError },

    #[snafu(display("token default mode {value:?} must be an octal file mode like 0440"))]
    ParseTokenDefaultMode {
        source: ParseIntError,
        value: String,
    },

    #[snafu(display("failed to parse the setup container resources as JSON"))]
    ParseSetupContainerResources { source: serde_json::Error },

    #[snafu(display("{option} of {duration} is too long to be expressed in seconds"))]
    ExpirationTooLong {
        option: &'static str,
        duration: humantime::Duration,
    },
}

/// CLI arguments (and environment variables) configuring the Pod mutator.
#[derive(Clone, Debug, PartialEq, Eq, clap::Args)]
#[command(next_help_heading = "Workload Identity Options")]
pub struct MutatorOptions {
    /// The domain prefixing all ServiceAccount and Pod annotations.
    #[arg(long, env, default_value = crate::constants::DEFAULT_ANNOTATION_DOMAIN)]
    pub annotation_prefix: String,

    /// The default audience of the projected tokens. Can be overridden by annotation.
    #[arg(long, env, default_value = DEFAULT_AUDIENCE)]
    pub token_audience: String,

    /// The default token expiration. Can be overridden by annotation.
    #[arg(long, env, default_value = "24h")]
    pub token_expiration: humantime::Duration,

    /// Token expirations below this value are raised to it.
    #[arg(long, env, default_value = "1h")]
    pub min_token_expiration: humantime::Duration,

    /// If set, CLOUDSDK_COMPUTE_REGION will be set to this value in mutated containers.
    #[arg(long, env, default_value = "")]
    pub gcp_default_region: String,

    /// Container image of the init container setting up the gcloud SDK.
    #[arg(long, env, default_value = DEFAULT_GCLOUD_IMAGE)]
    pub gcloud_image: String,

    /// Octal defaultMode of the injected volumes.
    ///
    /// CAUTION: If you allow reading for others (e.g. '0444'), the token can be read by anyone
    /// who can log in to the node.
    #[arg(long, env, default_value = "0440")]
    pub token_default_mode: String,

    /// Resource requirements of the gcloud setup init container in JSON, e.g.
    /// '{"requests":{"cpu":"100m"}}'.
    #[arg(long, env)]
    pub setup_container_resources: Option<String>,
}

/// Validated, immutable settings shared by all admission requests.
#[derive(Clone, Debug, PartialEq)]
pub struct MutatorSettings {
    pub annotation_domain: AnnotationDomain,
    pub default_audience: String,
    pub default_token_expiration_seconds: i64,
    pub min_token_expiration_seconds: i64,

    /// Injected as `CLOUDSDK_COMPUTE_REGION` unless empty.
    pub default_region: String,
    pub gcloud_image: String,

    /// File mode bits of the projected volumes.
    pub default_mode: i32,
    pub setup_container_resources: Option<ResourceRequirements>,
}

impl Default for MutatorSettings {
    fn default() -> Self {
        Self {
            annotation_domain: AnnotationDomain::default(),
            default_audience: DEFAULT_AUDIENCE.to_owned(),
            default_token_expiration_seconds: DEFAULT_TOKEN_EXPIRATION_SECONDS,
            min_token_expiration_seconds: DEFAULT_MIN_TOKEN_EXPIRATION_SECONDS,
            default_region: String::new(),
            gcloud_image: DEFAULT_GCLOUD_IMAGE.to_owned(),
            default_mode: DEFAULT_VOLUME_MODE,
            setup_container_resources: None,
        }
    }
}

impl TryFrom<MutatorOptions> for MutatorSettings {
    type Error = Error;

    fn try_from(options: MutatorOptions) -> Result<Self, Self::Error> {
        let annotation_domain = AnnotationDomain::from_str(&options.annotation_prefix)
            .context(InvalidAnnotationDomainSnafu)?;

        let default_mode = parse_file_mode(&options.token_default_mode)?;

        let setup_container_resources = options
            .setup_container_resources
            .as_deref()
            .map(str::trim)
            .filter(|resources| !resources.is_empty())
            .map(serde_json::from_str::<ResourceRequirements>)
            .transpose()
            .context(ParseSetupContainerResourcesSnafu)?;

        Ok(Self {
            annotation_domain,
            default_audience: options.token_audience,
            default_token_expiration_seconds: duration_seconds(
                "token expiration",
                options.token_expiration,
            )?,
            min_token_expiration_seconds: duration_seconds(
                "minimum token expiration",
                options.min_token_expiration,
            )?,
            default_region: options.gcp_default_region,
            gcloud_image: options.gcloud_image,
            default_mode,
            setup_container_resources,
        })
    }
}

fn parse_file_mode(value: &str) -> Result<i32, Error> {
    let digits = value.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    i32::from_str_radix(digits, 8).context(ParseTokenDefaultModeSnafu { value })
}

fn duration_seconds(option: &'static str, duration: humantime::Duration) -> Result<i64, Error> {
    i64::try_from(duration.as_secs())
        .ok()
        .context(ExpirationTooLongSnafu { option, duration })
}
