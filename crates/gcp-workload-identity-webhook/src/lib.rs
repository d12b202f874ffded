//! Pod mutation core of a Kubernetes mutating admission webhook, which injects
//! GCP workload identity federation credentials into Pods.
//!
//! A ServiceAccount opts in by carrying the `{domain}/workload-identity-provider`
//! annotation (see [`annotations`]). Pods running as such a ServiceAccount get
//! a projected service account token plus either
//!
//! - a `gcloud` setup init container which logs in with the credential
//!   configuration (`gcloud` injection mode, the default), or
//! - the rendered credential configuration exposed as a file via the downward
//!   API (`direct` injection mode).
//!
//! The entry points are [`mutator::PodMutator`] for mutating Pods directly and
//! [`admission::mutate_pod_request`] for answering admission requests. Both
//! are pure: hosting the HTTPS server and fetching ServiceAccounts is up to the
//! caller.

pub mod admission;
pub mod annotations;
pub mod artifacts;
pub mod builder;
pub mod constants;
pub mod credentials;
pub mod identity;
pub mod merge;
pub mod mutator;
pub mod settings;

// External re-exports
pub use k8s_openapi;
pub use kube;
