use gcp_workload_identity_webhook::{
    admission::{mutate_pod_request, pod_patch},
    identity::IdentityConfig,
    mutator::PodMutator,
    settings::MutatorSettings,
};
use indoc::indoc;
use k8s_openapi::{
    api::core::v1::{Pod, ServiceAccount},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

#[fixture]
fn mutator() -> PodMutator {
    PodMutator::new(MutatorSettings {
        default_region: "asia-northeast1".to_owned(),
        ..MutatorSettings::default()
    })
}

#[fixture]
fn pod() -> Pod {
    serde_yaml::from_str(indoc! {"
        apiVersion: v1
        kind: Pod
        metadata:
          name: app
          namespace: default
        spec:
          serviceAccountName: app
          containers:
            - name: app
              image: busybox
    "})
    .expect("test YAML is valid")
}

const PROVIDER: &str = "projects/123/locations/global/workloadIdentityPools/p/providers/q";

fn service_account(annotations: &[(&str, &str)]) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some("app".to_owned()),
            namespace: Some("default".to_owned()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                    .collect(),
            ),
            ..ObjectMeta::default()
        },
        ..ServiceAccount::default()
    }
}

#[fixture]
fn gcloud_service_account() -> ServiceAccount {
    service_account(&[
        ("cloud.google.com/workload-identity-provider", PROVIDER),
        (
            "cloud.google.com/service-account-email",
            "app@demo-project.iam.gserviceaccount.com",
        ),
    ])
}

/// Builds an admission request the way the API server sends it.
fn request(object: Option<&Pod>) -> AdmissionRequest<Pod> {
    let operation = if object.is_some() { "CREATE" } else { "DELETE" };
    let review: AdmissionReview<Pod> = serde_json::from_value(json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "name": "app",
            "namespace": "default",
            "operation": operation,
            "userInfo": {"username": "admin", "groups": ["system:authenticated"]},
            "object": object,
            "oldObject": null,
            "dryRun": false,
        }
    }))
    .expect("admission review is valid");

    review.try_into().expect("admission review contains a request")
}

fn review(response: AdmissionResponse) -> Value {
    serde_json::to_value(response.into_review()).expect("admission review serializes")
}

fn assert_allowed_without_patch(response: AdmissionResponse) {
    let review = review(response);
    assert_eq!(review["response"]["allowed"], true);
    assert_eq!(review["response"]["patchType"], Value::Null);
}

fn assert_denied_with(response: AdmissionResponse, code: u16, message: &str) {
    let review = review(response);
    assert_eq!(review["response"]["allowed"], false);
    assert_eq!(review["response"]["status"]["code"], code);
    assert_eq!(review["response"]["status"]["status"], "Failure");

    let actual = review["response"]["status"]["message"]
        .as_str()
        .expect("denied responses carry a message");
    assert!(
        actual.contains(message),
        "expected {actual:?} to contain {message:?}"
    );
}

#[rstest]
fn configured_service_account_is_patched(
    mutator: PodMutator,
    pod: Pod,
    gcloud_service_account: ServiceAccount,
) {
    let response = mutate_pod_request(&mutator, &request(Some(&pod)), Some(&gcloud_service_account));
    let review = review(response);
    assert_eq!(review["response"]["allowed"], true);
    assert_eq!(review["response"]["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
    assert_eq!(review["response"]["patchType"], "JSONPatch");

    // Applying the patch must yield exactly what the mutator produces
    let patch = pod_patch(&mutator, &pod, &gcloud_service_account)
        .unwrap()
        .expect("ServiceAccount is configured");
    let mut patched = serde_json::to_value(&pod).unwrap();
    json_patch::patch(&mut patched, &patch).unwrap();
    let patched: Pod = serde_json::from_value(patched).unwrap();

    let config = IdentityConfig::from_service_account(
        &mutator.settings().annotation_domain,
        &gcloud_service_account,
    )
    .unwrap()
    .expect("ServiceAccount is configured");
    assert_eq!(patched, mutator.mutate(&pod, &config).unwrap());

    let spec = patched.spec.expect("Pod has a spec");
    assert_eq!(spec.init_containers.unwrap()[0].name, "gcloud-setup");
    let env = spec.containers[0].env.as_ref().unwrap();
    assert!(
        env.iter()
            .any(|env_var| env_var.name == "CLOUDSDK_COMPUTE_REGION"
                && env_var.value.as_deref() == Some("asia-northeast1"))
    );
}

#[rstest]
fn patching_a_mutated_pod_changes_nothing(
    mutator: PodMutator,
    pod: Pod,
    gcloud_service_account: ServiceAccount,
) {
    let config = IdentityConfig::from_service_account(
        &mutator.settings().annotation_domain,
        &gcloud_service_account,
    )
    .unwrap()
    .expect("ServiceAccount is configured");
    let mutated = mutator.mutate(&pod, &config).unwrap();

    let patch = pod_patch(&mutator, &mutated, &gcloud_service_account)
        .unwrap()
        .expect("ServiceAccount is configured");
    assert!(patch.0.is_empty());
}

#[rstest]
fn direct_mode_patch_renders_credentials(mutator: PodMutator, pod: Pod) {
    let service_account = service_account(&[
        ("cloud.google.com/workload-identity-provider", PROVIDER),
        ("cloud.google.com/injection-mode", "direct"),
    ]);

    let patch = pod_patch(&mutator, &pod, &service_account)
        .unwrap()
        .expect("ServiceAccount is configured");
    let mut patched = serde_json::to_value(&pod).unwrap();
    json_patch::patch(&mut patched, &patch).unwrap();

    let credentials: Value = serde_json::from_str(
        patched["metadata"]["annotations"]["cloud.google.com/external-credential-config-json"]
            .as_str()
            .expect("credentials are rendered into an annotation"),
    )
    .unwrap();
    assert_eq!(
        credentials["audience"],
        format!("//iam.googleapis.com/{PROVIDER}")
    );
    assert_eq!(patched["spec"]["initContainers"], Value::Null);
}

#[rstest]
fn unconfigured_service_account_is_allowed(mutator: PodMutator, pod: Pod) {
    let service_account = service_account(&[("example.com/unrelated", "annotation")]);

    assert_allowed_without_patch(mutate_pod_request(
        &mutator,
        &request(Some(&pod)),
        Some(&service_account),
    ));
}

#[rstest]
fn missing_service_account_is_allowed(mutator: PodMutator, pod: Pod) {
    assert_allowed_without_patch(mutate_pod_request(&mutator, &request(Some(&pod)), None));
}

#[rstest]
fn mirror_pod_is_allowed(mutator: PodMutator, gcloud_service_account: ServiceAccount) {
    let mirror_pod: Pod = serde_yaml::from_str(indoc! {"
        apiVersion: v1
        kind: Pod
        metadata:
          name: static-web
          namespace: default
        spec:
          containers:
            - name: web
              image: nginx
    "})
    .expect("test YAML is valid");

    assert_allowed_without_patch(mutate_pod_request(
        &mutator,
        &request(Some(&mirror_pod)),
        Some(&gcloud_service_account),
    ));
}

#[rstest]
fn request_without_object_is_allowed(mutator: PodMutator, gcloud_service_account: ServiceAccount) {
    assert_allowed_without_patch(mutate_pod_request(
        &mutator,
        &request(None),
        Some(&gcloud_service_account),
    ));
}

#[rstest]
fn invalid_provider_is_denied(mutator: PodMutator, pod: Pod) {
    let service_account =
        service_account(&[("cloud.google.com/workload-identity-provider", "my-provider")]);

    assert_denied_with(
        mutate_pod_request(&mutator, &request(Some(&pod)), Some(&service_account)),
        400,
        "cloud.google.com/workload-identity-provider must be form of projects/{ProjectNumber}",
    );
}

#[rstest]
fn invalid_pod_token_expiration_is_denied(
    mutator: PodMutator,
    mut pod: Pod,
    gcloud_service_account: ServiceAccount,
) {
    pod.metadata.annotations = Some(
        [(
            "cloud.google.com/token-expiration".to_owned(),
            "one day".to_owned(),
        )]
        .into(),
    );

    assert_denied_with(
        mutate_pod_request(&mutator, &request(Some(&pod)), Some(&gcloud_service_account)),
        400,
        "cloud.google.com/token-expiration must be positive integer string",
    );
}
