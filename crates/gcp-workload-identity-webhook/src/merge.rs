//! Name-keyed add-or-replace operations over ordered Kubernetes lists.
//!
//! Both the element identity (its name) and the resulting order are relevant,
//! which is why these operate on plain [`Vec`]s via a linear scan instead of
//! going through a map.
use k8s_openapi::api::core::v1::{Container, EnvVar, Volume, VolumeMount};

/// Kubernetes list elements which are identified by their `name`.
pub trait Named {
    fn name(&self) -> &str;
}

macro_rules! impl_named {
    ($($t:ty),*) => {
        $(
            impl Named for $t {
                fn name(&self) -> &str {
                    &self.name
                }
            }
        )*
    };
}

impl_named!(Container, EnvVar, Volume, VolumeMount);

/// Replaces the element with the same name in place, or appends `item`.
pub fn add_or_replace_by_name<T: Named>(items: &mut Vec<T>, item: T) {
    match items.iter_mut().find(|existing| existing.name() == item.name()) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Appends `item` only if no element with the same name exists. Existing
/// elements are never touched.
pub fn add_if_absent_by_name<T: Named>(items: &mut Vec<T>, item: T) {
    if !items.iter().any(|existing| existing.name() == item.name()) {
        items.push(item);
    }
}

/// Replaces the element with the same name in place, or inserts `item` at the
/// front of the list.
pub fn prepend_or_replace_by_name<T: Named>(items: &mut Vec<T>, item: T) {
    match items.iter_mut().find(|existing| existing.name() == item.name()) {
        Some(existing) => *existing = item,
        None => items.insert(0, item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_owned(),
            value: Some(value.to_owned()),
            ..EnvVar::default()
        }
    }

    fn container(name: &str, image: &str) -> Container {
        Container {
            name: name.to_owned(),
            image: Some(image.to_owned()),
            ..Container::default()
        }
    }

    #[test]
    fn add_or_replace_replaces_in_place() {
        let mut env_vars = vec![env("A", "1"), env("B", "2"), env("C", "3")];
        add_or_replace_by_name(&mut env_vars, env("B", "new"));

        assert_eq!(env_vars, vec![env("A", "1"), env("B", "new"), env("C", "3")]);
    }

    #[test]
    fn add_or_replace_appends() {
        let mut env_vars = vec![env("A", "1")];
        add_or_replace_by_name(&mut env_vars, env("B", "2"));
        add_or_replace_by_name(&mut env_vars, env("B", "2"));

        assert_eq!(env_vars, vec![env("A", "1"), env("B", "2")]);
    }

    #[test]
    fn add_if_absent_keeps_existing() {
        let mut env_vars = vec![env("REGION", "user-choice")];
        add_if_absent_by_name(&mut env_vars, env("REGION", "default"));
        add_if_absent_by_name(&mut env_vars, env("PROJECT", "demo"));

        assert_eq!(
            env_vars,
            vec![env("REGION", "user-choice"), env("PROJECT", "demo")]
        );
    }

    #[test]
    fn prepend_or_replace_inserts_at_front() {
        let mut containers = vec![container("a", "busybox"), container("b", "busybox")];
        prepend_or_replace_by_name(&mut containers, container("setup", "gcloud"));

        let names: Vec<_> = containers.iter().map(Named::name).collect();
        assert_eq!(names, ["setup", "a", "b"]);
    }

    #[test]
    fn prepend_or_replace_keeps_position() {
        let mut containers = vec![container("a", "busybox"), container("setup", "old")];
        prepend_or_replace_by_name(&mut containers, container("setup", "gcloud"));

        assert_eq!(
            containers,
            vec![container("a", "busybox"), container("setup", "gcloud")]
        );
    }
}
