use k8s_openapi::api::core::v1::{Capabilities, SecurityContext};

/// A builder for [`SecurityContext`] objects (not to be confused with `PodSecurityContext`).
#[derive(Clone, Default)]
pub struct SecurityContextBuilder {
    security_context: SecurityContext,
}

impl SecurityContextBuilder {
    /// A context satisfying the "restricted" Pod Security Standard as far as a
    /// single container can: no privilege escalation and all capabilities
    /// dropped.
    pub fn restricted() -> Self {
        let mut builder = Self::new();
        builder
            .allow_privilege_escalation(false)
            .drop_capabilities(["ALL"]);
        builder
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_privilege_escalation(&mut self, value: bool) -> &mut Self {
        self.security_context.allow_privilege_escalation = Some(value);
        self
    }

    pub fn drop_capabilities<I, S>(&mut self, capabilities: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security_context
            .capabilities
            .get_or_insert_with(Capabilities::default)
            .drop
            .get_or_insert_with(Vec::new)
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Sets `runAsUser`, leaving it unset if `value` is [`None`].
    pub fn run_as_user_opt(&mut self, value: Option<i64>) -> &mut Self {
        self.security_context.run_as_user = value;
        self
    }

    pub fn build(&self) -> SecurityContext {
        self.security_context.clone()
    }
}
