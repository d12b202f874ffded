use k8s_openapi::api::core::v1::{
    Container, EnvVar, ResourceRequirements, SecurityContext, VolumeMount,
};

/// A builder to build [`Container`] objects.
#[derive(Clone, Default)]
pub struct ContainerBuilder {
    command: Option<Vec<String>>,
    env: Option<Vec<EnvVar>>,
    image: Option<String>,
    name: String,
    resources: Option<ResourceRequirements>,
    security_context: Option<SecurityContext>,
    volume_mounts: Option<Vec<VolumeMount>>,
}

impl ContainerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn image(&mut self, image: impl Into<String>) -> &mut Self {
        self.image = Some(image.into());
        self
    }

    pub fn command(&mut self, command: Vec<String>) -> &mut Self {
        self.command = Some(command);
        self
    }

    pub fn add_env_var(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.get_or_insert_with(Vec::new).push(env_var(name, value));
        self
    }

    pub fn add_volume_mounts(
        &mut self,
        volume_mounts: impl IntoIterator<Item = VolumeMount>,
    ) -> &mut Self {
        self.volume_mounts
            .get_or_insert_with(Vec::new)
            .extend(volume_mounts);
        self
    }

    /// Sets the resources, leaving them unset if `resources` is [`None`].
    pub fn resources_opt(&mut self, resources: Option<ResourceRequirements>) -> &mut Self {
        self.resources = resources;
        self
    }

    pub fn security_context(&mut self, context: SecurityContext) -> &mut Self {
        self.security_context = Some(context);
        self
    }

    pub fn build(&self) -> Container {
        Container {
            command: self.command.clone(),
            env: self.env.clone(),
            image: self.image.clone(),
            name: self.name.clone(),
            resources: self.resources.clone(),
            security_context: self.security_context.clone(),
            volume_mounts: self.volume_mounts.clone(),
            ..Container::default()
        }
    }
}

/// Creates a plain `name=value` [`EnvVar`].
pub fn env_var(name: impl Into<String>, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..EnvVar::default()
    }
}
