//! Small builders for the Kubernetes objects injected into Pods.
pub mod container;
pub mod security;
pub mod volume;

pub use container::ContainerBuilder;
pub use security::SecurityContextBuilder;
pub use volume::{ProjectedVolumeSourceBuilder, VolumeBuilder, VolumeMountBuilder};
