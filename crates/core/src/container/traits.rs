//! Trait definitions for the container module.

use async_trait::async_trait;

use super::error::ContainerError;
use super::types::{ContainerOutput, ContainerRun};

/// A container runtime able to fetch images and run unpackers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the name of this runtime implementation.
    fn name(&self) -> &str;

    /// Whether the image is present in the local image cache.
    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError>;

    /// Pulls the image from its registry.
    async fn pull_image(&self, image: &str) -> Result<(), ContainerError>;

    /// Runs the image against one input file.
    ///
    /// Returns an error if the container exits unsuccessfully.
    async fn run(&self, job: ContainerRun) -> Result<ContainerOutput, ContainerError>;

    /// Validates that the runtime is installed and reachable.
    async fn validate(&self) -> Result<(), ContainerError>;
}
