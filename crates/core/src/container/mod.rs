//! Container runtime used to run unpacking images.
//!
//! Images are addressed by name. The runtime knows how to check the local
//! image cache, pull from a registry and run an image against one input file
//! with no network access.

mod config;
mod docker;
mod error;
mod traits;
mod types;

pub use config::ContainerConfig;
pub use docker::DockerRuntime;
pub use error::ContainerError;
pub use traits::ContainerRuntime;
pub use types::{ContainerOutput, ContainerRun};
