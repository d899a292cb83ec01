//! Mock container runtime for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::container::{ContainerError, ContainerOutput, ContainerRun, ContainerRuntime};

/// What the mock writes into the output directory for one input.
#[derive(Debug, Clone)]
pub enum MockUnpack {
    /// Write these `(file name, content)` pairs.
    Outputs(Vec<(String, Vec<u8>)>),
    /// Exit unsuccessfully.
    Fail { exit_code: i32, logs: String },
}

/// Mock implementation of the ContainerRuntime trait.
///
/// Provides controllable behavior for testing:
/// - Track pulls and runs for assertions
/// - Simulate missing images and failing pulls
/// - Choose the outputs written for each input file
///
/// Unless configured otherwise, every input `name.ext` produces
/// `name.root` (the input prefixed with `unpacked:`) and a `name.txt`
/// summary that is expected to be discarded.
///
/// # Example
///
/// ```rust,ignore
/// use rup_core::testing::{MockContainerRuntime, MockUnpack};
///
/// let runtime = MockContainerRuntime::new();
/// runtime.add_local_image("unpack:1").await;
/// runtime.set_unpack("run0001_0002.lmd", MockUnpack::Outputs(vec![])).await;
///
/// // ... run a processor ...
///
/// assert_eq!(runtime.recorded_runs().await.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MockContainerRuntime {
    /// Images present locally.
    local_images: Arc<RwLock<HashSet<String>>>,
    /// Errors returned by successive pulls, per image.
    pull_errors: Arc<RwLock<HashMap<String, VecDeque<ContainerError>>>>,
    /// Images pulled, in order, including failed attempts.
    pulls: Arc<RwLock<Vec<String>>>,
    /// Outputs per input file name.
    unpacks: Arc<RwLock<HashMap<String, MockUnpack>>>,
    /// Recorded runs.
    runs: Arc<RwLock<Vec<ContainerRun>>>,
}

impl MockContainerRuntime {
    /// Create a new mock runtime with no local images.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an image as present in the local cache.
    pub async fn add_local_image(&self, image: impl Into<String>) {
        self.local_images.write().await.insert(image.into());
    }

    /// Queue an error for the next pull of `image`.
    pub async fn push_pull_error(&self, image: impl Into<String>, error: ContainerError) {
        self.pull_errors
            .write()
            .await
            .entry(image.into())
            .or_default()
            .push_back(error);
    }

    /// Configure what unpacking `input_name` produces.
    pub async fn set_unpack(&self, input_name: impl Into<String>, unpack: MockUnpack) {
        self.unpacks.write().await.insert(input_name.into(), unpack);
    }

    /// All pull attempts, in order.
    pub async fn recorded_pulls(&self) -> Vec<String> {
        self.pulls.read().await.clone()
    }

    /// All container runs, in order.
    pub async fn recorded_runs(&self) -> Vec<ContainerRun> {
        self.runs.read().await.clone()
    }

    fn default_unpack(input: &Path, content: &[u8]) -> MockUnpack {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        let mut unpacked = b"unpacked:".to_vec();
        unpacked.extend_from_slice(content);

        MockUnpack::Outputs(vec![
            (format!("{}.root", stem), unpacked),
            (format!("{}.txt", stem), b"summary".to_vec()),
        ])
    }
}

#[async_trait]
impl ContainerRuntime for MockContainerRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError> {
        Ok(self.local_images.read().await.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        self.pulls.write().await.push(image.to_string());

        let queued = self
            .pull_errors
            .write()
            .await
            .get_mut(image)
            .and_then(|errors| errors.pop_front());
        if let Some(error) = queued {
            return Err(error);
        }

        self.local_images.write().await.insert(image.to_string());
        Ok(())
    }

    async fn run(&self, job: ContainerRun) -> Result<ContainerOutput, ContainerError> {
        self.runs.write().await.push(job.clone());

        if !self.local_images.read().await.contains(&job.image) {
            return Err(ContainerError::ImageNotFound { image: job.image });
        }

        let content = tokio::fs::read(&job.input).await.map_err(|_| {
            ContainerError::InputNotFound {
                path: job.input.clone(),
            }
        })?;

        let name = job
            .input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let unpack = self
            .unpacks
            .read()
            .await
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Self::default_unpack(&job.input, &content));

        match unpack {
            MockUnpack::Outputs(outputs) => {
                tokio::fs::create_dir_all(&job.output_dir).await?;
                for (file_name, data) in outputs {
                    tokio::fs::write(job.output_dir.join(file_name), data).await?;
                }
                Ok(ContainerOutput {
                    exit_code: Some(0),
                    logs: format!("unpacked {}", name),
                    duration_ms: 1,
                })
            }
            MockUnpack::Fail { exit_code, logs } => Err(ContainerError::RunFailed {
                image: job.image,
                exit_code: Some(exit_code),
                logs,
            }),
        }
    }

    async fn validate(&self) -> Result<(), ContainerError> {
        Ok(())
    }
}
