//! Docker CLI based container runtime.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::ContainerConfig;
use super::error::ContainerError;
use super::traits::ContainerRuntime;
use super::types::{ContainerOutput, ContainerRun};

/// Runtime that shells out to `docker` (or a CLI-compatible binary).
pub struct DockerRuntime {
    config: ContainerConfig,
}

impl DockerRuntime {
    /// Creates a new runtime with the given configuration.
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    /// Creates a runtime with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ContainerConfig::default())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn map_spawn_error(&self, e: std::io::Error) -> ContainerError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ContainerError::RuntimeNotFound {
                path: self.config.binary.clone(),
            }
        } else {
            ContainerError::Io(e)
        }
    }

    /// Path of the input file as seen inside the container.
    fn container_input_path(&self, input: &Path) -> String {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        format!("{}/{}", self.config.input_mount.trim_end_matches('/'), name)
    }

    /// Unique container name, so a timed-out container can be removed.
    fn container_name() -> String {
        format!("rup-{}", Uuid::new_v4())
    }

    /// Builds `docker run` arguments for one unpacking job.
    fn build_run_args(&self, job: &ContainerRun, name: &str) -> Vec<String> {
        let input_in_container = self.container_input_path(&job.input);

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--network".to_string(),
            "none".to_string(),
            "-v".to_string(),
            format!("{}:{}:ro", job.input.display(), input_in_container),
            "-v".to_string(),
            format!("{}:{}:rw", job.output_dir.display(), self.config.output_mount),
            "-e".to_string(),
            format!("RUP_INPUT={}", input_in_container),
            "-e".to_string(),
            format!("RUP_OUTPUT_DIR={}", self.config.output_mount),
        ];

        args.extend(self.config.extra_run_args.iter().cloned());
        args.push(job.image.clone());
        args.extend(self.config.command.iter().cloned());

        args
    }

    /// Arguments that stop and remove a container by name.
    fn remove_args(name: &str) -> [&str; 3] {
        ["rm", "-f", name]
    }

    /// Killing the CLI client leaves the container running on the daemon.
    async fn remove_container(&self, name: &str) {
        let remove = self.command().args(Self::remove_args(name)).output();
        match timeout(Duration::from_secs(self.config.pull_timeout_secs), remove).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!(container = %name, "Removed timed out container");
            }
            Ok(Ok(output)) => warn!(
                container = %name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Failed to remove timed out container"
            ),
            Ok(Err(e)) => warn!(container = %name, error = %e, "Failed to remove timed out container"),
            Err(_) => warn!(container = %name, "Timed out removing container"),
        }
    }

    /// Classifies a failed `docker pull` by its stderr.
    fn classify_pull_failure(image: &str, stderr: &str) -> ContainerError {
        let lower = stderr.to_lowercase();
        if lower.contains("not found")
            || lower.contains("manifest unknown")
            || lower.contains("pull access denied")
        {
            ContainerError::ImageNotFound {
                image: image.to_string(),
            }
        } else {
            ContainerError::pull_failed(image, stderr.trim())
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ContainerError> {
        let output = self
            .command()
            .args(["image", "inspect", "--format", "{{.Id}}", image])
            .output()
            .await
            .map_err(|e| self.map_spawn_error(e))?;

        Ok(output.status.success())
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        debug!(image = %image, "Pulling image");

        let pull = self.command().args(["pull", image]).output();
        let output = timeout(Duration::from_secs(self.config.pull_timeout_secs), pull)
            .await
            .map_err(|_| ContainerError::Timeout {
                timeout_secs: self.config.pull_timeout_secs,
            })?
            .map_err(|e| self.map_spawn_error(e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Self::classify_pull_failure(image, &stderr))
    }

    async fn run(&self, job: ContainerRun) -> Result<ContainerOutput, ContainerError> {
        if !job.input.exists() {
            return Err(ContainerError::InputNotFound {
                path: job.input.clone(),
            });
        }

        tokio::fs::create_dir_all(&job.output_dir).await?;

        let start = Instant::now();
        let name = Self::container_name();
        let args = self.build_run_args(&job, &name);
        debug!(image = %job.image, container = %name, input = %job.input.display(), "Starting container");

        let child = self
            .command()
            .args(&args)
            .spawn()
            .map_err(|e| self.map_spawn_error(e))?;

        // Dropping the future on timeout kills the client (kill_on_drop).
        let output = match timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(output) => output?,
            Err(_) => {
                warn!(image = %job.image, container = %name, "Container timed out, removing it");
                self.remove_container(&name).await;
                return Err(ContainerError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        };

        let mut logs = String::from_utf8_lossy(&output.stdout).to_string();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(ContainerError::RunFailed {
                image: job.image,
                exit_code: output.status.code(),
                logs,
            });
        }

        Ok(ContainerOutput {
            exit_code: output.status.code(),
            logs,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), ContainerError> {
        let output = self
            .command()
            .arg("version")
            .output()
            .await
            .map_err(|e| self.map_spawn_error(e))?;

        if !output.status.success() {
            return Err(ContainerError::Io(std::io::Error::other(format!(
                "{} version failed: {}",
                self.config.binary.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job() -> ContainerRun {
        ContainerRun {
            image: "registry.example.org/unpack/hades:2".to_string(),
            input: PathBuf::from("/tmp/stage/0/input/run0042_0001.lmd"),
            output_dir: PathBuf::from("/tmp/stage/0/output"),
        }
    }

    #[test]
    fn test_build_run_args_isolation() {
        let runtime = DockerRuntime::with_defaults();
        let args = runtime.build_run_args(&job(), "rup-test");

        assert_eq!(args[0], "run");
        assert!(args.contains(&"--rm".to_string()));
        let name = args.iter().position(|a| a == "--name").unwrap();
        assert_eq!(args[name + 1], "rup-test");
        let net = args.iter().position(|a| a == "--network").unwrap();
        assert_eq!(args[net + 1], "none");
        assert!(args.contains(
            &"/tmp/stage/0/input/run0042_0001.lmd:/input/run0042_0001.lmd:ro".to_string()
        ));
        assert!(args.contains(&"/tmp/stage/0/output:/output:rw".to_string()));
        assert!(args.contains(&"RUP_INPUT=/input/run0042_0001.lmd".to_string()));
        assert_eq!(args.last().unwrap(), "registry.example.org/unpack/hades:2");
    }

    #[test]
    fn test_build_run_args_extra_and_command() {
        let runtime = DockerRuntime::new(ContainerConfig {
            extra_run_args: vec!["--user".to_string(), "1000:1000".to_string()],
            command: vec!["unpack".to_string(), "--all".to_string()],
            ..Default::default()
        });
        let args = runtime.build_run_args(&job(), "rup-test");

        let image_pos = args
            .iter()
            .position(|a| a == "registry.example.org/unpack/hades:2")
            .unwrap();
        let user_pos = args.iter().position(|a| a == "--user").unwrap();
        assert!(user_pos < image_pos);
        assert_eq!(&args[image_pos + 1..], &["unpack", "--all"]);
    }

    #[test]
    fn test_container_names_are_unique() {
        let a = DockerRuntime::container_name();
        let b = DockerRuntime::container_name();
        assert!(a.starts_with("rup-"));
        assert_ne!(a, b);
        assert_eq!(DockerRuntime::remove_args(&a), ["rm", "-f", a.as_str()]);
    }

    /// Fake runtime binary that logs its arguments and hangs on `run`.
    #[cfg(unix)]
    fn fake_binary(dir: &Path) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let calls = dir.join("calls.log");
        let binary = dir.join("fake-docker");
        std::fs::write(
            &binary,
            format!(
                "#!/bin/sh\necho \"$@\" >> {}\nif [ \"$1\" = run ]; then sleep 30; fi\n",
                calls.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        (binary, calls)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_container_is_removed() {
        let dir = tempfile::TempDir::new().unwrap();
        let (binary, calls) = fake_binary(dir.path());
        let input = dir.path().join("run0042_0001.lmd");
        std::fs::write(&input, b"raw").unwrap();

        let runtime = DockerRuntime::new(ContainerConfig {
            binary,
            timeout_secs: 1,
            ..Default::default()
        });
        let result = runtime
            .run(ContainerRun {
                image: "unpack:1".to_string(),
                input,
                output_dir: dir.path().join("output"),
            })
            .await;

        assert!(matches!(result, Err(ContainerError::Timeout { timeout_secs: 1 })));
        let log = std::fs::read_to_string(&calls).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        let name = lines[0]
            .split_whitespace()
            .skip_while(|arg| *arg != "--name")
            .nth(1)
            .unwrap();
        assert!(name.starts_with("rup-"));
        assert_eq!(lines[1], format!("rm -f {}", name));
    }

    #[test]
    fn test_classify_pull_failure() {
        let err = DockerRuntime::classify_pull_failure(
            "unpack:9",
            "Error response from daemon: manifest unknown",
        );
        assert!(err.is_not_found());

        let err = DockerRuntime::classify_pull_failure(
            "unpack:9",
            "Error response from daemon: Get https://registry: connection refused",
        );
        assert!(matches!(err, ContainerError::PullFailed { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runtime = DockerRuntime::new(ContainerConfig {
            binary: PathBuf::from("/nonexistent/docker-binary"),
            ..Default::default()
        });
        let result = runtime.validate().await;
        assert!(matches!(result, Err(ContainerError::RuntimeNotFound { .. })));
    }
}
