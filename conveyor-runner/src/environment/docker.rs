// Docker-backed provisioner
// One build container plus any compose services per job, driven via the docker CLI

use crate::environment::{Environment, EnvironmentError, ExecOutput, Provisioner};
use crate::matrix::{JobConfig, ServiceSpec};

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Image pull policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePullPolicy {
    /// Always pull the image
    Always,
    /// Pull only if not present locally
    IfNotPresent,
    /// Never pull (must be present locally)
    Never,
}

/// Configuration for docker-backed environments
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Host directory mounted at /workspace in the build container.
    pub workspace: PathBuf,
    /// Whether to pull images before running.
    pub pull_policy: ImagePullPolicy,
    /// Whether to force-remove containers on destroy.
    pub auto_remove: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            pull_policy: ImagePullPolicy::IfNotPresent,
            auto_remove: true,
        }
    }
}

/// Provisions one isolated docker environment per job config.
pub struct DockerProvisioner {
    config: DockerConfig,
}

impl DockerProvisioner {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    /// Check if the docker daemon is reachable.
    pub async fn is_available(&self) -> bool {
        let output = tokio::process::Command::new("docker")
            .args(["version", "--format", "{{.Server.Version}}"])
            .output()
            .await;

        output.map(|o| o.status.success()).unwrap_or(false)
    }

    async fn pull_image_if_needed(&self, image: &str) -> Result<(), EnvironmentError> {
        match self.config.pull_policy {
            ImagePullPolicy::Never => Ok(()),
            ImagePullPolicy::Always => pull_image(image).await,
            ImagePullPolicy::IfNotPresent => {
                let output = tokio::process::Command::new("docker")
                    .args(["image", "inspect", image])
                    .output()
                    .await
                    .map_err(|e| EnvironmentError::DockerNotAvailable(e.to_string()))?;

                if output.status.success() {
                    Ok(())
                } else {
                    pull_image(image).await
                }
            }
        }
    }

    async fn start_service(
        &self,
        name: &str,
        spec: &ServiceSpec,
        suffix: &str,
    ) -> Result<String, EnvironmentError> {
        self.pull_image_if_needed(&spec.image).await?;

        let container_name = format!("conveyor-svc-{}-{}", name, suffix);
        let args = service_run_args(&container_name, spec);

        let output = tokio::process::Command::new("docker")
            .args(&args)
            .output()
            .await
            .map_err(|e| EnvironmentError::DockerNotAvailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EnvironmentError::CreateFailed(format!(
                "service {}: {}",
                name, stderr
            )));
        }

        Ok(container_name)
    }
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    async fn acquire(&self, config: &JobConfig) -> Result<Box<dyn Environment>, EnvironmentError> {
        let suffix = name_suffix();

        // Service containers come up before the build container so the job
        // can reach them from its first command.
        let mut services = Vec::with_capacity(config.services.len());
        for (name, spec) in &config.services {
            match self.start_service(name, spec, &suffix).await {
                Ok(container_name) => services.push(container_name),
                Err(err) => {
                    // A partially-provisioned environment must not leak.
                    remove_containers(&services).await;
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.pull_image_if_needed(&config.image).await {
            remove_containers(&services).await;
            return Err(err);
        }

        let container_name = format!("conveyor-build-{}", suffix);
        let args = build_create_args(&container_name, config, &self.config.workspace);

        let output = tokio::process::Command::new("docker")
            .args(&args)
            .output()
            .await
            .map_err(|e| EnvironmentError::DockerNotAvailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            remove_containers(&services).await;
            return Err(EnvironmentError::CreateFailed(stderr));
        }

        let start_output = tokio::process::Command::new("docker")
            .args(["start", &container_name])
            .output()
            .await
            .map_err(|e| EnvironmentError::DockerNotAvailable(e.to_string()))?;

        if !start_output.status.success() {
            let stderr = String::from_utf8_lossy(&start_output.stderr).to_string();
            remove_containers(&[container_name]).await;
            remove_containers(&services).await;
            return Err(EnvironmentError::StartFailed(stderr));
        }

        Ok(Box::new(DockerEnvironment {
            name: container_name,
            services,
            auto_remove: self.config.auto_remove,
        }))
    }
}

/// A running build container and its service containers.
pub struct DockerEnvironment {
    name: String,
    services: Vec<String>,
    auto_remove: bool,
}

#[async_trait]
impl Environment for DockerEnvironment {
    fn id(&self) -> &str {
        &self.name
    }

    async fn exec(&self, commands: &[String]) -> Result<ExecOutput, EnvironmentError> {
        let script = commands.join("\n");

        let output = tokio::process::Command::new("docker")
            .args(["exec", "-w", "/workspace", &self.name, "sh", "-e", "-c", &script])
            .output()
            .await
            .map_err(|e| EnvironmentError::ExecFailed(e.to_string()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExecOutput {
            exit_code: output.status.code(),
            output: combined,
        })
    }

    async fn destroy(&mut self) -> Result<(), EnvironmentError> {
        let stop = tokio::process::Command::new("docker")
            .args(["stop", &self.name])
            .output()
            .await
            .map_err(|e| EnvironmentError::DestroyFailed(e.to_string()))?;

        if self.auto_remove {
            let _ = tokio::process::Command::new("docker")
                .args(["rm", "-f", &self.name])
                .output()
                .await;
        }

        remove_containers(&self.services).await;

        if stop.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&stop.stderr).to_string();
            Err(EnvironmentError::DestroyFailed(stderr))
        }
    }
}

/// Assemble `docker create` arguments for the build container.
fn build_create_args(container_name: &str, config: &JobConfig, workspace: &Path) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        container_name.to_string(),
        "-w".to_string(),
        "/workspace".to_string(),
        "-v".to_string(),
        format!("{}:/workspace", workspace.display()),
    ];

    for pair in &config.environment {
        args.push("-e".to_string());
        args.push(pair.clone());
    }

    args.push(config.image.clone());

    // Keep the container alive so phases can exec into it.
    args.push("tail".to_string());
    args.push("-f".to_string());
    args.push("/dev/null".to_string());

    args
}

/// Assemble `docker run -d` arguments for a service container.
fn service_run_args(container_name: &str, spec: &ServiceSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        container_name.to_string(),
    ];

    for pair in &spec.environment {
        args.push("-e".to_string());
        args.push(pair.clone());
    }

    args.push(spec.image.clone());
    args
}

async fn remove_containers(names: &[String]) {
    for name in names {
        let _ = tokio::process::Command::new("docker")
            .args(["rm", "-f", name])
            .output()
            .await;
    }
}

async fn pull_image(image: &str) -> Result<(), EnvironmentError> {
    let output = tokio::process::Command::new("docker")
        .args(["pull", image])
        .output()
        .await
        .map_err(|e| EnvironmentError::DockerNotAvailable(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EnvironmentError::PullFailed(format!("{}: {}", image, stderr)));
    }

    Ok(())
}

/// Generate a short unique container name suffix.
fn name_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let nanos = duration.as_nanos();
    format!("{:08x}", (nanos as u32) ^ (std::process::id() as u32))
}
