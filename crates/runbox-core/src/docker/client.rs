//! Bollard-backed implementation of the container client.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, ListContainersOptions,
    LogOutput, RemoveContainerOptions, StartContainerOptions, StatsOptions,
    UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;

use super::{
    ByteStream, ContainerBrief, ContainerClient, ContainerError, ContainerSpec, ContainerStats,
    ExecSpec, ExecStatus, LogChunk, LogChunkStream, LogStream,
};

/// Daemon-API container client. Connection parameters come from the ambient
/// Docker environment; the API version is negotiated once at construction.
#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    pub async fn connect() -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_local_defaults()?;
        let docker = docker.negotiate_version().await?;
        Ok(Self { docker })
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[async_trait]
impl ContainerClient for DockerClient {
    async fn list_images(&self) -> Result<Vec<String>, ContainerError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String>::default()))
            .await?;
        Ok(images.into_iter().flat_map(|image| image.repo_tags).collect())
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        let options = CreateImageOptions::<String> {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            step?;
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        let options = CreateContainerOptions::<String> {
            name: spec.name.clone(),
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            working_dir: non_empty(&spec.working_dir),
            user: non_empty(&spec.user),
            host_config: Some(HostConfig {
                auto_remove: Some(spec.auto_remove),
                pids_limit: Some(spec.pids_limit),
                ..Default::default()
            }),
            ..Default::default()
        };
        let response = self.docker.create_container(Some(options), config).await?;
        Ok(response.id)
    }

    async fn copy_in(&self, id: &str, archive: Vec<u8>) -> Result<(), ContainerError> {
        let options = UploadToContainerOptions {
            path: "/",
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), archive.into())
            .await?;
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<(), ContainerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn create_exec(&self, id: &str, spec: &ExecSpec) -> Result<String, ContainerError> {
        let options = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(spec.cmd.clone()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            ..Default::default()
        };
        let created = self.docker.create_exec(id, options).await?;
        Ok(created.id)
    }

    async fn attach_exec(&self, exec_id: &str) -> Result<LogChunkStream, ContainerError> {
        match self.docker.start_exec(exec_id, None::<StartExecOptions>).await? {
            StartExecResults::Attached { output, .. } => {
                let chunks = output.filter_map(|item| async {
                    match item {
                        Ok(LogOutput::StdOut { message }) => Some(Ok(LogChunk {
                            stream: LogStream::Stdout,
                            bytes: message,
                        })),
                        Ok(LogOutput::StdErr { message }) => Some(Ok(LogChunk {
                            stream: LogStream::Stderr,
                            bytes: message,
                        })),
                        Ok(_) => None,
                        Err(err) => Some(Err(ContainerError::Api(err))),
                    }
                });
                Ok(Box::pin(chunks))
            }
            StartExecResults::Detached => {
                Err(ContainerError::Fault("exec started detached".to_string()))
            }
        }
    }

    async fn stats_once(&self, id: &str) -> Result<ContainerStats, ContainerError> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };
        let mut samples = self.docker.stats(id, Some(options));
        match samples.next().await {
            Some(stats) => {
                let stats = stats?;
                Ok(ContainerStats {
                    cpu_total_ns: stats.cpu_stats.cpu_usage.total_usage,
                    memory_bytes: stats.memory_stats.usage.unwrap_or(0),
                })
            }
            None => Err(ContainerError::Fault("empty stats response".to_string())),
        }
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus, ContainerError> {
        let inspected = self.docker.inspect_exec(exec_id).await?;
        Ok(ExecStatus {
            exit_code: inspected.exit_code,
            running: inspected.running.unwrap_or(false),
        })
    }

    async fn copy_out(&self, id: &str, path: &str) -> Result<ByteStream, ContainerError> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let stream = self
            .docker
            .download_from_container(id, Some(options))
            .map(|item| item.map_err(ContainerError::Api));
        Ok(Box::pin(stream))
    }

    async fn remove_container(&self, id: &str) -> Result<(), ContainerError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerBrief>, ContainerError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerBrief {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                created_at: c.created.unwrap_or_default(),
            })
            .collect())
    }
}
