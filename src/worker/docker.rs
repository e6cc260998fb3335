//! Docker-backed worker transport
//!
//! Each worker is an ephemeral container created from the configured image
//! with the game data volume mounted read-only. The container's stdin/stdout
//! are attached as a bidirectional stream; replies arrive as newline-framed
//! JSON demultiplexed from the Docker attach stream.

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, KillContainerOptions, LogOutput,
    StartContainerOptions,
};
use bollard::service::HostConfig;
use bollard::Docker;
use bytes::BytesMut;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::worker::{WorkerError, WorkerHandle, WorkerReply, WorkerRequest, WorkerTransport};

/// Label attached to every worker container, valued with the session id.
pub const SESSION_LABEL: &str = "alfworld-session";

/// Command the worker image runs to speak the JSON-lines protocol.
const WORKER_CMD: &[&str] = &["python", "-u", "alfworld/api/worker.py"];

type OutputStream =
    Pin<Box<dyn Stream<Item = Result<LogOutput, bollard::errors::Error>> + Send>>;

pub struct DockerTransport {
    docker: Docker,
    config: Arc<ServerConfig>,
}

impl DockerTransport {
    pub fn new(docker: Docker, config: Arc<ServerConfig>) -> Self {
        Self { docker, config }
    }
}

#[async_trait]
impl WorkerTransport for DockerTransport {
    async fn spawn(&self, session_id: &str) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        let bind = format!(
            "{}:{}:{}",
            self.config.data_host_path(),
            self.config.data_container_path(),
            self.config.data_volume_mode()
        );

        let labels: HashMap<String, String> =
            [(SESSION_LABEL.to_string(), session_id.to_string())]
                .into_iter()
                .collect();

        let container_config = Config {
            image: Some(self.config.docker_image.clone()),
            cmd: Some(WORKER_CMD.iter().map(|s| s.to_string()).collect()),
            open_stdin: Some(true),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            labels: Some(labels),
            host_config: Some(HostConfig {
                binds: Some(vec![bind]),
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: format!("alfworld-session-{}", session_id),
                    platform: None,
                }),
                container_config,
            )
            .await?;

        let attach = self
            .docker
            .attach_container(
                &created.id,
                Some(AttachContainerOptions::<String> {
                    stdin: Some(true),
                    stdout: Some(true),
                    stderr: Some(false),
                    stream: Some(true),
                    ..Default::default()
                }),
            )
            .await?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await?;

        debug!(
            session_id = %session_id,
            container_id = %created.id,
            "worker container started"
        );

        Ok(Box::new(DockerWorker {
            docker: self.docker.clone(),
            container_id: created.id,
            input: attach.input,
            output: attach.output,
            buf: BytesMut::new(),
        }))
    }
}

pub struct DockerWorker {
    docker: Docker,
    container_id: String,
    input: Pin<Box<dyn AsyncWrite + Send>>,
    output: OutputStream,
    buf: BytesMut,
}

impl DockerWorker {
    /// Reads bytes off the attach stream until a full line is buffered.
    async fn read_line(&mut self) -> Result<String, WorkerError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                let text = String::from_utf8_lossy(&line[..pos]).into_owned();
                return Ok(text);
            }

            match self.output.next().await {
                Some(Ok(frame)) => {
                    self.buf.extend_from_slice(&frame.into_bytes());
                }
                Some(Err(err)) => return Err(WorkerError::Docker(err)),
                None => return Err(WorkerError::StreamClosed),
            }
        }
    }
}

#[async_trait]
impl WorkerHandle for DockerWorker {
    async fn exchange(
        &mut self,
        request: &WorkerRequest,
        deadline: Duration,
    ) -> Result<WorkerReply, WorkerError> {
        let mut payload = serde_json::to_vec(request)?;
        payload.push(b'\n');
        self.input.write_all(&payload).await?;
        self.input.flush().await?;

        let line = tokio::time::timeout(deadline, self.read_line())
            .await
            .map_err(|_| WorkerError::Timeout(deadline))??;

        let reply = serde_json::from_str(extract_json_payload(&line))?;
        Ok(reply)
    }

    async fn kill(&mut self) {
        // auto_remove cleans the container up once killed
        if let Err(err) = self
            .docker
            .kill_container(&self.container_id, None::<KillContainerOptions<String>>)
            .await
        {
            warn!(
                container_id = %self.container_id,
                "failed to kill worker container (may already be gone): {}",
                err
            );
        }
    }
}

/// Trims a reply line down to its JSON object. Attach streams occasionally
/// carry stray prefix bytes ahead of the payload.
fn extract_json_payload(line: &str) -> &str {
    let trimmed = line.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    match trimmed.find('{') {
        Some(start) => &trimmed[start..],
        None => trimmed,
    }
}
