//! Remote host operations over ssh and scp

use crate::core::environment::{Credentials, RemoteHost};
use crate::core::error::{PipelineError, Result};
use crate::local::{CommandOutput, CommandRunner, Invocation, RunError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Copies files to and runs commands on a remote host.
///
/// A single attempt is made per call; failures are never retried.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Copy a local file to `remote_path` on the host
    async fn copy(&self, host: &RemoteHost, local_path: &str, remote_path: &str) -> Result<()>;

    /// Run a command on the host and return its output
    async fn execute(&self, host: &RemoteHost, command: &str) -> Result<CommandOutput>;
}

/// Drives the system `ssh` and `scp` binaries.
///
/// Password credentials go through `sshpass -e` so the secret travels in
/// the environment, never on the command line.
pub struct SshRemoteExecutor {
    runner: Arc<dyn CommandRunner>,
    timeout_secs: u64,
    connect_timeout_secs: u64,
}

impl SshRemoteExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout_secs: u64) -> Self {
        Self {
            runner,
            timeout_secs,
            connect_timeout_secs: 10,
        }
    }

    fn common_options(&self, host: &RemoteHost, port_flag: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Credentials::KeyPair { identity_file } = &host.credentials {
            args.push("-i".to_string());
            args.push(identity_file.clone());
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }

        if host.port != 22 {
            args.push(port_flag.to_string());
            args.push(host.port.to_string());
        }

        args.extend([
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ]);
        args
    }

    /// Wrap the program in `sshpass` when the host authenticates by password
    fn invocation(&self, host: &RemoteHost, program: &str, args: Vec<String>) -> Invocation {
        match &host.credentials {
            Credentials::Password(password) => Invocation::new("sshpass", self.timeout_secs)
                .arg("-e")
                .arg(program)
                .args(args)
                .env("SSHPASS", password.clone()),
            Credentials::KeyPair { .. } => Invocation::new(program, self.timeout_secs).args(args),
        }
    }

    pub(crate) fn ssh_invocation(&self, host: &RemoteHost, command: &str) -> Invocation {
        let mut args = self.common_options(host, "-p");
        args.push(format!("{}@{}", host.user, host.host));
        args.push(command.to_string());
        self.invocation(host, "ssh", args)
    }

    pub(crate) fn scp_invocation(&self, host: &RemoteHost, local_path: &str, remote_path: &str) -> Invocation {
        let mut args = self.common_options(host, "-P");
        args.push(local_path.to_string());
        args.push(format!("{}@{}:{}", host.user, host.host, remote_path));
        self.invocation(host, "scp", args)
    }

    async fn run(&self, host: &RemoteHost, operation: &str, invocation: Invocation) -> Result<CommandOutput> {
        debug!("Remote {} on {}: {:?}", operation, host, invocation);

        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e: RunError| PipelineError::RemoteOperationFailed {
                host: host.to_string(),
                operation: operation.to_string(),
                exit_code: None,
                stderr: e.to_string(),
            })?;

        if !output.is_success() {
            return Err(PipelineError::RemoteOperationFailed {
                host: host.to_string(),
                operation: operation.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl RemoteExecutor for SshRemoteExecutor {
    async fn copy(&self, host: &RemoteHost, local_path: &str, remote_path: &str) -> Result<()> {
        if !std::path::Path::new(local_path).is_file() {
            return Err(PipelineError::RemoteOperationFailed {
                host: host.to_string(),
                operation: "copy".to_string(),
                exit_code: None,
                stderr: format!("local file {} does not exist", local_path),
            });
        }

        let invocation = self.scp_invocation(host, local_path, remote_path);
        self.run(host, "copy", invocation).await?;
        info!("Copied {} to {}:{}", local_path, host, remote_path);
        Ok(())
    }

    async fn execute(&self, host: &RemoteHost, command: &str) -> Result<CommandOutput> {
        let invocation = self.ssh_invocation(host, command);
        let output = self.run(host, "execute", invocation).await?;
        info!("Ran '{}' on {}", command, host);
        Ok(output)
    }
}
