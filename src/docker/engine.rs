use anyhow::{Result, bail};

use super::run::{self, DockerCommand};

/// Verify that the Docker daemon is reachable. Returns the server version.
pub fn ensure_available(program: &str) -> Result<String> {
    let cmd = DockerCommand::new(
        program,
        vec![
            "version".into(),
            "--format".into(),
            "{{.Server.Version}}".into(),
        ],
    );
    let result = run::run(cmd, |_| {})?;

    if !result.success {
        bail!(
            "docker daemon is not running (exit {:?}): {}",
            result.exit_code,
            result.stderr.trim()
        );
    }
    Ok(result.stdout.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_available_fails_for_missing_binary() {
        assert!(ensure_available("definitely-not-docker-xyz").is_err());
    }
}
