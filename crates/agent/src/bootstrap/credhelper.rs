// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git credential helper installed into the devcontainer.
//!
//! The helper is a small shell script that asks the node agent itself for
//! credentials; the agent proxies the Control Plane with the workspace's
//! callback bearer. Privileged steps (`chmod`, `git config --system`)
//! always run as root regardless of the container's default user.

use tokio::process::Command;

/// Install path inside the devcontainer.
pub const HELPER_PATH: &str = "/usr/local/bin/git-credential-sam";

/// Render the helper script.
pub fn render_script(port: u16, callback_token: &str) -> String {
    format!(
        "#!/bin/sh\n\
         # git credential helper; fetches credentials from the node agent.\n\
         case \"$1\" in\n\
           get)\n\
             exec curl -fsS -X POST \"http://localhost:{port}/git/credentials\" \\\n\
               -H \"Authorization: Bearer {callback_token}\" \\\n\
               -H \"Content-Type: text/plain\" \\\n\
               --data-binary @-\n\
             ;;\n\
           *)\n\
             exit 0\n\
             ;;\n\
         esac\n"
    )
}

/// Copy the helper into the container and register it system-wide.
pub async fn install(container_id: &str, port: u16, callback_token: &str) -> anyhow::Result<()> {
    let script = render_script(port, callback_token);
    let tmp = tempfile::NamedTempFile::new()?;
    tokio::fs::write(tmp.path(), &script).await?;

    run_docker(&[
        "cp",
        &tmp.path().to_string_lossy(),
        &format!("{container_id}:{HELPER_PATH}"),
    ])
    .await?;
    run_docker(&["exec", "-u", "root", container_id, "chmod", "0755", HELPER_PATH]).await?;
    run_docker(&[
        "exec",
        "-u",
        "root",
        container_id,
        "git",
        "config",
        "--system",
        "credential.helper",
        HELPER_PATH,
    ])
    .await?;
    Ok(())
}

async fn run_docker(args: &[&str]) -> anyhow::Result<()> {
    let output = Command::new("docker").args(args).output().await?;
    if !output.status.success() {
        anyhow::bail!(
            "docker {} failed: {}",
            args.first().copied().unwrap_or(""),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "credhelper_tests.rs"]
mod tests;
