//! External payload launcher.
//!
//! The election core only emits transition events; this task turns them
//! into processes, so the elected leader performs its work while the
//! followers stand by. Launch failures are logged and never affect the
//! election.

use ccs_core::RoleEvent;
use std::path::PathBuf;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(
    mut events: mpsc::UnboundedReceiver<RoleEvent>,
    leader_script: Option<PathBuf>,
    follower_script: Option<PathBuf>,
) {
    while let Some(event) = events.recv().await {
        let script = match event {
            RoleEvent::BecameLeader => &leader_script,
            RoleEvent::BecameFollower => &follower_script,
        };
        let Some(path) = script else {
            continue;
        };
        info!("launching {:?} payload {}", event, path.display());
        match Command::new(path).spawn() {
            Ok(mut child) => {
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) => info!("payload exited with {}", status),
                        Err(error) => warn!("payload wait failed: {}", error),
                    }
                });
            }
            Err(error) => {
                warn!("could not launch payload {}: {}", path.display(), error);
            }
        }
    }
}
