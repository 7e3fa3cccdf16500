//! Bluetooth pairing of the controller
//!
//! The control core only needs a connected input device. Getting there is the
//! job of a [`PairingService`]; [`Bluetoothctl`] drives BlueZ through its
//! command line client.

use std::future::Future;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

const BLUETOOTHCTL: &str = "bluetoothctl";

// Discovery window for `scan on`; bluetoothctl would otherwise keep scanning
const SCAN_TIMEOUT_SECS: &str = "5";

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("Failed to run `{step}`: {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{step}` failed: {output}")]
    StepFailed { step: String, output: String },
}

pub trait PairingService: Send + Sync {
    /// Pairs (if needed) and connects the controller at `address`
    fn connect(&self, address: &str) -> impl Future<Output = Result<(), PairingError>> + Send;

    /// Drops the connection, called from the termination path
    fn disconnect(&self, address: &str) -> impl Future<Output = Result<(), PairingError>> + Send;
}

pub struct Bluetoothctl {
    settle: Duration,
}

impl Bluetoothctl {
    /// `settle` is the pause after pairing and connecting, giving the kernel
    /// time to create the input node
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    async fn run(&self, args: &[&str]) -> Result<String, PairingError> {
        let step = format!("{} {}", BLUETOOTHCTL, args.join(" "));
        debug!("Running {}", step);

        let output = Command::new(BLUETOOTHCTL)
            .args(args)
            .output()
            .await
            .map_err(|source| PairingError::Spawn {
                step: step.clone(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(text)
        } else {
            Err(PairingError::StepFailed { step, output: text })
        }
    }

    /// Runs a step whose failure does not stop pairing
    async fn run_tolerated(&self, args: &[&str]) {
        if let Err(e) = self.run(args).await {
            warn!("{}", e);
        }
    }
}

/// Adapter setup before pairing, in order. The adapter has to be powered
/// with an agent registered before trusting and scanning do anything.
fn preparation_steps(address: &str) -> [Vec<&str>; 5] {
    [
        vec!["power", "on"],
        vec!["agent", "on"],
        vec!["default-agent"],
        vec!["trust", address],
        vec!["--timeout", SCAN_TIMEOUT_SECS, "scan", "on"],
    ]
}

impl PairingService for Bluetoothctl {
    async fn connect(&self, address: &str) -> Result<(), PairingError> {
        info!("Preparing bluetooth adapter for {}", address);
        for step in preparation_steps(address) {
            self.run_tolerated(&step).await;
        }

        // Already paired devices make this fail, connecting still works
        match self.run(&["pair", address]).await {
            Ok(output) => info!("Pairing output: {}", output.trim()),
            Err(e) => warn!("Failed to pair device: {}", e),
        }
        tokio::time::sleep(self.settle).await;

        info!("Connecting to the device...");
        let output = self.run(&["connect", address]).await?;
        info!("Connection output: {}", output.trim());
        tokio::time::sleep(self.settle).await;

        Ok(())
    }

    async fn disconnect(&self, address: &str) -> Result<(), PairingError> {
        info!("Disconnecting controller {}", address);
        self.run(&["disconnect", address]).await.map(|_| ())
    }
}
