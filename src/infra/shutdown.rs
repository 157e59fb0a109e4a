use std::io;

use tracing::info;

/// Process signals that ask the worker to drain and exit.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Register the handlers. Signals arriving after this returns are not lost.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// Wait for ctrl-c or SIGTERM and return the name of the signal received.
    pub async fn recv(mut self) -> io::Result<&'static str> {
        #[cfg(unix)]
        let terminate = async {
            self.terminate.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let received = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                "ctrl-c"
            }
            _ = terminate => "SIGTERM",
        };

        info!(
            target = "infra::shutdown",
            signal = received,
            "shutdown signal received"
        );
        Ok(received)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{process::Command, time::Duration};

    use super::*;

    #[tokio::test]
    async fn sigterm_triggers_shutdown() {
        let signal = ShutdownSignal::install().expect("install handlers");

        let status = Command::new("kill")
            .arg("-TERM")
            .arg(std::process::id().to_string())
            .status()
            .expect("run kill");
        assert!(status.success());

        let received = tokio::time::timeout(Duration::from_secs(5), signal.recv())
            .await
            .expect("signal observed in time")
            .expect("signal stream open");
        assert_eq!(received, "SIGTERM");
    }
}
