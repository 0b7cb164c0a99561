/// Signal handling for graceful shutdown.
///
/// SIGINT (Ctrl-C) and SIGTERM both request shutdown; the watchdog stops at
/// its next sleep instead of finishing the current delay.
use std::future::Future;
use tokio::sync::watch;

/// Sending half: flips the shared flag once.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half, handed to the watchdog loop.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// Create a linked trigger and receiver.
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn requested(&mut self) {
        if self.rx.wait_for(|requested| *requested).await.is_err() {
            // Trigger dropped without firing: shutdown can no longer happen.
            std::future::pending::<()>().await;
        }
    }
}

/// Install SIGINT/SIGTERM handlers and return the shutdown receiver.
pub fn install() -> std::io::Result<Shutdown> {
    let (trigger, shutdown) = Shutdown::channel();
    let signal = wait_for_signal()?;

    tokio::spawn(async move {
        signal.await;
        trigger.fire();
    });

    Ok(shutdown)
}

#[cfg(unix)]
fn wait_for_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    })
}

#[cfg(not(unix))]
fn wait_for_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl-C, shutting down");
    })
}
