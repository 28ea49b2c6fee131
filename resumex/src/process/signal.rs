//! Operator interruption signals.
//!
//! Listens for SIGINT/SIGTERM on behalf of the supervisor and forwards the
//! received signal to the child process.

use std::fmt;
use std::io;

use tokio::process::Child;

/// Signal that asked the wrapped command to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Interactive interrupt (Ctrl-C).
    Sigint,
    /// Polite termination request.
    Sigterm,
}

impl Interrupt {
    /// Conventional signal name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sigint => "SIGINT",
            Self::Sigterm => "SIGTERM",
        }
    }

    #[cfg(unix)]
    const fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            Self::Sigint => nix::sys::signal::Signal::SIGINT,
            Self::Sigterm => nix::sys::signal::Signal::SIGTERM,
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Process-wide listener for SIGINT and SIGTERM.
///
/// While a listener exists the signals no longer terminate this process.
#[cfg(unix)]
#[derive(Debug)]
pub struct InterruptListener {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl InterruptListener {
    /// Install handlers for both signals.
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next interruption.
    pub async fn recv(&mut self) -> Interrupt {
        tokio::select! {
            _ = self.sigint.recv() => Interrupt::Sigint,
            _ = self.sigterm.recv() => Interrupt::Sigterm,
        }
    }
}

/// Process-wide listener for Ctrl-C.
#[cfg(not(unix))]
#[derive(Debug)]
pub struct InterruptListener;

#[cfg(not(unix))]
impl InterruptListener {
    /// Nothing to install ahead of time on this platform.
    #[allow(clippy::unnecessary_wraps)]
    pub const fn install() -> io::Result<Self> {
        Ok(Self)
    }

    /// Wait for the next interruption.
    pub async fn recv(&mut self) -> Interrupt {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
        Interrupt::Sigint
    }
}

/// Deliver `interrupt` to the child. A child that was already reaped is ignored.
#[cfg(unix)]
#[allow(clippy::needless_pass_by_ref_mut)]
pub fn forward(child: &mut Child, interrupt: Interrupt) -> io::Result<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    kill(Pid::from_raw(pid), interrupt.as_nix()).map_err(io::Error::from)
}

/// Without POSIX signals the best we can do is ask the child to terminate.
#[cfg(not(unix))]
pub fn forward(child: &mut Child, _interrupt: Interrupt) -> io::Result<()> {
    child.start_kill()
}
