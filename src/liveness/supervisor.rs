//! Process supervisor notifications (systemd `sd_notify` protocol).

/// Signals sent to the process supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorSignal {
    /// The exporter is serving requests.
    Ready,
    /// Periodic heartbeat after a successful self-check.
    Watchdog,
}

impl SupervisorSignal {
    /// Wire form of the signal.
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorSignal::Ready => "READY=1",
            SupervisorSignal::Watchdog => "WATCHDOG=1",
        }
    }
}

/// Receiver of supervisor signals.
///
/// Notification is fire-and-forget; implementations log failures and
/// never report them to the caller.
pub trait Supervisor {
    /// Delivers one signal.
    fn notify(&self, signal: SupervisorSignal);
}

/// Supervisor that discards every signal, for targets without `sd_notify`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSupervisor;

impl Supervisor for NoopSupervisor {
    fn notify(&self, signal: SupervisorSignal) {
        tracing::trace!(signal = signal.as_str(), "Supervisor notification dropped");
    }
}

/// Sends notifications to systemd over `$NOTIFY_SOCKET`.
///
/// Without a socket (not started by systemd, or on non-Unix targets)
/// every notification is a no-op.
#[derive(Debug, Clone, Default)]
pub struct SystemdNotifier {
    socket: Option<String>,
}

impl SystemdNotifier {
    /// Reads the socket path from `$NOTIFY_SOCKET`.
    pub fn from_env() -> Self {
        let socket = std::env::var("NOTIFY_SOCKET")
            .ok()
            .filter(|s| !s.is_empty());
        if socket.is_none() {
            tracing::debug!("NOTIFY_SOCKET not set, supervisor notifications disabled");
        }
        Self { socket }
    }

    /// Uses an explicit socket path. A leading `@` names an abstract socket.
    pub fn with_socket(socket: impl Into<String>) -> Self {
        Self {
            socket: Some(socket.into()),
        }
    }

    #[cfg(unix)]
    fn send(socket: &str, message: &str) -> std::io::Result<()> {
        use std::os::unix::net::UnixDatagram;

        let datagram = UnixDatagram::unbound()?;

        #[cfg(target_os = "linux")]
        if let Some(name) = socket.strip_prefix('@') {
            use std::os::linux::net::SocketAddrExt;
            let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
            datagram.send_to_addr(message.as_bytes(), &addr)?;
            return Ok(());
        }

        datagram.send_to(message.as_bytes(), socket)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn send(_socket: &str, _message: &str) -> std::io::Result<()> {
        Ok(())
    }
}

impl Supervisor for SystemdNotifier {
    fn notify(&self, signal: SupervisorSignal) {
        let Some(socket) = &self.socket else {
            return;
        };

        match Self::send(socket, signal.as_str()) {
            Ok(()) => tracing::debug!(signal = signal.as_str(), "Notified supervisor"),
            Err(e) => tracing::debug!(
                signal = signal.as_str(),
                error = %e,
                "Failed to notify supervisor"
            ),
        }
    }
}
