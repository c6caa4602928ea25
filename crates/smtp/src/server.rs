use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use mailbox::Mailbox;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use self::session::Session;

pub mod session;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind, `127.0.0.1` by default.
    pub hostname: String,
    /// Port to bind, `2525` by default.
    pub port: u16,
    /// Domain the server announces in its replies.
    pub domain: String,
    /// Try successive ports when the requested one is taken.
    pub port_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_owned(),
            port: 2525,
            domain: "kuvert.email".to_owned(),
            port_fallback: false,
        }
    }
}

/// A running SMTP server.
///
/// Owns the listener task and the mailbox holding accepted messages.
/// Dropping the handle without calling [`Server::stop`] also shuts the
/// listener down, but without waiting for in-flight sessions.
#[derive(Debug)]
pub struct Server {
    local_addr: SocketAddr,
    mailbox: Arc<Mailbox>,
    shutdown: oneshot::Sender<()>,
    accept_loop: JoinHandle<()>,
}

impl Server {
    /// Bind and start serving.
    ///
    /// # Errors
    ///
    /// Fails with the underlying bind error; `AddrInUse` only surfaces when
    /// `port_fallback` is off.
    pub async fn start(config: Config) -> std::io::Result<Self> {
        let listener = bind(&config).await?;
        let local_addr = listener.local_addr()?;
        info!("listening on {local_addr}");

        let mailbox = Arc::new(Mailbox::new());
        let (shutdown, shutdown_rx) = oneshot::channel();

        let accept_loop = tokio::spawn(accept_loop(
            listener,
            Arc::from(config.domain),
            Arc::clone(&mailbox),
            shutdown_rx,
        ));

        Ok(Self {
            local_addr,
            mailbox,
            shutdown,
            accept_loop,
        })
    }

    /// The address the server actually bound, which differs from the
    /// configured one under `port_fallback` or port 0.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Query facet over the accepted messages.
    #[must_use]
    pub fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Stop accepting connections and wait for in-flight sessions to drain.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.accept_loop.await {
            error!("accept loop panicked: {e:?}");
        }
    }
}

async fn bind(config: &Config) -> std::io::Result<TcpListener> {
    let mut port = config.port;

    loop {
        match TcpListener::bind((config.hostname.as_str(), port)).await {
            Ok(listener) => return Ok(listener),
            Err(e)
                if config.port_fallback && e.kind() == ErrorKind::AddrInUse && port < u16::MAX =>
            {
                debug!(port, "port taken, trying the next one");
                port += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    domain: Arc<str>,
    mailbox: Arc<Mailbox>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("connection from {addr}");
                    let session = Session::new(stream, Arc::clone(&domain), Arc::clone(&mailbox));
                    sessions.spawn(async move {
                        if let Err(e) = session.run().await {
                            error!("session error: {e:?}");
                        }
                    });
                }
                Err(e) => warn!("accept failed: {e:?}"),
            },
            _ = &mut shutdown => break,
        }
    }

    // no new connections past this point; let running sessions finish
    drop(listener);
    while sessions.join_next().await.is_some() {}
    debug!("all sessions drained");
}
