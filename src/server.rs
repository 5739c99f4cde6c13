use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::BufReader,
    net::{TcpListener, TcpSocket, TcpStream},
    sync::watch,
    task::{JoinError, JoinSet},
};

use crate::{
    draw::{DrawBarrier, Outcome},
    protocol::{
        framing::{self, FramingError},
        message::{Batch, Request, RequestErr, Response},
    },
    registry::{ConnectionRegistry, Registration},
    store::{BetStore, StoreError},
};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub listen_backlog: u32,
    pub agencies: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchErr {
    #[error("{0}")]
    Request(#[from] RequestErr),

    #[error("failed to store the bets: {0}")]
    Store(#[from] StoreError),
}

/// Used to stop a running server
///
/// dropping every handle without triggering leaves the server running.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Starts the shutdown of the server
    ///
    /// returns false if the shutdown had already been triggered.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopping| {
            if *stopping {
                return false;
            }

            *stopping = true;
            true
        })
    }
}

struct Shared {
    store: Arc<dyn BetStore>,
    barrier: DrawBarrier,
}

pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
    registry: ConnectionRegistry,
    shutdown: watch::Receiver<bool>,
}

impl Server {
    /// Binds the listening socket
    ///
    /// note: this function needs to be called from inside a tokio runtime context
    pub fn bind(
        config: &ServerConfig,
        store: Arc<dyn BetStore>,
    ) -> tokio::io::Result<(Self, ShutdownHandle)> {
        let socket = match config.addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.addr)?;
        let listener = socket.listen(config.listen_backlog)?;

        let (tx, shutdown) = watch::channel(false);
        let server = Self {
            listener,
            shared: Arc::new(Shared {
                barrier: DrawBarrier::new(config.agencies, store.clone()),
                store,
            }),
            registry: ConnectionRegistry::default(),
            shutdown,
        };

        Ok((server, ShutdownHandle { tx: Arc::new(tx) }))
    }

    pub fn local_addr(&self) -> tokio::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the shutdown is triggered
    ///
    /// once triggered, the listener is closed, every open connection is asked
    /// to close, and this returns after every connection handler has finished.
    pub async fn run(self) {
        let Self {
            listener,
            shared,
            registry,
            mut shutdown,
        } = self;

        let mut handlers = JoinSet::new();

        loop {
            let (stream, peer) = tokio::select! {
                // only a bool leaves this branch, the watch guard must not live across awaits
                true = async { shutdown.wait_for(|stopping| *stopping).await.is_ok() } => break,
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    report_handler(joined);
                    continue;
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(reason) => {
                        tracing::error!("failed to accept a connection: {}", reason);
                        // e.g. out of file descriptors, let some connections finish first
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            tracing::info!("accepted a connection from {}", peer);
            let registration = registry.register(peer);
            handlers.spawn(handle_connection(stream, registration, shared.clone()));

            // the last agency may be waiting already
            shared.barrier.maybe_draw().await;
        }

        tracing::info!("shutting down");
        drop(listener);

        let closed = registry.close_all();
        tracing::info!("asked {} open connections to close", closed);

        while let Some(joined) = handlers.join_next().await {
            report_handler(joined);
        }

        tracing::info!("server stopped");
    }
}

fn report_handler(joined: Result<(), JoinError>) {
    if let Err(reason) = joined {
        tracing::error!("a connection handler failed: {}", reason);
    }
}

// Serves a single request, the connection is closed once this returns
async fn handle_connection(stream: TcpStream, mut registration: Registration, shared: Arc<Shared>) {
    let peer = registration.peer();
    let mut stream = BufReader::new(stream);

    let received = tokio::select! {
        received = framing::read_message(&mut stream) => received,
        _ = registration.closed() => {
            tracing::debug!("closed {} while waiting for its message", peer);
            return;
        }
    };

    let payload = match received {
        Ok(payload) => payload,
        Err(FramingError::Closed) => {
            tracing::debug!("{} disconnected without sending a message", peer);
            return;
        }
        Err(reason) => {
            tracing::warn!("failed to receive a message from {}: {}", peer, reason);
            return;
        }
    };
    tracing::debug!("received from {}: {:?}", peer, payload);

    // never interrupted, so bets are either fully stored or not at all
    let response = match shared.dispatch(&payload).await {
        Ok(response) => response.to_string(),
        Err(reason) => {
            tracing::error!("failed to handle the request of {}: {}", peer, reason);
            return;
        }
    };

    tokio::select! {
        sent = framing::write_message(&mut stream, &response) => match sent {
            Ok(()) => tracing::debug!("responded to {}: {:?}", peer, response),
            Err(reason) => tracing::warn!("failed to respond to {}: {}", peer, reason),
        },
        _ = registration.closed() => {
            tracing::debug!("closed {} before responding", peer);
        }
    }
}

impl Shared {
    async fn dispatch(&self, payload: &str) -> Result<Response, DispatchErr> {
        match payload.parse::<Request>()? {
            Request::Bets(Batch { bets, malformed }) => {
                self.store.store_bets(&bets).await?;
                tracing::info!(
                    "stored {} bets, discarded {} malformed ones",
                    bets.len(),
                    malformed
                );

                Ok(Response::Stored(bets.len()))
            }
            Request::Winners { agency } => match self.barrier.query(agency).await {
                Outcome::Pending => Ok(Response::NotYet),
                Outcome::Winners(documents) => Ok(Response::Winners(documents)),
            },
        }
    }
}
