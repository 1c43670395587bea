//! An in-memory publish/subscribe message broker: per-topic FIFO queues,
//! at-least-once delivery with explicit acknowledgment, unacked-message
//! redelivery on timeout, and a small schema DSL for validating JSON
//! payloads per topic.

pub mod broker;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod proto;
pub mod queue;
pub mod schema;

pub use broker::{Broker, BrokerHandle};
pub use config::Config;
pub use error::{Error, ErrorKind};
pub use message::{Message, MessageId};

use std::net::SocketAddr;

use log::info;
use tokio::net::TcpListener;

/// A running broker bound to a listener. Dropping or stopping the
/// [`BrokerHandle`] does not close the listener: the connection acceptor
/// exits on a listener close, but in-flight connection tasks continue until
/// their sockets close or the process exits.
pub struct Server {
    pub broker: BrokerHandle,
    pub local_addr: SocketAddr,
    pub broker_task: tokio::task::JoinHandle<()>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl Server {
    /// Aborts the accept loop (no new connections) and stops the broker.
    /// In-flight connections are left to close on their own; there is no
    /// graceful drain.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        let _ = self.broker.stop();
    }
}

/// Binds the configured TCP listener and spawns the broker plus an accept
/// loop. Returns once the listener is bound; the broker and the accept loop
/// keep running in their own tasks until the returned [`Server`] is shut down.
pub async fn serve(config: Config) -> Result<Server, Error> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    let local_addr = listener.local_addr()?;
    info!("listening on {local_addr}");

    let (handle, broker_task) = Broker::spawn(config.clone());
    let accept_handle = handle.clone();
    let accept_task = tokio::spawn(accept_loop(listener, accept_handle, config));

    Ok(Server {
        broker: handle,
        local_addr,
        broker_task,
        accept_task,
    })
}

async fn accept_loop(listener: TcpListener, broker: BrokerHandle, config: Config) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("accepted connection from {addr}");
                let broker = broker.clone();
                let config = config.clone();
                tokio::spawn(connection::handle(stream, broker, config));
            }
            Err(e) => {
                log::error!("accept failed: {e}");
            }
        }
    }
}
