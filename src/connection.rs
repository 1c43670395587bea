//! Per-connection reader/writer tasks bridging the wire codec and the
//! broker actor. Two tasks per connection: the reader never writes to the
//! socket, the writer never reads broker state.

use std::time::Duration;

use log::{error, info, trace};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::broker::{BrokerHandle, ConsumerChannel};
use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::message::{Message, MessageId};
use crate::proto::{self, Frame, FrameReader};
use crate::schema::Schema;

const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30 * 60);

macro_rules! pretty_error {
    ($peer:expr, $err:expr) => {
        if $err.kind() != ErrorKind::Eof {
            error!("client {} error: {}", $peer, $err);
        }
    };
}

pub async fn handle(stream: TcpStream, broker: BrokerHandle, config: Config) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_owned());

    if let Err(e) = stream.set_nodelay(true) {
        error!("client {peer}: set_nodelay failed: {e}");
    }

    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_PERIOD);
    if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
        error!("client {peer}: set_tcp_keepalive failed: {e}");
    }

    let (read_half, mut write_half) = stream.into_split();

    if let Err(e) = proto::write_welcome(&mut write_half).await {
        error!("client {peer}: failed to send welcome: {e}");
        return;
    }

    let (channel, consumer_rx) = ConsumerChannel::new(config.consumer_queue_size);

    let writer_peer = peer.clone();
    let writer_task = tokio::spawn(async move {
        while let Ok(message) = consumer_rx.recv().await {
            if let Err(e) = proto::write_msg(&mut write_half, &message.topic, &message.id, &message.payload).await {
                pretty_error!(writer_peer, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    info!("client {peer} connected");
    let reader = FrameReader::new(BufReader::with_capacity(config.buf_size, read_half));
    let result = read_loop(reader, &broker, channel.clone(), &peer).await;
    if let Err(e) = result {
        pretty_error!(peer, e);
    }

    writer_task.abort();
    let _ = broker.remove(channel);
    info!("client {peer} disconnected");
}

async fn read_loop<R: tokio::io::AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    broker: &BrokerHandle,
    channel: ConsumerChannel,
    peer: &str,
) -> Result<(), Error> {
    loop {
        let frame = match reader.read_frame().await {
            Ok(frame) => frame,
            Err(e) if e.kind() == ErrorKind::Protocol => {
                // malformed frame: log and keep reading, do not close the socket
                trace!("client {peer}: protocol error: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };

        match frame {
            Frame::Sub { topic } => {
                broker.register(topic, channel.clone())?;
            }
            Frame::Unsub { .. } => {
                // the core has no per-channel multi-topic bookkeeping; removing
                // unsubscribes from every topic this channel is registered on.
                broker.remove(channel.clone())?;
            }
            Frame::Pub { topic, payload } => {
                let id = MessageId::generate();
                broker.publish(Message::new(id, topic, payload))?;
            }
            Frame::Ack { id } => {
                broker.ack(id)?;
            }
            Frame::Schema { topic, text } => match Schema::compile(&text) {
                Ok(schema) => {
                    broker.set_schema(topic, schema)?;
                }
                Err(e) => {
                    trace!("client {peer}: schema compile error: {e}");
                }
            },
        }
    }
}
