//! The broker actor: a single-writer event loop owning all topic,
//! subscription, queue and unacked state. All state mutation happens inside
//! [`Broker::run`]; external callers submit events through [`BrokerHandle`]
//! and never touch broker state directly.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, trace, warn};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::Error;
use crate::message::{Message, MessageId};
use crate::queue::Queue;
use crate::schema::Schema;

/// A consumer's bounded (capacity 1, per config) outbound slot. Identity is
/// the channel itself, compared with [`async_channel::Sender::same_channel`],
/// which is what lets `Remove` find and drop the right entry.
#[derive(Clone)]
pub struct ConsumerChannel {
    tx: async_channel::Sender<Message>,
}

impl ConsumerChannel {
    pub fn new(capacity: usize) -> (Self, async_channel::Receiver<Message>) {
        let (tx, rx) = async_channel::bounded(capacity);
        (Self { tx }, rx)
    }

    fn try_send(&self, message: Message) -> bool {
        self.tx.try_send(message).is_ok()
    }
}

impl PartialEq for ConsumerChannel {
    fn eq(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

struct TopicState {
    queue: Queue<Message>,
    consumers: Vec<ConsumerChannel>,
    schema: Option<Schema>,
}

impl TopicState {
    fn new() -> Self {
        Self {
            queue: Queue::new(),
            consumers: Vec::new(),
            schema: None,
        }
    }
}

struct UnackedEntry {
    message: Message,
    delivered_at: Instant,
}

enum BrokerEvent {
    Register {
        topic: String,
        channel: ConsumerChannel,
    },
    Remove {
        channel: ConsumerChannel,
    },
    Publish {
        message: Message,
    },
    Ack {
        id: MessageId,
    },
    Nack {
        id: MessageId,
    },
    SetSchema {
        topic: String,
        schema: Schema,
    },
    Stop,
}

/// A cheaply-cloneable handle to a running broker. Submitting an event never
/// blocks on broker state: it enqueues onto an unbounded channel, so a slow
/// broker never imposes producer backpressure.
#[derive(Clone)]
pub struct BrokerHandle {
    events: mpsc::UnboundedSender<BrokerEvent>,
}

impl BrokerHandle {
    fn send(&self, event: BrokerEvent) -> Result<(), Error> {
        self.events
            .send(event)
            .map_err(|_| Error::internal("broker task is no longer running"))
    }

    pub fn register(&self, topic: String, channel: ConsumerChannel) -> Result<(), Error> {
        self.send(BrokerEvent::Register { topic, channel })
    }

    pub fn remove(&self, channel: ConsumerChannel) -> Result<(), Error> {
        self.send(BrokerEvent::Remove { channel })
    }

    pub fn publish(&self, message: Message) -> Result<(), Error> {
        self.send(BrokerEvent::Publish { message })
    }

    pub fn ack(&self, id: MessageId) -> Result<(), Error> {
        self.send(BrokerEvent::Ack { id })
    }

    pub fn nack(&self, id: MessageId) -> Result<(), Error> {
        self.send(BrokerEvent::Nack { id })
    }

    pub fn set_schema(&self, topic: String, schema: Schema) -> Result<(), Error> {
        self.send(BrokerEvent::SetSchema { topic, schema })
    }

    pub fn stop(&self) -> Result<(), Error> {
        self.send(BrokerEvent::Stop)
    }
}

pub struct Broker {
    config: Config,
    topics: HashMap<String, TopicState>,
    unacked: HashMap<MessageId, UnackedEntry>,
    events_rx: mpsc::UnboundedReceiver<BrokerEvent>,
    deliver_tx: mpsc::Sender<()>,
    deliver_rx: mpsc::Receiver<()>,
}

impl Broker {
    /// Spawns the broker's event loop as its own task and returns a handle
    /// to it plus the task's join handle.
    pub fn spawn(config: Config) -> (BrokerHandle, tokio::task::JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (deliver_tx, deliver_rx) = mpsc::channel(1);
        let broker = Broker {
            config,
            topics: HashMap::new(),
            unacked: HashMap::new(),
            events_rx,
            deliver_tx,
            deliver_rx,
        };
        let join = tokio::spawn(broker.run());
        (BrokerHandle { events: events_tx }, join)
    }

    async fn run(mut self) {
        let mut unacked_ticker = tokio::time::interval(self.config.unacked_scan_interval);
        // the first tick fires immediately; that isn't useful work here.
        unacked_ticker.tick().await;

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(BrokerEvent::Stop) | None => {
                            debug!("broker stopping");
                            return;
                        }
                        Some(event) => self.handle_event(event),
                    }
                }
                Some(()) = self.deliver_rx.recv() => {
                    self.deliver_messages();
                }
                _ = unacked_ticker.tick() => {
                    self.check_unacked();
                }
            }
        }
    }

    fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Register { topic, channel } => {
                self.topic_mut(&topic).consumers.push(channel);
                trace!("registered consumer on topic {topic}");
                self.raise_deliver();
            }
            BrokerEvent::Remove { channel } => {
                for topic in self.topics.values_mut() {
                    topic.consumers.retain(|c| *c != channel);
                }
            }
            BrokerEvent::Publish { message } => self.publish(message),
            BrokerEvent::Ack { id } => {
                self.unacked.remove(&id);
            }
            BrokerEvent::Nack { id } => self.nack(id),
            BrokerEvent::SetSchema { topic, schema } => {
                self.topic_mut(&topic).schema = Some(schema);
            }
            BrokerEvent::Stop => unreachable!("handled in run()"),
        }
    }

    fn publish(&mut self, message: Message) {
        let topic = self.topic_mut(&message.topic);
        if let Some(schema) = &topic.schema {
            match serde_json::from_slice::<serde_json::Value>(&message.payload) {
                Ok(serde_json::Value::Object(object)) => {
                    if let Err(e) = schema.validate(&object) {
                        warn!("dropping message for topic {}: {e}", message.topic);
                        return;
                    }
                }
                Ok(_) => {
                    warn!("dropping message for topic {}: payload is not a JSON object", message.topic);
                    return;
                }
                Err(e) => {
                    warn!("dropping message for topic {}: invalid JSON payload: {e}", message.topic);
                    return;
                }
            }
        }

        let id = message.id;
        topic.queue.enqueue(message.clone());
        self.unacked.insert(
            id,
            UnackedEntry {
                message,
                delivered_at: Instant::now(),
            },
        );
        self.raise_deliver();
    }

    fn nack(&mut self, id: MessageId) {
        let Some(entry) = self.unacked.remove(&id) else {
            return;
        };
        self.topic_mut(&entry.message.topic).queue.enqueue(entry.message);
        self.raise_deliver();
    }

    /// For each topic with at least one consumer, drains its queue,
    /// broadcasting each dequeued message to every consumer that accepts it.
    /// A full consumer slot causes that message to be skipped for that
    /// consumer only; the unacked entry is refreshed regardless, so the
    /// unacked timer remains the backstop for any drop.
    fn deliver_messages(&mut self) {
        for (name, topic) in self.topics.iter_mut() {
            if topic.consumers.is_empty() {
                continue;
            }

            while let Some(mut message) = topic.queue.dequeue() {
                let now = Instant::now();
                message.delivered_at = Some(now);

                let mut delivered_to_any = false;
                for consumer in &topic.consumers {
                    if consumer.try_send(message.clone()) {
                        delivered_to_any = true;
                    }
                }
                if !delivered_to_any {
                    trace!("topic {name}: message {} dropped, all consumer slots full", message.id);
                }
                self.unacked.insert(
                    message.id,
                    UnackedEntry {
                        message,
                        delivered_at: now,
                    },
                );
            }
        }
    }

    /// Re-enqueues any unacked entry whose delivery deadline has passed.
    fn check_unacked(&mut self) {
        let now = Instant::now();
        let timeout = self.config.unacked_timeout;
        let expired: Vec<MessageId> = self
            .unacked
            .iter()
            .filter(|(_, entry)| entry.delivered_at + timeout < now)
            .map(|(id, _)| *id)
            .collect();

        if expired.is_empty() {
            return;
        }

        for id in expired {
            if let Some(entry) = self.unacked.remove(&id) {
                trace!("requeueing timed-out message {id}");
                self.topic_mut(&entry.message.topic).queue.enqueue(entry.message);
            }
        }
        self.raise_deliver();
    }

    fn topic_mut(&mut self, name: &str) -> &mut TopicState {
        self.topics.entry(name.to_owned()).or_insert_with(TopicState::new)
    }

    fn raise_deliver(&self) {
        let _ = self.deliver_tx.try_send(());
    }
}
