// SPDX-License-Identifier: MPL-2.0

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::commands::{PublishCommand, SubscribeCommand, UnsubscribeCommand};
use super::engine::{ConnectionState, MqttEngine, MqttEvent};
use super::error::{MqttClientError, MqttClientResult};
use super::opts::MqttClientOptions;
use super::results::{
    ConnectionResult, InboundMessage, PublishResult, SubscribeResult, UnsubscribeResult,
};
use super::timer::{self, ScheduledTask};
use super::transport::{BoxedTransport, Connector};

/// Caller-facing events, in the order the packets were received.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected(ConnectionResult),
    Message(InboundMessage),
    Error(MqttClientError),
    Closed { expected: bool },
    ReconnectScheduled { attempt: u32, delay: Duration },
}

/// Trait for handling MQTT events in async context
#[async_trait]
pub trait MqttEventHandler: Send + Sync {
    /// Called when the broker accepted the connection
    async fn on_connected(&mut self, result: &ConnectionResult) {
        let _ = result;
    }

    /// Called once per matching subscription for every inbound message
    async fn on_message(&mut self, message: &InboundMessage) {
        let _ = message;
    }

    async fn on_error(&mut self, error: &MqttClientError) {
        let _ = error;
    }

    /// Called when the connection is gone; `expected` after `disconnect`
    async fn on_closed(&mut self, expected: bool) {
        let _ = expected;
    }

    async fn on_reconnect_scheduled(&mut self, attempt: u32, delay: Duration) {
        let _ = (attempt, delay);
    }
}

/// Ignores every event.
pub struct NoopEventHandler;

impl MqttEventHandler for NoopEventHandler {}

/// Forwards events into a bounded channel exposed as a stream.
pub struct ChannelEventHandler {
    tx: mpsc::Sender<ClientEvent>,
}

impl ChannelEventHandler {
    pub fn new(capacity: usize) -> (Self, ReceiverStream<ClientEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, ReceiverStream::new(rx))
    }

    async fn forward(&self, event: ClientEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("event stream dropped");
        }
    }
}

#[async_trait]
impl MqttEventHandler for ChannelEventHandler {
    async fn on_connected(&mut self, result: &ConnectionResult) {
        self.forward(ClientEvent::Connected(result.clone())).await;
    }

    async fn on_message(&mut self, message: &InboundMessage) {
        self.forward(ClientEvent::Message(message.clone())).await;
    }

    async fn on_error(&mut self, error: &MqttClientError) {
        self.forward(ClientEvent::Error(error.clone())).await;
    }

    async fn on_closed(&mut self, expected: bool) {
        self.forward(ClientEvent::Closed { expected }).await;
    }

    async fn on_reconnect_scheduled(&mut self, attempt: u32, delay: Duration) {
        self.forward(ClientEvent::ReconnectScheduled { attempt, delay })
            .await;
    }
}

/// Runtime knobs for the tokio driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokioAsyncClientConfig {
    /// Queue size for pending commands
    pub command_queue_size: usize,
    /// Capacity of the stream returned by `with_event_stream`
    pub event_queue_size: usize,
    /// Bytes per transport read
    pub read_buffer_size: usize,
}

impl Default for TokioAsyncClientConfig {
    fn default() -> Self {
        TokioAsyncClientConfig {
            command_queue_size: 1000,
            event_queue_size: 1000,
            read_buffer_size: 4096,
        }
    }
}

type Reply<T> = oneshot::Sender<MqttClientResult<T>>;

enum ClientCommand {
    Connect(Reply<ConnectionResult>),
    Publish(PublishCommand, Reply<PublishResult>),
    Subscribe(SubscribeCommand, Reply<SubscribeResult>),
    Unsubscribe(UnsubscribeCommand, Reply<UnsubscribeResult>),
    Disconnect(Reply<()>),
    Shutdown(Reply<()>),
}

/// Output of the dial and reader tasks, tagged with the connection
/// generation that spawned them.
enum TransportEvent {
    Data { generation: u64, data: Vec<u8> },
    Closed { generation: u64, error: Option<String> },
    Dialed {
        generation: u64,
        result: MqttClientResult<BoxedTransport>,
    },
}

/// Tokio-based async MQTT client.
///
/// Cloning is cheap; every clone talks to the same worker task, which owns
/// the engine and serializes all session changes.
#[derive(Clone)]
pub struct TokioAsyncMqttClient {
    command_tx: mpsc::Sender<ClientCommand>,
}

impl TokioAsyncMqttClient {
    /// Spawn the worker on the current tokio runtime.
    pub fn new(
        options: MqttClientOptions,
        connector: impl Connector + 'static,
        config: TokioAsyncClientConfig,
        event_handler: Box<dyn MqttEventHandler>,
    ) -> MqttClientResult<Self> {
        options.validate()?;
        if config.command_queue_size == 0 || config.read_buffer_size == 0 {
            return Err(MqttClientError::InvalidConfiguration {
                field: "TokioAsyncClientConfig".to_string(),
                reason: "queue and buffer sizes must be greater than 0".to_string(),
            });
        }
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_size);

        let worker = ClientWorker::new(options, Arc::new(connector), event_handler, config);
        tokio::spawn(worker.run(command_rx));

        Ok(TokioAsyncMqttClient { command_tx })
    }

    /// Like [`new`](Self::new), with events delivered as a stream.
    pub fn with_event_stream(
        options: MqttClientOptions,
        connector: impl Connector + 'static,
        config: TokioAsyncClientConfig,
    ) -> MqttClientResult<(Self, ReceiverStream<ClientEvent>)> {
        let (handler, events) = ChannelEventHandler::new(config.event_queue_size);
        let client = Self::new(options, connector, config, Box::new(handler))?;
        Ok((client, events))
    }

    /// Open a transport, send CONNECT and wait for CONNACK.
    pub async fn connect(&self) -> MqttClientResult<ConnectionResult> {
        self.request(ClientCommand::Connect).await
    }

    /// Resolves on PUBACK/PUBCOMP, or once written for QoS 0.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        qos: u8,
        retain: bool,
    ) -> MqttClientResult<PublishResult> {
        self.publish_with(PublishCommand::simple(topic, payload, qos, retain))
            .await
    }

    pub async fn publish_with(&self, command: PublishCommand) -> MqttClientResult<PublishResult> {
        self.request(|reply| ClientCommand::Publish(command, reply))
            .await
    }

    pub async fn subscribe(&self, command: SubscribeCommand) -> MqttClientResult<SubscribeResult> {
        self.request(|reply| ClientCommand::Subscribe(command, reply))
            .await
    }

    pub async fn subscribe_one(
        &self,
        topic_filter: impl Into<String>,
        qos: u8,
    ) -> MqttClientResult<SubscribeResult> {
        self.subscribe(SubscribeCommand::single(topic_filter, qos))
            .await
    }

    pub async fn unsubscribe<I, S>(&self, topic_filters: I) -> MqttClientResult<UnsubscribeResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = UnsubscribeCommand::from_topics(topic_filters);
        self.request(|reply| ClientCommand::Unsubscribe(command, reply))
            .await
    }

    /// Send DISCONNECT and wait for the transport to close.
    pub async fn disconnect(&self) -> MqttClientResult<()> {
        self.request(ClientCommand::Disconnect).await
    }

    /// Disconnect if needed and stop the worker. Other clones fail with
    /// `ChannelClosed` afterwards.
    pub async fn shutdown(&self) -> MqttClientResult<()> {
        self.request(ClientCommand::Shutdown).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ClientCommand,
    ) -> MqttClientResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| MqttClientError::ChannelClosed {
                channel: "command".to_string(),
            })?;
        reply_rx.await.map_err(|_| MqttClientError::ChannelClosed {
            channel: "reply".to_string(),
        })?
    }
}

/// Worker task that owns the engine and the transport.
struct ClientWorker {
    engine: MqttEngine,
    connector: Arc<dyn Connector>,
    event_handler: Box<dyn MqttEventHandler>,
    config: TokioAsyncClientConfig,

    /// Transport dial in flight, if any.
    dial: Option<JoinHandle<()>>,
    writer: Option<WriteHalf<BoxedTransport>>,
    reader: Option<JoinHandle<()>>,
    /// Bumped for every transport so bytes from an old reader are dropped.
    generation: u64,
    inbound_tx: mpsc::Sender<TransportEvent>,
    inbound_rx: Option<mpsc::Receiver<TransportEvent>>,
    timer: ScheduledTask,

    pending_connect: Option<Reply<ConnectionResult>>,
    pending_publishes: HashMap<u16, Reply<PublishResult>>,
    pending_subscribes: HashMap<u16, Reply<SubscribeResult>>,
    pending_unsubscribes: HashMap<u16, Reply<UnsubscribeResult>>,
    pending_disconnect: Option<Reply<()>>,
}

impl ClientWorker {
    fn new(
        options: MqttClientOptions,
        connector: Arc<dyn Connector>,
        event_handler: Box<dyn MqttEventHandler>,
        config: TokioAsyncClientConfig,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        ClientWorker {
            engine: MqttEngine::new(options),
            connector,
            event_handler,
            config,
            dial: None,
            writer: None,
            reader: None,
            generation: 0,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            timer: ScheduledTask::new(),
            pending_connect: None,
            pending_publishes: HashMap::new(),
            pending_subscribes: HashMap::new(),
            pending_unsubscribes: HashMap::new(),
            pending_disconnect: None,
        }
    }

    /// Main loop: commands, transport input and the engine timer.
    async fn run(mut self, mut command_rx: mpsc::Receiver<ClientCommand>) {
        let mut inbound_rx = match self.inbound_rx.take() {
            Some(rx) => rx,
            None => return,
        };

        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break; // Shutdown requested
                            }
                        }
                        None => {
                            // every client handle dropped
                            self.shutdown_internal().await;
                            break;
                        }
                    }
                }

                Some(event) = inbound_rx.recv() => {
                    self.handle_transport_event(event).await;
                }

                _ = self.timer.fired() => {
                    let events = self.engine.handle_tick(timer::now());
                    self.drive(events).await;
                }
            }
        }
        debug!("client worker stopped");
    }

    async fn handle_command(&mut self, command: ClientCommand) -> bool {
        match command {
            ClientCommand::Connect(reply) => self.handle_connect(reply).await,
            ClientCommand::Publish(command, reply) => self.handle_publish(command, reply).await,
            ClientCommand::Subscribe(command, reply) => {
                let now = timer::now();
                match self.engine.subscribe(command, now) {
                    Ok(packet_id) => {
                        self.pending_subscribes.insert(packet_id, reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
                self.drive(Vec::new()).await;
            }
            ClientCommand::Unsubscribe(command, reply) => {
                let now = timer::now();
                match self.engine.unsubscribe(command, now) {
                    Ok(packet_id) => {
                        self.pending_unsubscribes.insert(packet_id, reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
                self.drive(Vec::new()).await;
            }
            ClientCommand::Disconnect(reply) => {
                self.abort_dial();
                let _ = self.engine.disconnect(timer::now());
                if self.engine.state() == ConnectionState::Disconnecting {
                    self.pending_disconnect = Some(reply);
                } else {
                    let _ = reply.send(Ok(()));
                }
                let events = self.engine.take_events();
                self.drive(events).await;
            }
            ClientCommand::Shutdown(reply) => {
                self.shutdown_internal().await;
                let _ = reply.send(Ok(()));
                return false;
            }
        }
        true
    }

    async fn handle_connect(&mut self, reply: Reply<ConnectionResult>) {
        if self.engine.state() != ConnectionState::Disconnected
            || self.pending_connect.is_some()
            || self.dial.is_some()
        {
            let _ = reply.send(Err(MqttClientError::AlreadyConnected));
            return;
        }
        self.pending_connect = Some(reply);
        self.start_dial().await;
    }

    async fn handle_publish(&mut self, command: PublishCommand, reply: Reply<PublishResult>) {
        let qos = command.qos;
        match self.engine.publish(command, timer::now()) {
            Ok(Some(packet_id)) => {
                self.pending_publishes.insert(packet_id, reply);
                self.drive(Vec::new()).await;
            }
            Ok(None) => {
                // QoS 0 resolves once it reached the transport
                match self.flush_outgoing().await {
                    Ok(()) => {
                        let _ = reply.send(Ok(PublishResult {
                            packet_id: None,
                            qos,
                        }));
                        self.drive(Vec::new()).await;
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.clone()));
                        let events = self
                            .engine
                            .handle_connection_lost(e.to_string(), timer::now());
                        self.drive(events).await;
                    }
                }
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Dialed { generation, result } if generation == self.generation => {
                self.dial = None;
                let events = match result {
                    Ok(transport) => {
                        self.install_transport(transport);
                        match self.engine.connect(timer::now()) {
                            Ok(()) => Vec::new(),
                            Err(e) => {
                                self.close_transport().await;
                                self.fail_attempt(e)
                            }
                        }
                    }
                    Err(e) => self.fail_attempt(e),
                };
                self.drive(events).await;
            }
            TransportEvent::Data { generation, data } if generation == self.generation => {
                let events = self.engine.handle_incoming(&data, timer::now());
                self.drive(events).await;
                while self.engine.is_input_paused() && self.engine.has_live_connection() {
                    let events = self.engine.handle_incoming(&[], timer::now());
                    self.drive(events).await;
                }
            }
            TransportEvent::Closed { generation, error } if generation == self.generation => {
                self.close_transport().await;
                let now = timer::now();
                let events = match error {
                    Some(reason) => self.engine.handle_connection_lost(reason, now),
                    None => self.engine.handle_transport_closed(now),
                };
                self.drive(events).await;
            }
            _ => debug!("dropping input from a stale connection"),
        }
    }

    /// Writes engine output, dispatches events and keeps the transport and
    /// timer in step with the engine state until nothing is left to do.
    async fn drive(&mut self, events: Vec<MqttEvent>) {
        let mut queue: VecDeque<MqttEvent> = events.into();
        loop {
            if let Err(e) = self.flush_outgoing().await {
                let lost = self
                    .engine
                    .handle_connection_lost(e.to_string(), timer::now());
                queue.extend(lost);
            }
            queue.extend(self.sync_transport().await);

            match queue.pop_front() {
                Some(event) => {
                    let more = self.dispatch(event).await;
                    queue.extend(more);
                }
                None => break,
            }
        }

        if self.engine.state() == ConnectionState::Disconnected && self.dial.is_none() {
            self.cancel_pending("connection closed");
        }
        self.timer.arm(self.engine.next_tick_at());
    }

    async fn dispatch(&mut self, event: MqttEvent) -> Vec<MqttEvent> {
        match event {
            MqttEvent::Connected(result) => {
                if let Some(reply) = self.pending_connect.take() {
                    let _ = reply.send(Ok(result.clone()));
                }
                self.event_handler.on_connected(&result).await;
            }
            MqttEvent::MessageReceived(message) => {
                self.event_handler.on_message(&message).await;
            }
            MqttEvent::Published(result) => {
                if let Some(reply) = result
                    .packet_id
                    .and_then(|id| self.pending_publishes.remove(&id))
                {
                    let _ = reply.send(Ok(result));
                }
            }
            MqttEvent::Subscribed(result) => {
                if let Some(reply) = self.pending_subscribes.remove(&result.packet_id) {
                    let _ = reply.send(Ok(result));
                }
            }
            MqttEvent::Unsubscribed(result) => {
                if let Some(reply) = self.pending_unsubscribes.remove(&result.packet_id) {
                    let _ = reply.send(Ok(result));
                }
            }
            MqttEvent::PingResponse => debug!("PINGRESP"),
            MqttEvent::Error(e) => {
                if self.engine.state() == ConnectionState::Disconnected {
                    if let Some(reply) = self.pending_connect.take() {
                        let _ = reply.send(Err(e.clone()));
                    }
                }
                self.event_handler.on_error(&e).await;
            }
            MqttEvent::Closed { expected } => {
                if expected {
                    if let Some(reply) = self.pending_disconnect.take() {
                        let _ = reply.send(Ok(()));
                    }
                }
                self.event_handler.on_closed(expected).await;
            }
            MqttEvent::ReconnectScheduled { attempt, delay } => {
                self.event_handler
                    .on_reconnect_scheduled(attempt, delay)
                    .await;
            }
            MqttEvent::ReconnectNeeded => return self.reconnect().await,
        }
        Vec::new()
    }

    async fn reconnect(&mut self) -> Vec<MqttEvent> {
        info!(attempt = self.engine.reconnect_attempts(), "reconnecting");
        self.start_dial().await;
        Vec::new()
    }

    /// Opens a transport on a separate task, bounded by the connect timeout.
    /// The outcome comes back as `TransportEvent::Dialed`.
    async fn start_dial(&mut self) {
        self.close_transport().await;
        self.abort_dial();
        self.generation += 1;

        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let timeout_ms = self.engine.options().connect_timeout_ms;
        let tx = self.inbound_tx.clone();
        self.dial = Some(tokio::spawn(async move {
            let dial = tokio::time::timeout(Duration::from_millis(timeout_ms), connector.connect());
            let result = match dial.await {
                Ok(Ok(transport)) => Ok(transport),
                Ok(Err(e)) => {
                    warn!(error = %e, "transport connect failed");
                    Err(MqttClientError::from(e))
                }
                Err(_) => {
                    warn!(timeout_ms, "transport connect timed out");
                    Err(MqttClientError::ConnectTimeout { timeout_ms })
                }
            };
            let _ = tx.send(TransportEvent::Dialed { generation, result }).await;
        }));
    }

    /// Drops the dial in flight. A result it already queued is stale.
    fn abort_dial(&mut self) {
        if let Some(dial) = self.dial.take() {
            dial.abort();
            self.generation += 1;
            debug!("transport dial aborted");
        }
    }

    /// A dial or the CONNECT that follows it failed.
    fn fail_attempt(&mut self, error: MqttClientError) -> Vec<MqttEvent> {
        if self.engine.state() == ConnectionState::Reconnecting {
            return self
                .engine
                .handle_connection_lost(error.to_string(), timer::now());
        }
        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Err(error));
        }
        Vec::new()
    }

    fn install_transport(&mut self, transport: BoxedTransport) {
        if let Ok(peer) = transport.peer_addr() {
            debug!(peer, "transport open");
        }
        let (read_half, write_half) = tokio::io::split(transport);
        self.reader = Some(spawn_reader(
            read_half,
            self.generation,
            self.inbound_tx.clone(),
            self.config.read_buffer_size,
        ));
        self.writer = Some(write_half);
    }

    async fn close_transport(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            self.generation += 1;
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "transport shutdown");
            }
        }
    }

    /// Closes the transport once the engine no longer needs it.
    async fn sync_transport(&mut self) -> Vec<MqttEvent> {
        if self.writer.is_none() {
            return Vec::new();
        }
        match self.engine.state() {
            // DISCONNECT has been flushed by now
            ConnectionState::Disconnecting => {
                self.close_transport().await;
                self.engine.handle_transport_closed(timer::now())
            }
            ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                self.close_transport().await;
                Vec::new()
            }
            ConnectionState::Connecting | ConnectionState::Connected => Vec::new(),
        }
    }

    /// One `write_all` per packet.
    async fn flush_outgoing(&mut self) -> MqttClientResult<()> {
        let frames = self.engine.take_outgoing_frames();
        if frames.is_empty() {
            return Ok(());
        }
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => {
                warn!(count = frames.len(), "no transport, dropping outgoing packets");
                return Ok(());
            }
        };
        for frame in frames {
            writer
                .write_all(&frame)
                .await
                .map_err(|e| MqttClientError::from_io_error(e, "write"))?;
        }
        writer
            .flush()
            .await
            .map_err(|e| MqttClientError::from_io_error(e, "flush"))
    }

    fn cancel_pending(&mut self, operation: &str) {
        let cancelled = || MqttClientError::OperationCancelled {
            operation: operation.to_string(),
        };
        if let Some(reply) = self.pending_connect.take() {
            let _ = reply.send(Err(cancelled()));
        }
        for (_, reply) in self.pending_publishes.drain() {
            let _ = reply.send(Err(cancelled()));
        }
        for (_, reply) in self.pending_subscribes.drain() {
            let _ = reply.send(Err(cancelled()));
        }
        for (_, reply) in self.pending_unsubscribes.drain() {
            let _ = reply.send(Err(cancelled()));
        }
        if let Some(reply) = self.pending_disconnect.take() {
            let _ = reply.send(Ok(()));
        }
    }

    async fn shutdown_internal(&mut self) {
        self.abort_dial();
        let _ = self.engine.disconnect(timer::now());
        let events = self.engine.take_events();
        self.drive(events).await;
        self.close_transport().await;
        self.timer.cancel();
        self.cancel_pending("shutdown");
        info!("client shut down");
    }
}

fn spawn_reader(
    mut read_half: ReadHalf<BoxedTransport>,
    generation: u64,
    tx: mpsc::Sender<TransportEvent>,
    buffer_size: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = vec![0u8; buffer_size];
        loop {
            match read_half.read(&mut buffer).await {
                Ok(0) => {
                    let _ = tx.send(TransportEvent::Closed { generation, error: None }).await;
                    break;
                }
                Ok(n) => {
                    let data = buffer[..n].to_vec();
                    if tx.send(TransportEvent::Data { generation, data }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "transport read failed");
                    let _ = tx
                        .send(TransportEvent::Closed {
                            generation,
                            error: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
        }
    })
}
