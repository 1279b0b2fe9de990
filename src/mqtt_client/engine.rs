// SPDX-License-Identifier: MPL-2.0

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::mqtt_serde::control_packet::MqttPacket;
use crate::mqtt_serde::mqttv3::{MqttConnAck, MqttConnect, MqttDisconnect, MqttPingReq, MqttPublish};
use crate::mqtt_serde::parser::stream::MqttParser;
use crate::mqtt_session::{ClientSession, InboundAction};
use crate::mqtt_topic;

use super::commands::{PublishCommand, SubscribeCommand, UnsubscribeCommand};
use super::error::{MqttClientError, MqttClientResult};
use super::opts::MqttClientOptions;
use super::results::{
    ConnectionResult, InboundMessage, PublishResult, SubscribeResult, UnsubscribeResult,
};

/// Connection lifecycle as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// CONNECT written, waiting for CONNACK.
    Connecting,
    Connected,
    /// DISCONNECT queued, waiting for the transport to close.
    Disconnecting,
    /// Connection lost, waiting for the backoff to expire.
    Reconnecting,
}

/// Events emitted by the MqttEngine to be handled by the application (I/O layer)
#[derive(Debug, Clone)]
pub enum MqttEvent {
    Connected(ConnectionResult),
    MessageReceived(InboundMessage),
    Published(PublishResult),
    Subscribed(SubscribeResult),
    Unsubscribed(UnsubscribeResult),
    PingResponse,
    Error(MqttClientError),
    /// The connection is gone. `expected` is true only after `disconnect`.
    Closed { expected: bool },
    /// The backoff expired; the runtime should open a new transport and call `connect`.
    ReconnectNeeded,
    ReconnectScheduled { attempt: u32, delay: Duration },
}

/// A "Sans-I/O" MQTT 3.1.1 protocol engine.
///
/// This engine strictly handles the *protocol state* of an MQTT connection without directly performing any I/O operations.
/// It is designed to be embedded within an I/O runtime (like Tokio) or driven directly by tests.
/// Time never comes from a clock: every input carries `now`.
///
/// # Architecture
///
/// - **Input**:
///     - Bytes received from the network (`handle_incoming`).
///     - Time ticks for keep-alive, connect timeout and reconnect backoff (`handle_tick`).
///     - Transport lifecycle (`handle_connection_lost`, `handle_transport_closed`).
///     - Commands: `connect`, `publish`, `subscribe`, `unsubscribe`, `disconnect`.
/// - **Output**:
///     - Whole packets to write (`take_outgoing` or `take_outgoing_frames`).
///     - Events for the application (`take_events`).
///     - The next deadline (`next_tick_at`).
///
/// # Usage
///
/// 1. Initialize with `MqttClientOptions`.
/// 2. Open a transport and call `connect(now)`.
/// 3. In a loop:
///     - Feed incoming bytes: `engine.handle_incoming(&buf, now)`.
///     - Write `engine.take_outgoing_frames()`.
///     - Handle events.
///     - Sleep until `engine.next_tick_at()` and call `engine.handle_tick(now)`.
/// 4. Close the transport whenever `state()` leaves Connecting, Connected and Disconnecting.
///
/// # Buffer Limits
///
/// - `outgoing`: user operations fail with `MqttClientError::BufferFull` past
///   `max_outgoing_packet_count`. Protocol responses are never refused.
/// - `events`: parsing pauses at `max_event_count` (back-pressure); call
///   `handle_incoming(&[], now)` to resume.
pub struct MqttEngine {
    options: MqttClientOptions,
    session: ClientSession,
    state: ConnectionState,

    parser: MqttParser,
    outgoing: VecDeque<Vec<u8>>,
    events: Vec<MqttEvent>,
    input_paused: bool,

    last_packet_sent: Option<Instant>,
    ping_sent_at: Option<Instant>,
    connect_deadline: Option<Instant>,

    // Reconnection state
    reconnect_attempts: u32,
    next_reconnect_at: Option<Instant>,
    reconnecting: bool,
}

impl MqttEngine {
    pub fn new(options: MqttClientOptions) -> Self {
        let session = ClientSession::new(
            options.client_id.clone(),
            options.clean_session,
            options.keep_alive,
            options.will.clone(),
            options.max_inflight,
        );
        Self {
            options,
            session,
            state: ConnectionState::Disconnected,
            parser: MqttParser::default(),
            outgoing: VecDeque::new(),
            events: Vec::new(),
            input_paused: false,
            last_packet_sent: None,
            ping_sent_at: None,
            connect_deadline: None,
            reconnect_attempts: 0,
            next_reconnect_at: None,
            reconnecting: false,
        }
    }

    pub fn options(&self) -> &MqttClientOptions {
        &self.options
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// True while the current connection should keep its transport open.
    pub fn has_live_connection(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Disconnecting
        )
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Parsing stopped at the event limit with input still buffered.
    pub fn is_input_paused(&self) -> bool {
        self.input_paused
    }

    /// Drain all pending events from the engine.
    pub fn take_events(&mut self) -> Vec<MqttEvent> {
        std::mem::take(&mut self.events)
    }

    /// Take bytes ready to be sent to the network, concatenated.
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        let mut all_bytes = Vec::new();
        while let Some(packet) = self.outgoing.pop_front() {
            all_bytes.extend(packet);
        }
        all_bytes
    }

    /// Take packets ready to be sent, one encoded packet per entry.
    pub fn take_outgoing_frames(&mut self) -> Vec<Vec<u8>> {
        self.outgoing.drain(..).collect()
    }

    // --- Command Methods ---

    /// Queue CONNECT for a freshly opened transport.
    ///
    /// Valid from Disconnected, and from Reconnecting to start the next attempt.
    pub fn connect(&mut self, now: Instant) -> MqttClientResult<()> {
        match self.state {
            ConnectionState::Disconnected => self.reconnecting = false,
            ConnectionState::Reconnecting => self.reconnecting = true,
            _ => return Err(MqttClientError::AlreadyConnected),
        }

        let mut connect = MqttConnect::new(
            self.session.client_id().to_string(),
            self.session.keep_alive(),
            self.session.clean_session(),
        );
        connect.will = self.session.will().cloned();
        connect.username = self.options.username.clone();
        connect.password = self.options.password.clone();
        let bytes = MqttPacket::Connect(connect).to_bytes()?;

        self.parser.reset();
        self.outgoing.clear();
        self.input_paused = false;
        self.outgoing.push_back(bytes);
        self.last_packet_sent = Some(now);
        self.ping_sent_at = None;
        self.next_reconnect_at = None;
        self.connect_deadline = Some(now + Duration::from_millis(self.options.connect_timeout_ms));
        self.state = ConnectionState::Connecting;
        debug!(client_id = self.session.client_id(), reconnect = self.reconnecting, "CONNECT queued");
        Ok(())
    }

    /// Publish an application message.
    ///
    /// - **QoS 0**: only while connected, returns `None`.
    /// - **QoS 1/2**: returns the packet id. While Connecting or Reconnecting
    ///   the message is queued and written once the connection is accepted.
    pub fn publish(&mut self, command: PublishCommand, now: Instant) -> MqttClientResult<Option<u16>> {
        if command.qos > 2 {
            return Err(MqttClientError::Encoding {
                message: format!("invalid QoS {}", command.qos),
            });
        }
        mqtt_topic::validate_topic_name(&command.topic_name)?;

        let queued = match self.state {
            ConnectionState::Connected => false,
            ConnectionState::Connecting | ConnectionState::Reconnecting if command.qos > 0 => true,
            _ => return Err(MqttClientError::NotConnected),
        };

        if command.qos == 0 {
            self.enqueue_packet(MqttPacket::Publish(command.to_mqtt_publish()), now)?;
            return Ok(None);
        }

        let publish = self.session.track_outgoing_publish(
            command.topic_name,
            command.payload,
            command.qos,
            command.retain,
            command.packet_id,
            queued,
        )?;
        let packet_id = publish.packet_id;
        let result = if queued {
            MqttPacket::Publish(publish).to_bytes().map(|_| ()).map_err(Into::into)
        } else {
            self.enqueue_packet(MqttPacket::Publish(publish), now)
        };
        if let Err(e) = result {
            if let Some(id) = packet_id {
                self.session.forget_outgoing(id);
            }
            return Err(e);
        }
        Ok(packet_id)
    }

    /// Queue a SUBSCRIBE. While Connecting or Reconnecting it is written
    /// after the connection is accepted.
    pub fn subscribe(&mut self, command: SubscribeCommand, now: Instant) -> MqttClientResult<u16> {
        let queued = self.check_can_queue()?;
        let subscribe = self.session.track_subscribe(command.subscriptions)?;
        let packet_id = subscribe.packet_id;
        if !queued {
            self.enqueue_packet(MqttPacket::Subscribe(subscribe), now)?;
        }
        Ok(packet_id)
    }

    pub fn unsubscribe(&mut self, command: UnsubscribeCommand, now: Instant) -> MqttClientResult<u16> {
        let queued = self.check_can_queue()?;
        let unsubscribe = self.session.track_unsubscribe(command.topics)?;
        let packet_id = unsubscribe.packet_id;
        if !queued {
            self.enqueue_packet(MqttPacket::Unsubscribe(unsubscribe), now)?;
        }
        Ok(packet_id)
    }

    fn check_can_queue(&self) -> MqttClientResult<bool> {
        match self.state {
            ConnectionState::Connected => Ok(false),
            ConnectionState::Connecting | ConnectionState::Reconnecting => Ok(true),
            _ => Err(MqttClientError::NotConnected),
        }
    }

    /// Close the connection on purpose.
    ///
    /// Connected: DISCONNECT is queued and the engine waits in Disconnecting
    /// for `handle_transport_closed`. Connecting or Reconnecting: the attempt
    /// is cancelled at once and no retry stays armed.
    pub fn disconnect(&mut self, now: Instant) -> MqttClientResult<()> {
        match self.state {
            ConnectionState::Connected => {
                self.write_packet(MqttPacket::Disconnect(MqttDisconnect::new()), now);
                self.clear_timers();
                self.state = ConnectionState::Disconnecting;
                info!("disconnecting");
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                info!(state = ?self.state, "connection attempt cancelled");
                self.outgoing.clear();
                self.finish_closed(true);
            }
            ConnectionState::Disconnecting | ConnectionState::Disconnected => {}
        }
        Ok(())
    }

    // --- Transport lifecycle ---

    /// The transport failed (read/write error or the connector gave up).
    pub fn handle_connection_lost(&mut self, reason: impl Into<String>, now: Instant) -> Vec<MqttEvent> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.fail_connection(MqttClientError::ConnectionLost { reason: reason.into() }, now);
            }
            ConnectionState::Disconnecting => self.finish_closed(true),
            ConnectionState::Reconnecting => {
                // the connector could not even open a transport
                if self.next_reconnect_at.is_none() {
                    self.events.push(MqttEvent::Error(MqttClientError::ConnectionLost {
                        reason: reason.into(),
                    }));
                    self.schedule_reconnect(now);
                }
            }
            ConnectionState::Disconnected => {}
        }
        self.take_events()
    }

    /// The transport reached EOF or was closed by the runtime.
    pub fn handle_transport_closed(&mut self, now: Instant) -> Vec<MqttEvent> {
        match self.state {
            ConnectionState::Disconnecting => self.finish_closed(true),
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.fail_connection(
                    MqttClientError::ConnectionLost {
                        reason: "connection closed by peer".to_string(),
                    },
                    now,
                );
            }
            _ => {}
        }
        self.take_events()
    }

    /// Feed raw bytes received from the network into the protocol parser.
    ///
    /// # Back-pressure
    ///
    /// If the internal `events` buffer reaches `max_event_count`, this method will **stop processing**
    /// and return early, leaving remaining bytes in the parser. The caller should
    /// consume the returned events and call `handle_incoming(&[], now)` again to resume.
    pub fn handle_incoming(&mut self, data: &[u8], now: Instant) -> Vec<MqttEvent> {
        if !self.has_live_connection() {
            if !data.is_empty() {
                debug!(len = data.len(), state = ?self.state, "dropping bytes without a live connection");
            }
            return self.take_events();
        }
        self.parser.feed(data);
        self.input_paused = false;

        loop {
            if self.events.len() >= self.options.max_event_count {
                self.input_paused = !self.parser.buffered().is_empty();
                break;
            }

            match self.parser.next_packet() {
                Ok(Some(packet)) => {
                    self.handle_packet(packet, now);
                    if !self.has_live_connection() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let error = MqttClientError::malformed(e, self.parser.buffered());
                    warn!(%error, "malformed packet from server");
                    self.fail_connection(error, now);
                    break;
                }
            }
        }

        self.take_events()
    }

    /// Process time-dependent logic.
    ///
    /// 1. **Reconnection**: emits `ReconnectNeeded` once the backoff expired.
    /// 2. **Connect timeout**: no CONNACK before the deadline fails the attempt.
    /// 3. **Keep-Alive**: one PINGREQ after `keep_alive` without outbound traffic.
    /// 4. **Dead connection**: no PINGRESP 1.5x `keep_alive` after the PINGREQ.
    pub fn handle_tick(&mut self, now: Instant) -> Vec<MqttEvent> {
        match self.state {
            ConnectionState::Reconnecting => {
                if let Some(at) = self.next_reconnect_at {
                    if now >= at {
                        self.next_reconnect_at = None;
                        self.events.push(MqttEvent::ReconnectNeeded);
                    }
                }
            }
            ConnectionState::Connecting => {
                if let Some(deadline) = self.connect_deadline {
                    if now >= deadline {
                        let timeout_ms = self.options.connect_timeout_ms;
                        self.fail_connection(MqttClientError::ConnectTimeout { timeout_ms }, now);
                    }
                }
            }
            ConnectionState::Connected => {
                let keep_alive = self.keep_alive();
                if keep_alive > Duration::ZERO {
                    if let Some(ping_at) = self.ping_sent_at {
                        if now >= ping_at + keep_alive * 3 / 2 {
                            let keep_alive_secs = self.options.keep_alive;
                            self.fail_connection(
                                MqttClientError::KeepAliveTimeout { keep_alive_secs },
                                now,
                            );
                        }
                    } else if let Some(sent) = self.last_packet_sent {
                        if now >= sent + keep_alive {
                            self.write_packet(MqttPacket::PingReq(MqttPingReq::new()), now);
                            self.ping_sent_at = Some(now);
                        }
                    }
                }
            }
            ConnectionState::Disconnecting | ConnectionState::Disconnected => {}
        }
        self.take_events()
    }

    /// Returns the exact timestamp of the next required wake-up, `None` when
    /// no timer is armed.
    pub fn next_tick_at(&self) -> Option<Instant> {
        match self.state {
            ConnectionState::Reconnecting => self.next_reconnect_at,
            ConnectionState::Connecting => self.connect_deadline,
            ConnectionState::Connected => {
                let keep_alive = self.keep_alive();
                if keep_alive == Duration::ZERO {
                    return None;
                }
                match self.ping_sent_at {
                    Some(ping_at) => Some(ping_at + keep_alive * 3 / 2),
                    None => self.last_packet_sent.map(|sent| sent + keep_alive),
                }
            }
            ConnectionState::Disconnecting | ConnectionState::Disconnected => None,
        }
    }

    fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.options.keep_alive as u64)
    }

    // --- Internal Helpers ---

    fn handle_packet(&mut self, packet: MqttPacket, now: Instant) {
        if self.state == ConnectionState::Connecting && !matches!(packet, MqttPacket::ConnAck(_)) {
            self.fail_connection(
                MqttClientError::protocol_violation(format!(
                    "{:?} received before CONNACK",
                    packet.packet_type()
                )),
                now,
            );
            return;
        }

        match packet {
            MqttPacket::ConnAck(ack) => {
                if self.state != ConnectionState::Connecting {
                    self.fail_connection(MqttClientError::protocol_violation("unexpected CONNACK"), now);
                } else if ack.is_accepted() {
                    self.on_connection_accepted(ack.session_present, now);
                } else {
                    let description = MqttConnAck::describe(ack.return_code);
                    warn!(return_code = ack.return_code, description, "connection refused");
                    self.fail_connection(
                        MqttClientError::ConnectionRefused {
                            return_code: ack.return_code,
                            description: description.to_string(),
                        },
                        now,
                    );
                }
            }
            MqttPacket::Publish(publish) => match self.session.handle_incoming_publish(&publish) {
                Ok(InboundAction::Deliver(ack)) => {
                    self.deliver(publish);
                    if let Some(ack) = ack {
                        self.write_packet(ack, now);
                    }
                }
                Ok(InboundAction::Duplicate(ack)) => self.write_packet(ack, now),
                Err(e) => self.fail_connection(e, now),
            },
            MqttPacket::PubAck(ack) => match self.session.handle_incoming_puback(&ack) {
                Ok(Some(done)) => self.events.push(MqttEvent::Published(PublishResult {
                    packet_id: Some(done.packet_id),
                    qos: done.qos,
                })),
                Ok(None) => {}
                Err(e) => self.fail_connection(e, now),
            },
            MqttPacket::PubRec(rec) => match self.session.handle_incoming_pubrec(&rec) {
                Ok(Some(rel)) => self.write_packet(MqttPacket::PubRel(rel), now),
                Ok(None) => {}
                Err(e) => self.fail_connection(e, now),
            },
            MqttPacket::PubComp(comp) => match self.session.handle_incoming_pubcomp(&comp) {
                Ok(Some(done)) => self.events.push(MqttEvent::Published(PublishResult {
                    packet_id: Some(done.packet_id),
                    qos: done.qos,
                })),
                Ok(None) => {}
                Err(e) => self.fail_connection(e, now),
            },
            MqttPacket::PubRel(rel) => {
                let comp = self.session.handle_incoming_pubrel(&rel);
                self.write_packet(MqttPacket::PubComp(comp), now);
            }
            MqttPacket::SubAck(ack) => match self.session.handle_suback(&ack) {
                Ok(Some(outcome)) => {
                    if !outcome.rejected.is_empty() {
                        warn!(packet_id = outcome.packet_id, rejected = ?outcome.rejected, "subscription refused");
                        self.events.push(MqttEvent::Error(MqttClientError::SubscribeFailed {
                            packet_id: outcome.packet_id,
                            topics: outcome.rejected,
                        }));
                    }
                    let (topic_filters, return_codes) = outcome.results.into_iter().unzip();
                    self.events.push(MqttEvent::Subscribed(SubscribeResult {
                        packet_id: outcome.packet_id,
                        topic_filters,
                        return_codes,
                    }));
                }
                Ok(None) => {}
                Err(e) => self.fail_connection(e, now),
            },
            MqttPacket::UnsubAck(ack) => {
                if let Some(topic_filters) = self.session.handle_unsuback(ack.packet_id) {
                    self.events.push(MqttEvent::Unsubscribed(UnsubscribeResult {
                        packet_id: ack.packet_id,
                        topic_filters,
                    }));
                }
            }
            MqttPacket::PingResp(_) => {
                self.ping_sent_at = None;
                self.events.push(MqttEvent::PingResponse);
            }
            other @ (MqttPacket::Connect(_)
            | MqttPacket::Subscribe(_)
            | MqttPacket::Unsubscribe(_)
            | MqttPacket::PingReq(_)
            | MqttPacket::Disconnect(_)) => {
                self.fail_connection(
                    MqttClientError::protocol_violation(format!(
                        "server sent {:?}",
                        other.packet_type()
                    )),
                    now,
                );
            }
        }
    }

    fn on_connection_accepted(&mut self, session_present: bool, now: Instant) {
        info!(session_present, reconnect = self.reconnecting, "connected");
        self.state = ConnectionState::Connected;
        self.connect_deadline = None;
        self.reconnect_attempts = 0;
        self.reconnecting = false;
        self.last_packet_sent = Some(now);
        self.ping_sent_at = None;

        if !session_present {
            self.session.discard_inbound();
        }
        self.events.push(MqttEvent::Connected(ConnectionResult {
            return_code: 0,
            session_present,
        }));

        let replay = self.session.resend_pending_messages();
        if !replay.is_empty() {
            debug!(count = replay.len(), "replaying unacknowledged packets");
        }
        for packet in replay {
            self.write_packet(packet, now);
        }

        if !session_present && self.options.resubscribe {
            match self.session.resubscribe_all() {
                Ok(Some(subscribe)) => {
                    debug!(filters = subscribe.subscriptions.len(), "re-subscribing");
                    self.write_packet(MqttPacket::Subscribe(subscribe), now);
                }
                Ok(None) => {}
                Err(e) => self.events.push(MqttEvent::Error(e)),
            }
        }
    }

    /// One event per matching subscription, or one unfiltered event.
    fn deliver(&mut self, publish: MqttPublish) {
        let targets: Vec<(String, u8)> = self
            .session
            .matching_subscriptions(&publish.topic_name)
            .into_iter()
            .map(|s| (s.topic_filter.clone(), s.granted_qos))
            .collect();

        if targets.is_empty() {
            debug!(topic = %publish.topic_name, "no stored subscription matches, delivering unfiltered");
            self.events.push(MqttEvent::MessageReceived(InboundMessage {
                topic: publish.topic_name,
                payload: publish.payload,
                qos: publish.qos,
                retain: publish.retain,
                dup: publish.dup,
                subscription: None,
            }));
            return;
        }

        for (filter, granted) in targets {
            self.events.push(MqttEvent::MessageReceived(InboundMessage {
                topic: publish.topic_name.clone(),
                payload: publish.payload.clone(),
                qos: publish.qos.min(granted),
                retain: publish.retain,
                dup: publish.dup,
                subscription: Some(filter),
            }));
        }
    }

    /// Tears the current connection down and applies the reconnect policy.
    ///
    /// Events: `Error`, `Closed { expected: false }`, then `ReconnectScheduled`
    /// when a retry is due.
    fn fail_connection(&mut self, error: MqttClientError, now: Instant) {
        let was_connecting = self.state == ConnectionState::Connecting;
        warn!(%error, state = ?self.state, "connection failed");

        let retry = if was_connecting {
            let refused = matches!(error, MqttClientError::ConnectionRefused { .. });
            self.reconnecting && (!refused || self.options.reconnect.retry_on_refused)
        } else {
            true
        };

        self.events.push(MqttEvent::Error(error));
        self.events.push(MqttEvent::Closed { expected: false });
        self.outgoing.clear();
        self.parser.reset();
        self.input_paused = false;
        self.clear_timers();

        if retry {
            self.schedule_reconnect(now);
        } else {
            self.state = ConnectionState::Disconnected;
            self.reconnect_attempts = 0;
            self.reconnecting = false;
        }
    }

    /// Schedule the next reconnection attempt from the reconnect policy.
    ///
    /// Once the policy is exhausted the engine settles in Disconnected.
    fn schedule_reconnect(&mut self, now: Instant) {
        let policy = &self.options.reconnect;
        if policy.is_exhausted(self.reconnect_attempts) {
            if policy.enabled {
                warn!(attempts = self.reconnect_attempts, "reconnect attempts exhausted");
                self.events.push(MqttEvent::Error(MqttClientError::ReconnectExhausted {
                    attempts: self.reconnect_attempts,
                }));
            }
            self.state = ConnectionState::Disconnected;
            self.next_reconnect_at = None;
            self.reconnect_attempts = 0;
            self.reconnecting = false;
            return;
        }

        self.reconnect_attempts += 1;
        let delay = policy.delay_for_attempt(self.reconnect_attempts, &mut rand::thread_rng());
        self.next_reconnect_at = Some(now + delay);
        self.state = ConnectionState::Reconnecting;
        info!(attempt = self.reconnect_attempts, ?delay, "reconnect scheduled");
        self.events.push(MqttEvent::ReconnectScheduled {
            attempt: self.reconnect_attempts,
            delay,
        });
    }

    fn finish_closed(&mut self, expected: bool) {
        self.clear_timers();
        self.next_reconnect_at = None;
        self.reconnect_attempts = 0;
        self.reconnecting = false;
        self.parser.reset();
        self.state = ConnectionState::Disconnected;
        if expected && self.session.clean_session() {
            self.session.clear();
        }
        info!(expected, "closed");
        self.events.push(MqttEvent::Closed { expected });
    }

    fn clear_timers(&mut self) {
        self.connect_deadline = None;
        self.ping_sent_at = None;
    }

    /// Queue a packet produced by a caller operation, subject to the outgoing limit.
    pub fn enqueue_packet(&mut self, packet: MqttPacket, now: Instant) -> MqttClientResult<()> {
        if self.outgoing.len() >= self.options.max_outgoing_packet_count {
            return Err(MqttClientError::BufferFull {
                buffer_type: "outgoing".to_string(),
                capacity: self.options.max_outgoing_packet_count,
            });
        }
        let bytes = packet.to_bytes()?;
        self.outgoing.push_back(bytes);
        self.last_packet_sent = Some(now);
        Ok(())
    }

    /// Queue a protocol response; encoding failures are reported as events.
    fn write_packet(&mut self, packet: MqttPacket, now: Instant) {
        match packet.to_bytes() {
            Ok(bytes) => {
                self.outgoing.push_back(bytes);
                self.last_packet_sent = Some(now);
            }
            Err(e) => self.events.push(MqttEvent::Error(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_client::reconnect::ReconnectPolicy;
    use crate::mqtt_serde::mqttv3::MqttPingResp;

    fn connected_engine(options: MqttClientOptions, now: Instant) -> MqttEngine {
        let mut engine = MqttEngine::new(options);
        engine.connect(now).unwrap();
        engine.take_outgoing();
        let connack = MqttPacket::ConnAck(MqttConnAck::new(false, 0)).to_bytes().unwrap();
        engine.handle_incoming(&connack, now);
        assert!(engine.is_connected());
        engine
    }

    #[test]
    fn test_outgoing_buffer_limit() {
        let now = Instant::now();
        let options = MqttClientOptions::builder()
            .client_id("c")
            .max_outgoing_packet_count(2)
            .build();
        let mut engine = connected_engine(options, now);

        let publish = || PublishCommand::simple("t", b"x".to_vec(), 0, false);
        assert!(engine.publish(publish(), now).is_ok());
        assert!(engine.publish(publish(), now).is_ok());

        match engine.publish(publish(), now) {
            Err(MqttClientError::BufferFull {
                buffer_type,
                capacity,
            }) => {
                assert_eq!(buffer_type, "outgoing");
                assert_eq!(capacity, 2);
            }
            other => panic!("Expected BufferFull error, got {:?}", other),
        }

        // Drain and retry
        assert_eq!(engine.take_outgoing_frames().len(), 2);
        assert!(engine.publish(publish(), now).is_ok());
    }

    #[test]
    fn test_qos1_buffer_full_releases_packet_id() {
        let now = Instant::now();
        let options = MqttClientOptions::builder()
            .client_id("c")
            .max_outgoing_packet_count(1)
            .build();
        let mut engine = connected_engine(options, now);
        engine
            .publish(PublishCommand::simple("t", vec![], 1, false), now)
            .unwrap();
        assert!(engine
            .publish(PublishCommand::simple("t", vec![], 1, false), now)
            .is_err());
        assert_eq!(engine.session().outbound_inflight().len(), 1);
    }

    #[test]
    fn test_event_buffer_limit() {
        let now = Instant::now();
        let options = MqttClientOptions::builder()
            .client_id("c")
            .max_event_count(1)
            .build();
        let mut engine = connected_engine(options, now);

        let mut data = MqttPacket::PingResp(MqttPingResp::new()).to_bytes().unwrap();
        data.extend(MqttPacket::PingResp(MqttPingResp::new()).to_bytes().unwrap());

        // Should only process 1 packet because limit is 1
        let events = engine.handle_incoming(&data, now);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MqttEvent::PingResponse));
        assert!(engine.is_input_paused());

        let events = engine.handle_incoming(&[], now);
        assert_eq!(events.len(), 1);
        assert!(!engine.is_input_paused());
    }

    #[test]
    fn test_no_timer_when_disconnected() {
        let engine = MqttEngine::new(MqttClientOptions::builder().client_id("c").build());
        assert_eq!(engine.next_tick_at(), None);
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_twice_is_rejected() {
        let now = Instant::now();
        let mut engine = MqttEngine::new(MqttClientOptions::builder().client_id("c").build());
        engine.connect(now).unwrap();
        assert!(matches!(engine.connect(now), Err(MqttClientError::AlreadyConnected)));
    }

    #[test]
    fn test_exhausted_policy_settles_disconnected() {
        let now = Instant::now();
        let options = MqttClientOptions::builder()
            .client_id("c")
            .reconnect(ReconnectPolicy {
                max_attempts: 1,
                ..ReconnectPolicy::constant(Duration::from_millis(10))
            })
            .build();
        let mut engine = connected_engine(options, now);

        let events = engine.handle_connection_lost("reset", now);
        assert!(matches!(events.last(), Some(MqttEvent::ReconnectScheduled { attempt: 1, .. })));

        let later = now + Duration::from_millis(10);
        assert!(matches!(engine.handle_tick(later).as_slice(), [MqttEvent::ReconnectNeeded]));
        engine.connect(later).unwrap();
        let events = engine.handle_transport_closed(later);
        assert!(events.iter().any(|e| matches!(
            e,
            MqttEvent::Error(MqttClientError::ReconnectExhausted { attempts: 1 })
        )));
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(engine.next_tick_at(), None);
    }
}
