// SPDX-License-Identifier: MPL-2.0

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::inflight::{Direction, HandshakeStage, InflightMessage, InflightQueue};
use crate::mqtt_client::error::{MqttClientError, MqttClientResult};
use crate::mqtt_serde::control_packet::MqttPacket;
use crate::mqtt_serde::mqttv3::connect::Will;
use crate::mqtt_serde::mqttv3::suback::SUBSCRIPTION_FAILURE;
use crate::mqtt_serde::mqttv3::{
    MqttPubAck, MqttPubComp, MqttPubRec, MqttPubRel, MqttPublish, MqttSubAck, MqttSubscribe,
    MqttUnsubscribe, SubscriptionTopic,
};
use crate::mqtt_topic;

/// An active subscription, keyed by its filter string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub topic_filter: String,
    pub requested_qos: u8,
    pub granted_qos: u8,
}

/// What to do with an inbound PUBLISH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundAction {
    /// Hand the message to the caller, then send the ack if there is one.
    Deliver(Option<MqttPacket>),
    /// Already delivered; only repeat the ack.
    Duplicate(MqttPacket),
}

/// Result of matching a SUBACK against the SUBSCRIBE it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckOutcome {
    pub packet_id: u16,
    /// `(filter, return code)` in request order.
    pub results: Vec<(String, u8)>,
    /// Filters answered with 0x80.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone)]
struct PendingSubscribe {
    topics: Vec<SubscriptionTopic>,
}

/// Client side session state (MQTT 3.1.1, 4.1).
///
/// Owns the subscriptions, both in-flight stores and the packet identifier
/// space used by outgoing PUBLISH, SUBSCRIBE and UNSUBSCRIBE.
#[derive(Debug)]
pub struct ClientSession {
    client_id: String,
    clean_session: bool,
    keep_alive: u16,
    will: Option<Will>,

    subscriptions: BTreeMap<String, Subscription>,
    outbound: InflightQueue,
    inbound: InflightQueue,
    pending_subscribes: HashMap<u16, PendingSubscribe>,
    pending_unsubscribes: HashMap<u16, Vec<String>>,
    last_packet_id: u16,
}

impl ClientSession {
    pub fn new(
        client_id: impl Into<String>,
        clean_session: bool,
        keep_alive: u16,
        will: Option<Will>,
        max_inflight: u16,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session,
            keep_alive,
            will,
            subscriptions: BTreeMap::new(),
            outbound: InflightQueue::new(Direction::Outbound, max_inflight),
            inbound: InflightQueue::new(Direction::Inbound, 0),
            pending_subscribes: HashMap::new(),
            pending_unsubscribes: HashMap::new(),
            last_packet_id: 0,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    pub fn will(&self) -> Option<&Will> {
        self.will.as_ref()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    pub fn subscription(&self, topic_filter: &str) -> Option<&Subscription> {
        self.subscriptions.get(topic_filter)
    }

    pub fn outbound_inflight(&self) -> &InflightQueue {
        &self.outbound
    }

    pub fn inbound_inflight(&self) -> &InflightQueue {
        &self.inbound
    }

    fn packet_id_in_use(&self, packet_id: u16) -> bool {
        self.outbound.contains(packet_id)
            || self.pending_subscribes.contains_key(&packet_id)
            || self.pending_unsubscribes.contains_key(&packet_id)
    }

    /// Allocates the next free outbound packet identifier.
    ///
    /// Identifiers cycle through 1..=65535 and skip every id still held by an
    /// unacknowledged PUBLISH, SUBSCRIBE or UNSUBSCRIBE.
    pub fn next_packet_id(&mut self) -> MqttClientResult<u16> {
        let mut candidate = self.last_packet_id;
        for _ in 0..u16::MAX {
            candidate = if candidate == u16::MAX { 1 } else { candidate + 1 };
            if !self.packet_id_in_use(candidate) {
                self.last_packet_id = candidate;
                return Ok(candidate);
            }
        }
        Err(MqttClientError::PacketIdExhausted)
    }

    // ==================== Outbound PUBLISH ====================

    /// Tracks an outgoing QoS 1/2 PUBLISH and returns the PUBLISH to write.
    ///
    /// With `queued` set the message is only stored and written when the
    /// next connection is accepted.
    pub fn track_outgoing_publish(
        &mut self,
        topic: String,
        payload: Vec<u8>,
        qos: u8,
        retain: bool,
        packet_id: Option<u16>,
        queued: bool,
    ) -> MqttClientResult<MqttPublish> {
        if self.outbound.is_full() {
            return Err(MqttClientError::BufferFull {
                buffer_type: "outbound inflight".to_string(),
                capacity: self.outbound.capacity(),
            });
        }
        let packet_id = match packet_id {
            Some(id) if self.packet_id_in_use(id) => {
                return Err(MqttClientError::PacketIdInUse { packet_id: id })
            }
            Some(0) => {
                return Err(MqttClientError::Encoding {
                    message: "packet identifier 0 is not allowed".to_string(),
                })
            }
            Some(id) => id,
            None => self.next_packet_id()?,
        };

        let publish = MqttPublish::new(topic.clone(), qos, payload.clone(), Some(packet_id), retain, false);
        self.outbound.push(InflightMessage {
            packet_id,
            topic,
            payload,
            qos,
            retain,
            direction: Direction::Outbound,
            stage: if queued {
                HandshakeStage::Queued
            } else {
                InflightMessage::published_stage(qos)
            },
            sequence: 0,
            send_count: if queued { 0 } else { 1 },
        })?;
        Ok(publish)
    }

    /// Drops an outbound entry whose PUBLISH could not be written at all.
    pub fn forget_outgoing(&mut self, packet_id: u16) {
        self.outbound.remove(packet_id);
    }

    /// PUBACK for a QoS 1 PUBLISH. Returns the completed message.
    pub fn handle_incoming_puback(
        &mut self,
        puback: &MqttPubAck,
    ) -> MqttClientResult<Option<InflightMessage>> {
        match self
            .outbound
            .complete(puback.packet_id, HandshakeStage::AwaitingPubAck)
        {
            Ok(Some(done)) => Ok(Some(done)),
            Ok(None) => {
                warn!(packet_id = puback.packet_id, "PUBACK for unknown packet id ignored");
                Ok(None)
            }
            Err(stage) => Err(MqttClientError::protocol_violation(format!(
                "PUBACK for packet {} in stage {:?}",
                puback.packet_id, stage
            ))),
        }
    }

    /// PUBREC for a QoS 2 PUBLISH. Returns the PUBREL to send.
    ///
    /// A repeated PUBREC after PUBREL was already sent re-sends PUBREL.
    pub fn handle_incoming_pubrec(
        &mut self,
        pubrec: &MqttPubRec,
    ) -> MqttClientResult<Option<MqttPubRel>> {
        let packet_id = pubrec.packet_id;
        match self.outbound.advance(
            packet_id,
            HandshakeStage::AwaitingPubRec,
            HandshakeStage::AwaitingPubComp,
        ) {
            Ok(Some(_)) => Ok(Some(MqttPubRel::new(packet_id))),
            Ok(None) => {
                warn!(packet_id, "PUBREC for unknown packet id ignored");
                Ok(None)
            }
            Err(HandshakeStage::AwaitingPubComp) => {
                debug!(packet_id, "duplicate PUBREC, repeating PUBREL");
                Ok(Some(MqttPubRel::new(packet_id)))
            }
            Err(stage) => Err(MqttClientError::protocol_violation(format!(
                "PUBREC for packet {} in stage {:?}",
                packet_id, stage
            ))),
        }
    }

    /// PUBCOMP closing a QoS 2 handshake. Returns the completed message.
    pub fn handle_incoming_pubcomp(
        &mut self,
        pubcomp: &MqttPubComp,
    ) -> MqttClientResult<Option<InflightMessage>> {
        match self
            .outbound
            .complete(pubcomp.packet_id, HandshakeStage::AwaitingPubComp)
        {
            Ok(Some(done)) => Ok(Some(done)),
            Ok(None) => {
                warn!(packet_id = pubcomp.packet_id, "PUBCOMP for unknown packet id ignored");
                Ok(None)
            }
            Err(stage) => Err(MqttClientError::protocol_violation(format!(
                "PUBCOMP for packet {} in stage {:?}",
                pubcomp.packet_id, stage
            ))),
        }
    }

    /// Packets to write after a new connection is accepted, in original
    /// order. Each entry is emitted exactly once per call.
    ///
    /// - never sent: PUBLISH
    /// - waiting for PUBACK/PUBREC: PUBLISH with DUP set, same packet id
    /// - waiting for PUBCOMP: PUBREL
    /// - SUBSCRIBE / UNSUBSCRIBE still waiting for their ack
    pub fn resend_pending_messages(&mut self) -> Vec<MqttPacket> {
        let mut packets = Vec::new();
        for entry in self.outbound.ordered_mut() {
            match entry.stage {
                HandshakeStage::Queued => {
                    entry.stage = InflightMessage::published_stage(entry.qos);
                    entry.send_count += 1;
                    packets.push(MqttPacket::Publish(MqttPublish::new(
                        entry.topic.clone(),
                        entry.qos,
                        entry.payload.clone(),
                        Some(entry.packet_id),
                        entry.retain,
                        false,
                    )));
                }
                HandshakeStage::AwaitingPubAck | HandshakeStage::AwaitingPubRec => {
                    entry.send_count += 1;
                    packets.push(MqttPacket::Publish(MqttPublish::new(
                        entry.topic.clone(),
                        entry.qos,
                        entry.payload.clone(),
                        Some(entry.packet_id),
                        entry.retain,
                        true,
                    )));
                }
                HandshakeStage::AwaitingPubComp => {
                    packets.push(MqttPacket::PubRel(MqttPubRel::new(entry.packet_id)));
                }
                HandshakeStage::AwaitingPubRel => {}
            }
        }

        let mut sub_ids: Vec<u16> = self.pending_subscribes.keys().copied().collect();
        sub_ids.sort_unstable();
        for id in sub_ids {
            let pending = &self.pending_subscribes[&id];
            packets.push(MqttPacket::Subscribe(MqttSubscribe::new(id, pending.topics.clone())));
        }
        let mut unsub_ids: Vec<u16> = self.pending_unsubscribes.keys().copied().collect();
        unsub_ids.sort_unstable();
        for id in unsub_ids {
            packets.push(MqttPacket::Unsubscribe(MqttUnsubscribe::new(
                id,
                self.pending_unsubscribes[&id].clone(),
            )));
        }
        packets
    }

    // ==================== Inbound PUBLISH ====================

    /// Decides delivery and acknowledgement for an inbound PUBLISH.
    ///
    /// QoS 2 ids stay recorded until PUBREL so a redelivery (DUP set) is
    /// acknowledged again but not handed to the caller twice.
    pub fn handle_incoming_publish(
        &mut self,
        publish: &MqttPublish,
    ) -> MqttClientResult<InboundAction> {
        let packet_id = match (publish.qos, publish.packet_id) {
            (0, _) => return Ok(InboundAction::Deliver(None)),
            (_, Some(id)) => id,
            (_, None) => {
                return Err(MqttClientError::protocol_violation(
                    "QoS > 0 PUBLISH without packet identifier",
                ))
            }
        };

        if publish.qos == 1 {
            return Ok(InboundAction::Deliver(Some(MqttPacket::PubAck(
                MqttPubAck::new(packet_id),
            ))));
        }

        if self.inbound.contains(packet_id) {
            if publish.dup {
                debug!(packet_id, "duplicate QoS 2 PUBLISH suppressed");
                return Ok(InboundAction::Duplicate(MqttPacket::PubRec(MqttPubRec::new(
                    packet_id,
                ))));
            }
            return Err(MqttClientError::protocol_violation(format!(
                "packet identifier {} reused while awaiting PUBREL",
                packet_id
            )));
        }

        self.inbound.push(InflightMessage {
            packet_id,
            topic: publish.topic_name.clone(),
            payload: Vec::new(),
            qos: 2,
            retain: publish.retain,
            direction: Direction::Inbound,
            stage: HandshakeStage::AwaitingPubRel,
            sequence: 0,
            send_count: 0,
        })?;
        Ok(InboundAction::Deliver(Some(MqttPacket::PubRec(
            MqttPubRec::new(packet_id),
        ))))
    }

    /// PUBREL from the broker. Always answered with PUBCOMP.
    pub fn handle_incoming_pubrel(&mut self, pubrel: &MqttPubRel) -> MqttPubComp {
        if self.inbound.remove(pubrel.packet_id).is_none() {
            debug!(packet_id = pubrel.packet_id, "PUBREL for unknown packet id");
        }
        MqttPubComp::new(pubrel.packet_id)
    }

    /// Drops inbound QoS 2 state after the broker reported no session.
    pub fn discard_inbound(&mut self) {
        self.inbound.clear();
    }

    // ==================== Subscriptions ====================

    /// Registers a SUBSCRIBE awaiting its SUBACK and returns the packet.
    pub fn track_subscribe(
        &mut self,
        topics: Vec<SubscriptionTopic>,
    ) -> MqttClientResult<MqttSubscribe> {
        if topics.is_empty() {
            return Err(MqttClientError::Encoding {
                message: "SUBSCRIBE needs at least one topic filter".to_string(),
            });
        }
        for t in &topics {
            mqtt_topic::validate_topic_filter(&t.topic_filter)?;
        }
        let packet_id = self.next_packet_id()?;
        self.pending_subscribes.insert(
            packet_id,
            PendingSubscribe {
                topics: topics.clone(),
            },
        );
        Ok(MqttSubscribe::new(packet_id, topics))
    }

    /// SUBSCRIBE re-establishing every stored subscription, if any.
    pub fn resubscribe_all(&mut self) -> MqttClientResult<Option<MqttSubscribe>> {
        let pending: Vec<&str> = self
            .pending_subscribes
            .values()
            .flat_map(|p| p.topics.iter().map(|t| t.topic_filter.as_str()))
            .collect();
        let topics: Vec<SubscriptionTopic> = self
            .subscriptions
            .values()
            .filter(|s| !pending.contains(&s.topic_filter.as_str()))
            .map(|s| SubscriptionTopic::new(s.topic_filter.clone(), s.requested_qos))
            .collect();
        if topics.is_empty() {
            return Ok(None);
        }
        self.track_subscribe(topics).map(Some)
    }

    /// Applies a SUBACK. Unknown packet ids yield `Ok(None)`.
    pub fn handle_suback(&mut self, suback: &MqttSubAck) -> MqttClientResult<Option<SubAckOutcome>> {
        let pending = match self.pending_subscribes.remove(&suback.packet_id) {
            Some(p) => p,
            None => {
                warn!(packet_id = suback.packet_id, "SUBACK for unknown packet id ignored");
                return Ok(None);
            }
        };
        if pending.topics.len() != suback.return_codes.len() {
            return Err(MqttClientError::protocol_violation(format!(
                "SUBACK {} carries {} return codes for {} filters",
                suback.packet_id,
                suback.return_codes.len(),
                pending.topics.len()
            )));
        }

        let mut results = Vec::with_capacity(pending.topics.len());
        let mut rejected = Vec::new();
        for (topic, code) in pending.topics.into_iter().zip(suback.return_codes.iter().copied()) {
            if code == SUBSCRIPTION_FAILURE {
                rejected.push(topic.topic_filter.clone());
            } else {
                self.subscriptions.insert(
                    topic.topic_filter.clone(),
                    Subscription {
                        topic_filter: topic.topic_filter.clone(),
                        requested_qos: topic.qos,
                        granted_qos: code,
                    },
                );
            }
            results.push((topic.topic_filter, code));
        }

        Ok(Some(SubAckOutcome {
            packet_id: suback.packet_id,
            results,
            rejected,
        }))
    }

    /// Registers an UNSUBSCRIBE awaiting its UNSUBACK and returns the packet.
    pub fn track_unsubscribe(
        &mut self,
        topic_filters: Vec<String>,
    ) -> MqttClientResult<MqttUnsubscribe> {
        if topic_filters.is_empty() {
            return Err(MqttClientError::Encoding {
                message: "UNSUBSCRIBE needs at least one topic filter".to_string(),
            });
        }
        for f in &topic_filters {
            mqtt_topic::validate_topic_filter(f)?;
        }
        let packet_id = self.next_packet_id()?;
        self.pending_unsubscribes
            .insert(packet_id, topic_filters.clone());
        Ok(MqttUnsubscribe::new(packet_id, topic_filters))
    }

    /// Applies an UNSUBACK and returns the removed filters.
    pub fn handle_unsuback(&mut self, packet_id: u16) -> Option<Vec<String>> {
        let filters = match self.pending_unsubscribes.remove(&packet_id) {
            Some(f) => f,
            None => {
                warn!(packet_id, "UNSUBACK for unknown packet id ignored");
                return None;
            }
        };
        for f in &filters {
            self.subscriptions.remove(f);
        }
        Some(filters)
    }

    /// Stored subscriptions whose filter matches `topic_name`.
    pub fn matching_subscriptions(&self, topic_name: &str) -> Vec<&Subscription> {
        self.subscriptions
            .values()
            .filter(|s| mqtt_topic::matches(&s.topic_filter, topic_name))
            .collect()
    }

    /// Destroys all session state; the client identity is kept.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.outbound.clear();
        self.inbound.clear();
        self.pending_subscribes.clear();
        self.pending_unsubscribes.clear();
        self.last_packet_id = 0;
    }
}
