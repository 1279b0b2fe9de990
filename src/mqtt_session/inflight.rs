// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mqtt_client::error::MqttClientError;

/// Which side originated the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Position of a QoS 1/2 message in its acknowledgement handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeStage {
    /// Accepted while offline, never written to a transport.
    Queued,
    /// QoS 1 PUBLISH sent.
    AwaitingPubAck,
    /// QoS 2 PUBLISH sent.
    AwaitingPubRec,
    /// QoS 2 PUBREC received, PUBREL sent.
    AwaitingPubComp,
    /// Inbound QoS 2 PUBLISH delivered, PUBREC sent.
    AwaitingPubRel,
}

/// A QoS > 0 message whose handshake has not completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflightMessage {
    pub packet_id: u16,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
    pub direction: Direction,
    pub stage: HandshakeStage,
    /// Insertion order, used to replay in the original send order.
    pub sequence: u64,
    /// How many times the PUBLISH has been written.
    pub send_count: u32,
}

impl InflightMessage {
    /// Stage reached once the PUBLISH itself has been written.
    pub fn published_stage(qos: u8) -> HandshakeStage {
        if qos == 2 {
            HandshakeStage::AwaitingPubRec
        } else {
            HandshakeStage::AwaitingPubAck
        }
    }
}

/// Packet-id keyed store of in-flight messages for one direction.
///
/// - O(1) lookups by packet identifier.
/// - Rejects a packet identifier that is already held.
/// - Bounded by `capacity` (0 means 65535).
#[derive(Debug)]
pub struct InflightQueue {
    direction: Direction,
    entries: HashMap<u16, InflightMessage>,
    capacity: usize,
    next_sequence: u64,
}

impl InflightQueue {
    pub fn new(direction: Direction, capacity: u16) -> Self {
        Self {
            direction,
            entries: HashMap::new(),
            capacity: if capacity == 0 {
                u16::MAX as usize
            } else {
                capacity as usize
            },
            next_sequence: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.entries.contains_key(&packet_id)
    }

    pub fn get(&self, packet_id: u16) -> Option<&InflightMessage> {
        self.entries.get(&packet_id)
    }

    /// Tracks a new message; `sequence` and `direction` are assigned here.
    pub fn push(&mut self, mut message: InflightMessage) -> Result<(), MqttClientError> {
        if self.entries.contains_key(&message.packet_id) {
            return Err(MqttClientError::PacketIdInUse {
                packet_id: message.packet_id,
            });
        }
        if self.is_full() {
            return Err(MqttClientError::BufferFull {
                buffer_type: format!("{:?} inflight", self.direction),
                capacity: self.capacity,
            });
        }
        message.direction = self.direction;
        message.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(message.packet_id, message);
        Ok(())
    }

    /// Moves an entry to `next` if it currently sits at `expected`.
    ///
    /// Returns `Ok(None)` for an unknown id and `Err(current)` when the entry
    /// is at a different stage.
    pub fn advance(
        &mut self,
        packet_id: u16,
        expected: HandshakeStage,
        next: HandshakeStage,
    ) -> Result<Option<&InflightMessage>, HandshakeStage> {
        match self.entries.get_mut(&packet_id) {
            None => Ok(None),
            Some(entry) if entry.stage == expected => {
                entry.stage = next;
                Ok(Some(&*entry))
            }
            Some(entry) => Err(entry.stage),
        }
    }

    /// Completes the handshake of an entry at `expected`.
    pub fn complete(
        &mut self,
        packet_id: u16,
        expected: HandshakeStage,
    ) -> Result<Option<InflightMessage>, HandshakeStage> {
        match self.entries.get(&packet_id).map(|e| e.stage) {
            None => Ok(None),
            Some(stage) if stage == expected => Ok(self.entries.remove(&packet_id)),
            Some(stage) => Err(stage),
        }
    }

    pub fn remove(&mut self, packet_id: u16) -> Option<InflightMessage> {
        self.entries.remove(&packet_id)
    }

    /// Mutable view of every entry in original send order.
    pub fn ordered_mut(&mut self) -> Vec<&mut InflightMessage> {
        let mut entries: Vec<&mut InflightMessage> = self.entries.values_mut().collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    pub fn ordered(&self) -> Vec<&InflightMessage> {
        let mut entries: Vec<&InflightMessage> = self.entries.values().collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(packet_id: u16, qos: u8) -> InflightMessage {
        InflightMessage {
            packet_id,
            topic: "t".to_string(),
            payload: vec![1],
            qos,
            retain: false,
            direction: Direction::Outbound,
            stage: InflightMessage::published_stage(qos),
            sequence: 0,
            send_count: 1,
        }
    }

    #[test]
    fn test_push_rejects_duplicate_id() {
        let mut queue = InflightQueue::new(Direction::Outbound, 0);
        queue.push(message(1, 1)).unwrap();
        assert!(matches!(
            queue.push(message(1, 2)),
            Err(MqttClientError::PacketIdInUse { packet_id: 1 })
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let mut queue = InflightQueue::new(Direction::Outbound, 2);
        queue.push(message(1, 1)).unwrap();
        queue.push(message(2, 1)).unwrap();
        assert!(queue.is_full());
        assert!(matches!(
            queue.push(message(3, 1)),
            Err(MqttClientError::BufferFull { capacity: 2, .. })
        ));
    }

    #[test]
    fn test_stage_transitions() {
        let mut queue = InflightQueue::new(Direction::Outbound, 0);
        queue.push(message(5, 2)).unwrap();

        // PUBCOMP before PUBREC is out of order
        assert_eq!(
            queue.complete(5, HandshakeStage::AwaitingPubComp),
            Err(HandshakeStage::AwaitingPubRec)
        );
        let advanced = queue
            .advance(5, HandshakeStage::AwaitingPubRec, HandshakeStage::AwaitingPubComp)
            .unwrap()
            .unwrap();
        assert_eq!(advanced.stage, HandshakeStage::AwaitingPubComp);
        let done = queue.complete(5, HandshakeStage::AwaitingPubComp).unwrap();
        assert_eq!(done.map(|m| m.packet_id), Some(5));
        assert!(queue.is_empty());
        assert_eq!(queue.complete(5, HandshakeStage::AwaitingPubComp), Ok(None));
    }

    #[test]
    fn test_ordered_by_insertion() {
        let mut queue = InflightQueue::new(Direction::Outbound, 0);
        for id in [30, 10, 20] {
            queue.push(message(id, 1)).unwrap();
        }
        let ids: Vec<u16> = queue.ordered().iter().map(|m| m.packet_id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
    }

    #[test]
    fn test_direction_assigned_by_queue() {
        let mut queue = InflightQueue::new(Direction::Inbound, 0);
        queue.push(message(1, 2)).unwrap();
        assert_eq!(queue.get(1).unwrap().direction, Direction::Inbound);
    }
}
