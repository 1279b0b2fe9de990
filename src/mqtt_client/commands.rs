// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

use crate::mqtt_serde::mqttv3::{MqttPublish, SubscriptionTopic};

/// An application message to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishCommand {
    pub topic_name: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
    /// Explicit packet identifier. Allocated by the session when `None`.
    pub packet_id: Option<u16>,
}

impl PublishCommand {
    pub fn new(
        topic_name: String,
        payload: Vec<u8>,
        qos: u8,
        retain: bool,
        packet_id: Option<u16>,
    ) -> Self {
        Self {
            topic_name,
            payload,
            qos,
            retain,
            packet_id,
        }
    }

    pub fn simple(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: u8, retain: bool) -> Self {
        Self::new(topic.into(), payload.into(), qos, retain, None)
    }

    pub fn builder() -> PublishCommandBuilder {
        PublishCommandBuilder::new()
    }

    pub fn to_mqtt_publish(&self) -> MqttPublish {
        MqttPublish::new(
            self.topic_name.clone(),
            self.qos,
            self.payload.clone(),
            self.packet_id,
            self.retain,
            false,
        )
    }
}

/// Fluent construction of a [`PublishCommand`].
#[derive(Debug, Clone, Default)]
pub struct PublishCommandBuilder {
    topic_name: Option<String>,
    payload: Vec<u8>,
    qos: u8,
    retain: bool,
    packet_id: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishBuilderError {
    /// Topic name was not provided
    NoTopic,
    InvalidQoS(u8),
}

impl std::fmt::Display for PublishBuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTopic => write!(f, "Topic name not provided. Call topic() to set the topic."),
            Self::InvalidQoS(qos) => write!(f, "QoS must be 0, 1 or 2, got {}", qos),
        }
    }
}

impl std::error::Error for PublishBuilderError {}

impl PublishCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic_name = Some(topic.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_packet_id(mut self, id: u16) -> Self {
        self.packet_id = Some(id);
        self
    }

    pub fn build(self) -> Result<PublishCommand, PublishBuilderError> {
        let topic_name = self.topic_name.ok_or(PublishBuilderError::NoTopic)?;
        if self.qos > 2 {
            return Err(PublishBuilderError::InvalidQoS(self.qos));
        }

        Ok(PublishCommand {
            topic_name,
            payload: self.payload,
            qos: self.qos,
            retain: self.retain,
            packet_id: self.packet_id,
        })
    }
}

/// One SUBSCRIBE carrying one or more filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeCommand {
    pub subscriptions: Vec<SubscriptionTopic>,
}

impl SubscribeCommand {
    pub fn new(subscriptions: Vec<SubscriptionTopic>) -> Self {
        Self { subscriptions }
    }

    pub fn single(topic: impl Into<String>, qos: u8) -> Self {
        Self::new(vec![SubscriptionTopic::new(topic, qos)])
    }

    pub fn builder() -> SubscribeCommandBuilder {
        SubscribeCommandBuilder::new()
    }

    pub fn topic_filters(&self) -> Vec<String> {
        self.subscriptions
            .iter()
            .map(|s| s.topic_filter.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeCommandBuilder {
    subscriptions: Vec<SubscriptionTopic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeBuilderError {
    NoSubscriptions,
    InvalidQoS(u8),
}

impl std::fmt::Display for SubscribeBuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSubscriptions => {
                write!(f, "No subscriptions added. Call add_topic() at least once.")
            }
            Self::InvalidQoS(qos) => write!(f, "QoS must be 0, 1 or 2, got {}", qos),
        }
    }
}

impl std::error::Error for SubscribeBuilderError {}

impl SubscribeCommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_topic(mut self, topic: impl Into<String>, qos: u8) -> Self {
        self.subscriptions.push(SubscriptionTopic::new(topic, qos));
        self
    }

    pub fn build(self) -> Result<SubscribeCommand, SubscribeBuilderError> {
        if self.subscriptions.is_empty() {
            return Err(SubscribeBuilderError::NoSubscriptions);
        }
        if let Some(bad) = self.subscriptions.iter().find(|s| s.qos > 2) {
            return Err(SubscribeBuilderError::InvalidQoS(bad.qos));
        }
        Ok(SubscribeCommand::new(self.subscriptions))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeCommand {
    pub topics: Vec<String>,
}

impl UnsubscribeCommand {
    pub fn new(topics: Vec<String>) -> Self {
        Self { topics }
    }

    pub fn from_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(topics.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_publish() {
        let cmd = PublishCommand::builder()
            .topic("sensors/temp")
            .payload(b"23.5")
            .qos(1)
            .build()
            .unwrap();

        assert_eq!(cmd.topic_name, "sensors/temp");
        assert_eq!(cmd.payload, b"23.5");
        assert_eq!(cmd.qos, 1);
        assert!(!cmd.retain);
        assert!(cmd.packet_id.is_none());
    }

    #[test]
    fn test_publish_with_retain() {
        let cmd = PublishCommand::builder()
            .topic("status/online")
            .payload(b"true")
            .retain(true)
            .build()
            .unwrap();

        assert!(cmd.retain);
        assert_eq!(cmd.qos, 0); // Default QoS
    }

    #[test]
    fn test_publish_builder_errors() {
        assert_eq!(
            PublishCommand::builder().payload(b"x").build(),
            Err(PublishBuilderError::NoTopic)
        );
        assert_eq!(
            PublishCommand::builder().topic("a").qos(3).build(),
            Err(PublishBuilderError::InvalidQoS(3))
        );
    }

    #[test]
    fn test_publish_with_packet_id() {
        let cmd = PublishCommand::builder()
            .topic("test/topic")
            .qos(2)
            .with_packet_id(123)
            .build()
            .unwrap();

        let packet = cmd.to_mqtt_publish();
        assert_eq!(packet.packet_id, Some(123));
        assert!(!packet.dup);
    }

    #[test]
    fn test_subscribe_builder() {
        let cmd = SubscribeCommand::builder()
            .add_topic("sensors/+/temp", 1)
            .add_topic("alerts/#", 2)
            .build()
            .unwrap();
        assert_eq!(cmd.topic_filters(), vec!["sensors/+/temp", "alerts/#"]);
        assert_eq!(
            SubscribeCommand::builder().build(),
            Err(SubscribeBuilderError::NoSubscriptions)
        );
    }

    #[test]
    fn test_unsubscribe_from_topics() {
        let cmd = UnsubscribeCommand::from_topics(["a/b", "c/#"]);
        assert_eq!(cmd.topics, vec!["a/b".to_string(), "c/#".to_string()]);
    }
}
