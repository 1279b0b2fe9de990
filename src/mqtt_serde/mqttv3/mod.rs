// SPDX-License-Identifier: MPL-2.0

//! MQTT 3.1.1 control packets, one module per packet type.

pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod pingreq;
pub mod pingresp;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

pub use connack::MqttConnAck;
pub use connect::{MqttConnect, Will};
pub use disconnect::MqttDisconnect;
pub use pingreq::MqttPingReq;
pub use pingresp::MqttPingResp;
pub use puback::MqttPubAck;
pub use pubcomp::MqttPubComp;
pub use publish::MqttPublish;
pub use pubrec::MqttPubRec;
pub use pubrel::MqttPubRel;
pub use suback::MqttSubAck;
pub use subscribe::{MqttSubscribe, SubscriptionTopic};
pub use unsuback::MqttUnsubAck;
pub use unsubscribe::MqttUnsubscribe;
