use crate::config::MqttConfig;
use crate::errors::PublishError;
use crate::metrics::PUBLISH_FAILURES_TOTAL;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tracing::{debug, error, info};

const KEEP_ALIVE_SECS: u64 = 60;
const REQUEST_CAPACITY: usize = 10;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Wire format consumed downstream: second mill first, then first mill.
pub fn format_message(mill_1_value: &str, mill_2_value: &str) -> String {
    format!("SPM_2:{},SPM_1:{}", mill_2_value, mill_1_value)
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &str) -> Result<(), PublishError>;
}

/// Publishes over MQTT 3.1.1 with a fresh connection per message: connect,
/// publish with QoS 1, wait for the PUBACK, disconnect.
pub struct MqttPublisher {
    config: MqttConfig,
}

impl MqttPublisher {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let mut mqtt_options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        mqtt_options.set_credentials(&self.config.username, &self.config.password);
        mqtt_options.set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS));
        mqtt_options.set_clean_session(true);
        mqtt_options
    }

    async fn send(&self, message: &str) -> Result<(), PublishError> {
        debug!(
            "Connecting to MQTT broker at {}:{}",
            self.config.host, self.config.port
        );
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        client
            .publish(
                &self.config.topic,
                QoS::AtLeastOnce,
                false,
                message.as_bytes().to_vec(),
            )
            .await?;

        let acked = tokio::time::timeout(self.config.ack_timeout, wait_for_puback(&mut eventloop))
            .await
            .unwrap_or(Err(PublishError::Timeout(self.config.ack_timeout)));

        disconnect(&client, &mut eventloop).await;
        acked
    }
}

async fn wait_for_puback(eventloop: &mut EventLoop) -> Result<(), PublishError> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => debug!("Connected: {:?}", ack.code),
            Event::Incoming(Packet::PubAck(ack)) => {
                debug!("PUBACK for packet {}", ack.pkid);
                return Ok(());
            }
            event => debug!("MQTT event: {:?}", event),
        }
    }
}

/// Best effort; the message is already acknowledged or lost by now.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.disconnect().await {
        debug!("MQTT disconnect request failed: {}", e);
        return;
    }

    let drain = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("MQTT connection closed: {}", e);
                    break;
                }
            }
        }
    };
    if tokio::time::timeout(DISCONNECT_TIMEOUT, drain).await.is_err() {
        debug!("MQTT disconnect timed out");
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, message: &str) -> Result<(), PublishError> {
        info!("Publishing to {}: {}", self.config.topic, message);

        match self.send(message).await {
            Ok(()) => {
                info!("Successfully published to MQTT");
                Ok(())
            }
            Err(e) => {
                PUBLISH_FAILURES_TOTAL.inc();
                error!("Failed to publish message: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port: u16) -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            username: "bridge".to_string(),
            password: "s3cret".to_string(),
            topic: "plant/spm".to_string(),
            client_id: "spm-bridge-test".to_string(),
            ack_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_message_format() {
        assert_eq!(format_message("112", "85"), "SPM_2:85,SPM_1:112");
    }

    #[test]
    fn test_message_keeps_values_verbatim() {
        assert_eq!(format_message("0", "12.5"), "SPM_2:12.5,SPM_1:0");
    }

    #[test]
    fn test_options_carry_credentials() {
        let publisher = MqttPublisher::new(config(1883));
        let options = publisher.options();

        assert_eq!(options.client_id(), "spm-bridge-test");
        assert_eq!(
            options.broker_address(),
            ("127.0.0.1".to_string(), 1883)
        );
        assert_eq!(
            options.credentials(),
            Some(("bridge".to_string(), "s3cret".to_string()))
        );
        assert!(options.clean_session());
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails() {
        // nothing listens on the discard port
        let publisher = MqttPublisher::new(config(9));
        assert!(publisher.publish("SPM_2:1,SPM_1:2").await.is_err());
    }
}
