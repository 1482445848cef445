use std::time::Duration;

use log::{debug, error, info};
use rumqttc::{MqttOptions, QoS};

use crate::config;

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    topic_path: String,
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .clone()
            .unwrap_or_else(|| "keybox-gateway".to_string());

        let mut mqttoptions =
            MqttOptions::new(publisher_id, config.host.clone(), config.port.unwrap_or(1883));

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(60)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                topic_path: config
                    .topic_path
                    .clone()
                    .unwrap_or_else(|| "ecole/salles".to_string()),
            },
            eventloop,
        )
    }

    /// Drives the connection. Outgoing publishes only make progress while
    /// this is being polled.
    pub async fn event_loop(eventloop: &mut rumqttc::EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(notification) => match notification {
                    rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
                        info!("Connected to MQTT broker");
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::Disconnect) => {
                        debug!("Broker closed the connection");
                    }
                    _ => {}
                },
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub fn status_topic(&self, room: &str) -> String {
        format!("{}/{}/status", self.topic_path, sanitize_name(room))
    }

    /// Publishes the latest state of a room, retained so late subscribers
    /// see it immediately.
    pub async fn publish_status(
        &self,
        room: &str,
        payload: String,
    ) -> Result<(), rumqttc::ClientError> {
        let topic = self.status_topic(room);
        debug!("Publishing {} on {}", payload, topic);
        self.client
            .publish(topic, QoS::AtMostOnce, true, payload)
            .await
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

fn sanitize_name(name: &str) -> String {
    // Topic levels may not contain separators or wildcards
    name.chars()
        .map(|c| match c {
            '/' | '+' | '#' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect::<String>()
}
