use crate::actuator::command::{CommandSink, SinkError, VehicleCommand};
use crate::config::ActuatorConfig;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Outstanding requests before try_publish starts rejecting
const REQUEST_CAPACITY: usize = 10;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Publishes vehicle commands to the actuator topic over MQTT
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
}

impl MqttSink {
    /// Creates the client and spawns the task driving its event loop.
    ///
    /// The connection is established lazily by the event loop; commands
    /// published before it is up are rejected and dropped.
    pub fn connect(config: &ActuatorConfig, cancel: CancellationToken) -> Self {
        info!(
            "Connecting actuator sink to {}:{} on topic {}",
            config.host, config.port, config.topic
        );

        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        tokio::spawn(drive_event_loop(eventloop, cancel));

        Self {
            client,
            topic: config.topic.clone(),
        }
    }
}

impl CommandSink for MqttSink {
    fn send(&mut self, command: &VehicleCommand) -> Result<(), SinkError> {
        let payload = command.to_json()?;
        self.client
            .try_publish(self.topic.clone(), QoS::AtMostOnce, false, payload)
            .map_err(|e| SinkError::Rejected(e.to_string()))
    }
}

async fn drive_event_loop(mut eventloop: EventLoop, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Actuator connection closed");
                return;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Actuator broker connected"),
                Ok(event) => debug!("MQTT event: {:?}", event),
                Err(e) => {
                    warn!("Actuator connection error: {}, retrying", e);
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            },
        }
    }
}
