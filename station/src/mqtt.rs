use crate::config::MqttConfig;
use crate::errors::{Error, Result};
use crate::model::ReadingSet;
use crate::transport::{Ack, Transport};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const LINK_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    device_id: &'a str,
    data: &'a ReadingSet,
}

/// Packet ids seen by the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkEvent {
    Published(u16),
    /// PubAck at QoS 1, PubComp at QoS 2
    Acked(u16),
}

/// Publishes reading sets to a broker topic
pub struct MqttTransport {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    retain: bool,
    device_id: String,
    target: String,
    timeout: Duration,
    connected: watch::Receiver<bool>,
    link_events: broadcast::Sender<LinkEvent>,
    // One publish in flight at a time, so the next outgoing packet id is ours
    in_flight: Mutex<()>,
    eventloop_handle: JoinHandle<()>,
}

impl MqttTransport {
    /// Must be called from within a tokio runtime; the event loop is
    /// driven by a background task for as long as the transport lives.
    pub fn connect(host: &str, config: &MqttConfig, device_id: &str) -> Result<Self> {
        let qos = qos_from_level(config.qos)?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let client_id = format!("{}-{}", device_id, &suffix[..8]);

        info!(
            "Connecting to MQTT broker at {}:{} as {}",
            host, config.port, client_id
        );

        let mut mqtt_options = MqttOptions::new(client_id, host, config.port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keepalive_secs.max(5)));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);
        let (connected_tx, connected) = watch::channel(false);
        let (link_events, _) = broadcast::channel(LINK_EVENT_CAPACITY);
        let events = link_events.clone();

        // rumqttc reconnects on the next poll, so just log and keep polling
        let eventloop_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        connected_tx.send_replace(true);
                    }
                    Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                        let _ = events.send(LinkEvent::Published(pkid));
                    }
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        let _ = events.send(LinkEvent::Acked(ack.pkid));
                    }
                    Ok(Event::Incoming(Packet::PubComp(comp))) => {
                        let _ = events.send(LinkEvent::Acked(comp.pkid));
                    }
                    Ok(notification) => debug!("MQTT event: {:?}", notification),
                    Err(e) => {
                        if connected_tx.send_replace(false) {
                            warn!("Lost connection to MQTT broker");
                        }
                        error!("MQTT eventloop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok(Self {
            client,
            topic: config.topic.clone(),
            qos,
            retain: config.retain,
            device_id: device_id.to_string(),
            target: format!("mqtt://{}:{}/{}", host, config.port, config.topic),
            timeout: config.timeout(),
            connected,
            link_events,
            in_flight: Mutex::new(()),
            eventloop_handle,
        })
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn wait_connected(&self) -> Result<()> {
        let mut connected = self.connected.clone();
        let waited = tokio::time::timeout(self.timeout, connected.wait_for(|up| *up))
            .await
            .map(|up| up.map(|_| ()));
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::Connect("MQTT event loop stopped".to_string())),
            Err(_) => Err(Error::Connect(format!(
                "not connected to broker at {}",
                self.target
            ))),
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.eventloop_handle.abort();
    }
}

impl Transport for MqttTransport {
    async fn send(&self, set: &ReadingSet) -> Result<Ack> {
        let payload = serde_json::to_vec(&Envelope {
            device_id: &self.device_id,
            data: set,
        })?;

        let _in_flight = self.in_flight.lock().await;
        self.wait_connected().await?;

        // Subscribe before publishing so the outgoing packet id is not missed
        let mut events = self.link_events.subscribe();
        self.client
            .publish(&self.topic, self.qos, self.retain, payload)
            .await?;

        if self.qos == QoS::AtMostOnce {
            debug!("Published reading set to {}", self.topic);
            return Ok(Ack::default());
        }

        let pkid = tokio::time::timeout(self.timeout, wait_for_ack(&mut events))
            .await
            .map_err(|_| Error::Timeout)??;

        debug!("Broker acknowledged reading set on {} (pkid {})", self.topic, pkid);
        Ok(Ack::default())
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// Resolves once the first publish seen is acknowledged
async fn wait_for_ack(events: &mut broadcast::Receiver<LinkEvent>) -> Result<u16> {
    let mut published = None;
    loop {
        match events.recv().await {
            Ok(LinkEvent::Published(pkid)) if published.is_none() => published = Some(pkid),
            Ok(LinkEvent::Acked(pkid)) if published == Some(pkid) => return Ok(pkid),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Missed {} MQTT link events", skipped),
            Err(RecvError::Closed) => {
                return Err(Error::Connect("MQTT event loop stopped".to_string()))
            }
        }
    }
}

fn qos_from_level(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(Error::Config(format!("invalid MQTT QoS {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSender;
    use crate::model::{Reading, SensorKind};
    use crate::shutdown::Shutdown;
    use crate::spill::SpillQueue;
    use crate::uplink::{DeliveryOutcome, RetryPolicy, UplinkClient};
    use chrono::Utc;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn unreachable_broker() -> MqttConfig {
        MqttConfig {
            port: closed_port(),
            timeout_secs: 1,
            ..MqttConfig::default()
        }
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos_from_level(3).is_err());
    }

    #[test]
    fn test_envelope_shape() {
        let set = ReadingSet::new(Utc::now(), vec![Reading::new(SensorKind::Light, 900.0)]);
        let json = serde_json::to_value(Envelope {
            device_id: "raspberry-pi-001",
            data: &set,
        })
        .unwrap();

        assert_eq!(json["device_id"], "raspberry-pi-001");
        assert_eq!(json["data"]["readings"][0]["value"], 900.0);
    }

    #[tokio::test]
    async fn test_send_without_broker_is_retryable_error() {
        let config = unreachable_broker();
        let transport = MqttTransport::connect("127.0.0.1", &config, "test-dev").unwrap();
        let set = ReadingSet::new(Utc::now(), Vec::new());

        let err = transport.send(&set).await.unwrap_err();

        assert!(matches!(err, Error::Connect(_)), "unexpected error {}", err);
        assert!(err.is_retryable());
        assert!(!transport.is_connected());
        assert_eq!(
            transport.target(),
            format!("mqtt://127.0.0.1:{}/sensor/data", config.port)
        );
    }

    #[tokio::test]
    async fn test_unreachable_broker_spills_set() {
        let transport =
            MqttTransport::connect("127.0.0.1", &unreachable_broker(), "test-dev").unwrap();
        let (_trigger, shutdown) = Shutdown::new();
        let mut client = UplinkClient::new(
            transport,
            SpillQueue::in_memory(),
            RetryPolicy::new(1),
            EventSender::disconnected(),
            shutdown,
        );

        let set = ReadingSet::new(Utc::now(), vec![Reading::new(SensorKind::Light, 900.0)]);
        let result = client.deliver(set).await;

        assert!(!result.success);
        assert_eq!(result.outcome, DeliveryOutcome::Spilled);
        assert_eq!(client.queue().len(), 1);
    }

    #[test]
    fn test_ack_must_match_published_packet() {
        tokio_test::block_on(async {
            let (tx, mut rx) = broadcast::channel(8);
            tx.send(LinkEvent::Acked(3)).unwrap();
            tx.send(LinkEvent::Published(7)).unwrap();
            tx.send(LinkEvent::Published(8)).unwrap();
            tx.send(LinkEvent::Acked(8)).unwrap();
            tx.send(LinkEvent::Acked(7)).unwrap();

            assert_eq!(wait_for_ack(&mut rx).await.unwrap(), 7);
        });
    }

    #[test]
    fn test_ack_wait_fails_when_event_loop_stops() {
        tokio_test::block_on(async {
            let (tx, mut rx) = broadcast::channel(8);
            tx.send(LinkEvent::Published(1)).unwrap();
            drop(tx);

            let err = wait_for_ack(&mut rx).await.unwrap_err();
            assert!(err.is_retryable());
        });
    }
}
