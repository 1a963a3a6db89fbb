use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::models::JobAction;
use crate::queue::JobQueue;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde_json::Value;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Maps an incoming topic to the job it carries.
pub fn action_for_topic(conf: &MqttConf, topic: &str) -> Option<JobAction> {
    if topic == conf.register_topic {
        Some(JobAction::Register)
    } else if topic == conf.unregister_topic {
        Some(JobAction::Unregister)
    } else {
        None
    }
}

/// Subscribes to both intake topics and feeds decoded payloads to the queue.
/// Broker errors are retried every 2s for the life of the process.
pub fn spawn_mqtt_listener(conf: MqttConf, queue: JobQueue, health: HealthTracker) -> JoinHandle<()> {
    task::spawn(async move {
        let mut opts = MqttOptions::new(conf.client_id.clone(), conf.host.clone(), conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        health.mark_mqtt_connecting();

        for topic in [&conf.register_topic, &conf.unregister_topic] {
            if let Err(e) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                error!(topic = %topic, error = ?e, "MQTT subscribe failed");
                return;
            }
        }
        info!(host = %conf.host, port = conf.port, "MQTT intake listening");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => health.mark_mqtt_connected(),
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let Some(action) = action_for_topic(&conf, &p.topic) else {
                        debug!(topic = %p.topic, "ignoring message on unrelated topic");
                        continue;
                    };
                    match serde_json::from_slice::<Value>(&p.payload) {
                        Ok(data) => {
                            if let Err(e) = queue.enqueue(action.to_string(), data) {
                                warn!(topic = %p.topic, error = %e, "dropping MQTT job");
                            }
                        }
                        Err(e) => warn!(topic = %p.topic, error = %e, "invalid JSON on intake topic"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = ?e, "MQTT error");
                    health.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_routing() {
        let conf: MqttConf = serde_yaml::from_str("host: localhost\nport: 1883\n").unwrap();
        assert_eq!(action_for_topic(&conf, "nagios/register@v1"), Some(JobAction::Register));
        assert_eq!(action_for_topic(&conf, "nagios/unregister@v1"), Some(JobAction::Unregister));
        assert_eq!(action_for_topic(&conf, "nagios/other"), None);
    }
}
