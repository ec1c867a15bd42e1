// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Killmail publication to NATS, falling back to an in-process broadcast
//! channel when no NATS URL is configured (spec §4.7 step 4: "publication is
//! fire-and-forget; failures are logged, not retried").

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::model::Killmail;

/// JSON payload published to `{prefix}.killmails.{system_id}`.
#[derive(Debug, Serialize)]
struct KillmailPayload<'a> {
    killmail: &'a Killmail,
}

enum Transport {
    Nats(async_nats::Client),
    /// No NATS URL configured; killmails are republished in-process so
    /// local subscribers (and tests) still observe the fan-out.
    Local(broadcast::Sender<std::sync::Arc<Killmail>>),
}

/// Publishes enriched killmails to the pub/sub bus.
pub struct Bus {
    transport: Transport,
    prefix: String,
}

impl Bus {
    /// Connects to NATS at `url`, or builds an in-process fallback bus when
    /// `url` is `None`.
    pub async fn connect(url: Option<&str>, prefix: String) -> anyhow::Result<Self> {
        let transport = match url {
            Some(url) => {
                info!(%url, %prefix, "connecting pub/sub bus to NATS");
                let client = async_nats::ConnectOptions::new().retry_on_initial_connect().connect(url).await?;
                info!("pub/sub bus connected to NATS");
                Transport::Nats(client)
            }
            None => {
                debug!("no NATS url configured, using in-process pub/sub fallback");
                let (tx, _rx) = broadcast::channel(1024);
                Transport::Local(tx)
            }
        };
        Ok(Self { transport, prefix })
    }

    /// Subscribes to the in-process fallback bus. Only meaningful when no
    /// NATS url was configured; returns `None` otherwise since real NATS
    /// subscriptions go through `async_nats::Client` directly.
    pub fn subscribe_local(&self) -> Option<broadcast::Receiver<std::sync::Arc<Killmail>>> {
        match &self.transport {
            Transport::Local(tx) => Some(tx.subscribe()),
            Transport::Nats(_) => None,
        }
    }

    /// Publishes one killmail on every topic a fresh persist fans out to
    /// (spec §4.7 step 2): `kills:updated`, `system:{id}`,
    /// `system:{id}:detailed` unconditionally, plus `subscriber:{id}` for
    /// each matched subscription.
    pub async fn publish_killmail(&self, killmail: &std::sync::Arc<Killmail>, matched_subscribers: &[String]) {
        self.publish_topic("kills:updated", killmail).await;
        self.publish_topic(&format!("system:{}", killmail.system_id), killmail).await;
        self.publish_topic(&format!("system:{}:detailed", killmail.system_id), killmail).await;
        for subscriber_id in matched_subscribers {
            self.publish_topic(&format!("subscriber:{subscriber_id}"), killmail).await;
        }
    }

    /// Best-effort: a publish failure is logged and otherwise ignored, never
    /// propagated to the caller.
    async fn publish_topic(&self, topic: &str, killmail: &std::sync::Arc<Killmail>) {
        match &self.transport {
            Transport::Nats(client) => {
                let subject = format!("{}.{}", self.prefix, topic.replace(':', "."));
                let payload = KillmailPayload { killmail: killmail.as_ref() };
                match serde_json::to_vec(&payload) {
                    Ok(json) => {
                        if let Err(e) = client.publish(subject, json.into()).await {
                            warn!("pub/sub publish failed: {e}");
                        }
                    }
                    Err(e) => warn!("pub/sub payload serialization failed: {e}"),
                }
            }
            Transport::Local(tx) => {
                // No subscribers is not an error; it just means nothing is
                // listening on the in-process fallback yet.
                let _ = tx.send(std::sync::Arc::clone(killmail));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Participant, ZkbMeta};

    fn killmail() -> std::sync::Arc<Killmail> {
        std::sync::Arc::new(Killmail {
            id: 1,
            kill_time: 0,
            system_id: 30000142,
            victim: Participant { ship_type_id: Some(1), ..Default::default() },
            attackers: vec![Participant { final_blow: true, ..Default::default() }],
            zkb: ZkbMeta {
                hash: "h".into(),
                fitted_value: 0.0,
                total_value: 0.0,
                points: 0,
                npc: false,
                solo: false,
                awox: false,
                location_id: None,
            },
        })
    }

    #[tokio::test]
    async fn local_fallback_delivers_to_subscribers() {
        let bus = Bus::connect(None, "wanderer_kills".into()).await.expect("connects");
        let mut rx = bus.subscribe_local().expect("local transport");
        bus.publish_killmail(&killmail(), &["sub-a".to_owned()]).await;
        let received = rx.recv().await.expect("delivered");
        assert_eq!(received.id, 1);
    }

    #[tokio::test]
    async fn local_fallback_publish_with_no_subscribers_does_not_panic() {
        let bus = Bus::connect(None, "wanderer_kills".into()).await.expect("connects");
        bus.publish_killmail(&killmail(), &[]).await;
    }
}
