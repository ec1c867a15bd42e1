// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `wanderer-kills` binary and
//! exercise it over HTTP and WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use wanderer_specs::WandererProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Serves `body` as a `200 application/json` response to every request on a
/// fresh loopback port, looping until the test process exits. Good enough to
/// stand in for the upstream stream/ESI endpoints a smoke test points at.
async fn spawn_mock_json_server(body: String) -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                // Don't care about the request beyond draining it off the wire.
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    Ok(format!("http://{addr}"))
}

fn sample_stream_package(killmail_id: u64, system_id: u64, character_id: u64) -> String {
    serde_json::json!({
        "package": {
            "killID": killmail_id,
            "killmail": {
                "killmail_id": killmail_id,
                "killmail_time": wanderer_core::time::format_rfc3339(wanderer_core::time::now_secs() - 30),
                "solar_system_id": system_id,
                "victim": {"character_id": 9999, "ship_type_id": 587, "damage_taken": 100},
                "attackers": [{"character_id": character_id, "damage_done": 100, "final_blow": true}],
            },
            "zkb": {
                "hash": "deadbeef",
                "fittedValue": 1000.0,
                "totalValue": 1000.0,
                "points": 1,
                "npc": false,
                "solo": false,
                "awox": false,
            },
        }
    })
    .to_string()
}

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let wanderer = WandererProcess::start()?;
    wanderer.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value = reqwest::get(format!("{}/health", wanderer.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "running");
    assert!(resp["timestamp"].is_string());
    assert!(resp["gc_alive"].is_boolean());

    Ok(())
}

#[tokio::test]
async fn kills_count_for_unknown_system_is_zero() -> anyhow::Result<()> {
    let wanderer = WandererProcess::start()?;
    wanderer.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/v1/kills/count/30000142", wanderer.base_url())).await?.json().await?;
    assert_eq!(resp["count"], 0);

    Ok(())
}

#[tokio::test]
async fn killmail_by_id_404s_when_absent() -> anyhow::Result<()> {
    let wanderer = WandererProcess::start()?;
    wanderer.wait_healthy(TIMEOUT).await?;

    let resp = reqwest::get(format!("{}/api/v1/killmail/1", wanderer.base_url())).await?;
    assert_eq!(resp.status().as_u16(), 404);

    Ok(())
}

#[tokio::test]
async fn subscription_create_then_delete_roundtrips() -> anyhow::Result<()> {
    let wanderer = WandererProcess::start()?;
    wanderer.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let create: serde_json::Value = client
        .post(format!("{}/api/v1/subscriptions", wanderer.base_url()))
        .json(&serde_json::json!({"subscriber_id": "sub-a", "system_ids": [30000142]}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(create["status"], "active");
    assert!(create["subscription_id"].is_string());

    let delete: serde_json::Value = client
        .delete(format!("{}/api/v1/subscriptions/sub-a", wanderer.base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(delete["status"], "deleted");

    Ok(())
}

#[tokio::test]
async fn subscription_with_no_filters_is_rejected() -> anyhow::Result<()> {
    let wanderer = WandererProcess::start()?;
    wanderer.wait_healthy(TIMEOUT).await?;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/subscriptions", wanderer.base_url()))
        .json(&serde_json::json!({"subscriber_id": "sub-a"}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 400);

    Ok(())
}

#[tokio::test]
async fn ws_delivers_a_killmail_ingested_from_the_stream() -> anyhow::Result<()> {
    let system_id = 30000142u64;
    let character_id = 95465499u64;
    let killmail_id = 100_000_001u64;

    let stream_url = spawn_mock_json_server(sample_stream_package(killmail_id, system_id, character_id)).await?;
    let wanderer = WandererProcess::build().stream_base_url(&format!("{stream_url}/listen.php")).spawn()?;
    wanderer.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let create: serde_json::Value = client
        .post(format!("{}/api/v1/subscriptions", wanderer.base_url()))
        .json(&serde_json::json!({"subscriber_id": "sub-a", "system_ids": [system_id]}))
        .send()
        .await?
        .json()
        .await?;
    let subscription_id = create["subscription_id"].as_str().expect("subscription id").to_owned();

    let ws_url = format!("ws://127.0.0.1:{}/ws/subscriber/sub-a", wanderer.port());
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url).await?;

    let msg = tokio::time::timeout(TIMEOUT, ws.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("websocket closed before a killmail arrived"))??;
    let text = match msg {
        Message::Text(t) => t.to_string(),
        other => anyhow::bail!("expected a text frame, got: {other:?}"),
    };
    let parsed: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(parsed["type"], "detailed_kill_update");
    assert_eq!(parsed["data"]["solar_system_id"], system_id);
    assert_eq!(parsed["data"]["kills"][0]["id"], killmail_id);
    assert_eq!(parsed["data"]["kills"][0]["system_id"], system_id);

    // The count endpoint reflects the same ingest the websocket just observed.
    let count: serde_json::Value =
        reqwest::get(format!("{}/api/v1/kills/count/{system_id}", wanderer.base_url())).await?.json().await?;
    assert_eq!(count["count"], 1);
    let _ = subscription_id;

    Ok(())
}
