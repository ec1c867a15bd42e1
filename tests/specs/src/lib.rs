// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `wanderer-kills` binary as a subprocess and exercises it
//! over HTTP and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times — only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `wanderer-kills` binary.
pub fn wanderer_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("wanderer-kills")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Builder for configuring a [`WandererProcess`]'s upstream URLs before
/// spawning it. Upstream bases default to loopback addresses nothing is
/// listening on, so the ingestor/ESI resolver fail fast instead of reaching
/// the real internet during a smoke test.
pub struct WandererBuilder {
    stream_base_url: String,
    esi_base_url: String,
    zkb_base_url: String,
    ship_types_dir: Option<PathBuf>,
}

impl Default for WandererBuilder {
    fn default() -> Self {
        Self {
            stream_base_url: "http://127.0.0.1:1/listen.php".to_owned(),
            esi_base_url: "http://127.0.0.1:1/latest".to_owned(),
            zkb_base_url: "http://127.0.0.1:1/api".to_owned(),
            ship_types_dir: None,
        }
    }
}

impl WandererBuilder {
    pub fn stream_base_url(mut self, url: &str) -> Self {
        self.stream_base_url = url.to_owned();
        self
    }

    pub fn esi_base_url(mut self, url: &str) -> Self {
        self.esi_base_url = url.to_owned();
        self
    }

    pub fn zkb_base_url(mut self, url: &str) -> Self {
        self.zkb_base_url = url.to_owned();
        self
    }

    pub fn ship_types_dir(mut self, dir: PathBuf) -> Self {
        self.ship_types_dir = Some(dir);
        self
    }

    pub fn spawn(self) -> anyhow::Result<WandererProcess> {
        ensure_crypto();
        let binary = wanderer_binary();
        anyhow::ensure!(binary.exists(), "wanderer-kills binary not found at {}", binary.display());

        let port = free_port()?;
        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--stream-base-url".into(),
            self.stream_base_url,
            "--esi-base-url".into(),
            self.esi_base_url,
            "--zkb-base-url".into(),
            self.zkb_base_url,
            // Fast intervals keep smoke tests from waiting on the default
            // 5s idle poll before the ingestor's first tick.
            "--idle-interval-ms".into(),
            "200".into(),
            "--fast-interval-ms".into(),
            "50".into(),
            "--cache-gc-interval-ms".into(),
            "500".into(),
        ];
        if let Some(dir) = self.ship_types_dir {
            args.extend(["--ship-types-dir".into(), dir.to_string_lossy().into_owned()]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(WandererProcess { child, port })
    }
}

/// A running `wanderer-kills` process that is killed on drop.
pub struct WandererProcess {
    child: Child,
    port: u16,
}

impl WandererProcess {
    pub fn build() -> WandererBuilder {
        WandererBuilder::default()
    }

    /// Spawn with every upstream base pointed at an address nothing answers.
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, subscriber_id: &str) -> String {
        format!("ws://127.0.0.1:{}/ws/subscriber/{}", self.port, subscriber_id)
    }

    /// Poll `/health` until it answers 200.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("wanderer-kills did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for WandererProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
