//! Capture hooks to the web viewer / map uploader (spec.md §6.5): a
//! synchronous interface the core calls on every command, packet, and
//! topology update, plus the two implementations that consume it — a
//! local `packet_stream` writer and a best-effort HTTP forwarder
//! (SPEC_FULL.md §A.6 "the map-uploader/web-viewer capture contract is
//! HTTP, keep-alive, best-effort").

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::message::MeshMessage;
use crate::store::Store;

/// The shared capability set every capture sink implements (spec.md
/// §6.5, §9 "Capture targets share {capture_command,
/// capture_full_packet_data, capture_packet_routing,
/// send_mesh_node_update, send_mesh_edge_update}"). Every method is
/// synchronous and infallible by design: a viewer being unreachable
/// must never block or fail the core (spec.md §7 "Propagation").
pub trait CaptureTarget: Send + Sync {
    fn capture_command(&self, message: &MeshMessage, command_name: &str, response: &str, success: bool, command_id: &str);
    fn capture_full_packet_data(&self, packet_json: &str, raw_hex: &str, packet_hash: &str);
    fn capture_packet_routing(&self, routing_json: &str);
    fn send_mesh_node_update(&self, node_json: &str);
    fn send_mesh_edge_update(&self, edge_json: &str);
}

/// Writes every capture event into the local `packet_stream` table
/// (spec.md §6.4 "the capture stream consumed by the web viewer").
/// Node/edge updates are not packet_stream rows — they're the mesh
/// graph itself (already persisted by [`crate::topology::Topology`]) —
/// so this target only logs them at `debug` for local visibility.
pub struct StoreCaptureTarget {
    store: Arc<Store>,
}

impl StoreCaptureTarget {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn now(&self) -> i64 {
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
    }
}

impl CaptureTarget for StoreCaptureTarget {
    fn capture_command(&self, message: &MeshMessage, command_name: &str, response: &str, success: bool, command_id: &str) {
        let payload = serde_json::json!({
            "command_id": command_id,
            "command_name": command_name,
            "sender_id": message.sender_id,
            "channel": message.channel,
            "response": response,
            "success": success,
        });
        if let Err(e) = self.store.append_packet_stream(self.now(), &payload.to_string(), "command") {
            warn!(error = %e, "failed to append command to packet_stream");
        }
    }

    fn capture_full_packet_data(&self, packet_json: &str, _raw_hex: &str, _packet_hash: &str) {
        if let Err(e) = self.store.append_packet_stream(self.now(), packet_json, "packet") {
            warn!(error = %e, "failed to append packet to packet_stream");
        }
    }

    fn capture_packet_routing(&self, routing_json: &str) {
        if let Err(e) = self.store.append_packet_stream(self.now(), routing_json, "routing") {
            warn!(error = %e, "failed to append routing to packet_stream");
        }
    }

    fn send_mesh_node_update(&self, node_json: &str) {
        tracing::debug!(node = node_json, "mesh node update");
    }

    fn send_mesh_edge_update(&self, edge_json: &str) {
        tracing::debug!(edge = edge_json, "mesh edge update");
    }
}

/// Forwards every capture event as a JSON POST to a configured base
/// URL, over a pooled keep-alive client with a short timeout
/// (SPEC_FULL.md §A.6). Every send is fire-and-forget on the current
/// Tokio runtime: failures are logged and never returned to the
/// caller.
pub struct HttpCaptureTarget {
    client: reqwest::Client,
    base_url: String,
}

const HTTP_CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

impl HttpCaptureTarget {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_CAPTURE_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url: base_url.into() }
    }

    fn post(&self, path: &'static str, body: serde_json::Value) {
        let client = self.client.clone();
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&body).send().await {
                warn!(url, error = %e, "capture viewer unreachable, dropping event");
            }
        });
    }
}

impl CaptureTarget for HttpCaptureTarget {
    fn capture_command(&self, message: &MeshMessage, command_name: &str, response: &str, success: bool, command_id: &str) {
        self.post(
            "command",
            serde_json::json!({
                "command_id": command_id,
                "command_name": command_name,
                "sender_id": message.sender_id,
                "channel": message.channel,
                "response": response,
                "success": success,
            }),
        );
    }

    fn capture_full_packet_data(&self, packet_json: &str, raw_hex: &str, packet_hash: &str) {
        self.post("packet", serde_json::json!({ "packet": packet_json, "raw_hex": raw_hex, "packet_hash": packet_hash }));
    }

    fn capture_packet_routing(&self, routing_json: &str) {
        self.post("routing", serde_json::json!({ "routing": routing_json }));
    }

    fn send_mesh_node_update(&self, node_json: &str) {
        self.post("node", serde_json::json!({ "node": node_json }));
    }

    fn send_mesh_edge_update(&self, edge_json: &str) {
        self.post("edge", serde_json::json!({ "edge": edge_json }));
    }
}

/// A no-op target for configurations with no web viewer / map uploader
/// configured.
pub struct NullCaptureTarget;

impl CaptureTarget for NullCaptureTarget {
    fn capture_command(&self, _message: &MeshMessage, _command_name: &str, _response: &str, _success: bool, _command_id: &str) {}
    fn capture_full_packet_data(&self, _packet_json: &str, _raw_hex: &str, _packet_hash: &str) {}
    fn capture_packet_routing(&self, _routing_json: &str) {}
    fn send_mesh_node_update(&self, _node_json: &str) {}
    fn send_mesh_edge_update(&self, _edge_json: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MeshMessage {
        MeshMessage {
            content: "ping".to_string(),
            sender_id: "Alice".to_string(),
            sender_pubkey: None,
            channel: None,
            is_dm: true,
            timestamp: 0,
            snr: None,
            rssi: None,
            hops: None,
            path: String::new(),
            elapsed: String::new(),
        }
    }

    #[test]
    fn store_target_writes_a_command_row() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let target = StoreCaptureTarget::new(store.clone());
        target.capture_command(&message(), "ping", "Pong!", true, "cmd-1");
        assert!(store.find_packet_stream_row_by_command_id("cmd-1").unwrap().is_some());
    }

    #[test]
    fn null_target_never_panics() {
        let target = NullCaptureTarget;
        target.capture_command(&message(), "ping", "Pong!", true, "cmd-1");
        target.send_mesh_node_update("{}");
    }
}
