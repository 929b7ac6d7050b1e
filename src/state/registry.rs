//! Connection registry: the single console slot and the buzzer peer map.

use std::sync::{
    Arc, Mutex, RwLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::dto::ws::BuzzerInfo;

/// Close code sent when a transport never identifies itself.
pub const CLOSE_IDENTIFICATION_TIMEOUT: u16 = 4001;
/// Close code sent when a buzzer ID is already registered.
pub const CLOSE_DUPLICATE_BUZZER: u16 = 4002;
/// Close code sent when the console force-disconnects a buzzer.
pub const CLOSE_ADMIN_DISCONNECT: u16 = 4003;

/// Device-reported readings cached for the console list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Telemetry {
    pub battery: Option<u8>,
    pub wifi_rssi: Option<i32>,
    pub free_heap: Option<u32>,
    /// Half round-trip measured by the heartbeat, ms.
    pub latency_ms: Option<u32>,
}

/// Handle used to push frames to the control console.
pub struct ConsolePeer {
    pub session_id: String,
    pub tx: mpsc::UnboundedSender<Message>,
    alive: AtomicBool,
}

impl ConsolePeer {
    pub fn new(session_id: String, tx: mpsc::UnboundedSender<Message>) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            tx,
            alive: AtomicBool::new(true),
        })
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Clear the liveness flag, returning whether the peer was alive.
    pub fn clear_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }
}

/// One registered buzzer device.
#[derive(Debug)]
pub struct BuzzerPeer {
    pub id: String,
    pub mac_address: Option<String>,
    /// 1-based connection order, used as the default player slot.
    pub player_number: u32,
    /// Registration instant, ms since epoch.
    pub connected_at: u64,
    pub tx: mpsc::UnboundedSender<Message>,
    name: RwLock<String>,
    alive: AtomicBool,
    last_pong_ms: AtomicU64,
    telemetry: Mutex<Telemetry>,
}

impl BuzzerPeer {
    pub fn name(&self) -> String {
        self.name.read().expect("buzzer name lock poisoned").clone()
    }

    pub fn set_name(&self, name: String) {
        *self.name.write().expect("buzzer name lock poisoned") = name;
    }

    pub fn mark_alive(&self, now_ms: u64) {
        self.alive.store(true, Ordering::SeqCst);
        self.last_pong_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Clear the liveness flag, returning whether the peer was alive.
    pub fn clear_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    pub fn last_pong_ms(&self) -> u64 {
        self.last_pong_ms.load(Ordering::SeqCst)
    }

    pub fn telemetry(&self) -> Telemetry {
        *self.telemetry.lock().expect("telemetry lock poisoned")
    }

    pub fn update_status(&self, battery: Option<u8>, wifi_rssi: Option<i32>, free_heap: Option<u32>) {
        let mut telemetry = self.telemetry.lock().expect("telemetry lock poisoned");
        telemetry.battery = battery.or(telemetry.battery);
        telemetry.wifi_rssi = wifi_rssi.or(telemetry.wifi_rssi);
        telemetry.free_heap = free_heap.or(telemetry.free_heap);
    }

    pub fn update_latency(&self, latency_ms: u32) {
        self.telemetry
            .lock()
            .expect("telemetry lock poisoned")
            .latency_ms = Some(latency_ms);
    }

    /// Snapshot for `BUZZER_LIST_UPDATE` and `BUZZER_CONNECTED` payloads.
    pub fn info(&self) -> BuzzerInfo {
        let telemetry = self.telemetry();
        BuzzerInfo {
            id: self.id.clone(),
            name: self.name(),
            connected_at: self.connected_at,
            battery: telemetry.battery,
            wifi_rssi: telemetry.wifi_rssi,
            latency: telemetry.latency_ms,
            connected: true,
        }
    }

    /// Queue a close frame with the given application code.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.tx.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })));
    }
}

/// Outcome of a registration attempt.
#[derive(Debug)]
pub enum RegisterOutcome {
    Registered(Arc<BuzzerPeer>),
    /// The ID is already present (close with 4002).
    Duplicate,
    /// The registry is at the configured capacity.
    Full,
}

/// Tracks the two classes of peers. One console at most, buzzers keyed by ID.
pub struct ConnectionRegistry {
    console: RwLock<Option<Arc<ConsolePeer>>>,
    buzzers: DashMap<String, Arc<BuzzerPeer>>,
    max_buzzers: usize,
    /// Serializes registration so player numbers follow connection order.
    registration_gate: Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new(max_buzzers: usize) -> Self {
        Self {
            console: RwLock::new(None),
            buzzers: DashMap::new(),
            max_buzzers,
            registration_gate: Mutex::new(()),
        }
    }

    /// Install the console peer, returning the replaced one if any.
    ///
    /// Last writer wins: a reconnecting console displaces the previous
    /// registration.
    pub fn set_console(&self, console: Arc<ConsolePeer>) -> Option<Arc<ConsolePeer>> {
        let mut slot = self.console.write().expect("console lock poisoned");
        slot.replace(console)
    }

    pub fn console(&self) -> Option<Arc<ConsolePeer>> {
        self.console
            .read()
            .expect("console lock poisoned")
            .as_ref()
            .cloned()
    }

    /// Clear the console slot only if it still holds the given session.
    pub fn clear_console(&self, session_id: &str) {
        let mut slot = self.console.write().expect("console lock poisoned");
        if slot
            .as_ref()
            .is_some_and(|current| current.session_id == session_id)
        {
            slot.take();
        }
    }

    /// Register a buzzer, enforcing ID uniqueness and the capacity cap.
    pub fn register_buzzer(
        &self,
        id: String,
        mac_address: Option<String>,
        name: Option<String>,
        tx: mpsc::UnboundedSender<Message>,
        now_ms: u64,
    ) -> RegisterOutcome {
        let _gate = self
            .registration_gate
            .lock()
            .expect("registration gate poisoned");

        if self.buzzers.contains_key(&id) {
            return RegisterOutcome::Duplicate;
        }
        if self.buzzers.len() >= self.max_buzzers {
            warn!(buzzer_id = %id, max = self.max_buzzers, "registry full, rejecting buzzer");
            return RegisterOutcome::Full;
        }

        let player_number = self.buzzers.len() as u32 + 1;
        let peer = Arc::new(BuzzerPeer {
            name: RwLock::new(name.unwrap_or_else(|| format!("Buzzer {player_number}"))),
            id: id.clone(),
            mac_address,
            player_number,
            connected_at: now_ms,
            tx,
            alive: AtomicBool::new(true),
            last_pong_ms: AtomicU64::new(now_ms),
            telemetry: Mutex::new(Telemetry::default()),
        });
        self.buzzers.insert(id, peer.clone());
        RegisterOutcome::Registered(peer)
    }

    /// Remove a buzzer only if the map still holds this exact peer.
    ///
    /// The heartbeat sweep and the socket teardown can both try to remove the
    /// same registration; identity comparison keeps a reconnected peer safe.
    pub fn remove_buzzer(&self, peer: &Arc<BuzzerPeer>) -> bool {
        self.buzzers
            .remove_if(&peer.id, |_, current| Arc::ptr_eq(current, peer))
            .is_some()
    }

    /// Remove a buzzer by ID regardless of which registration holds it.
    pub fn remove_buzzer_by_id(&self, id: &str) -> Option<Arc<BuzzerPeer>> {
        self.buzzers.remove(id).map(|(_, peer)| peer)
    }

    pub fn buzzer(&self, id: &str) -> Option<Arc<BuzzerPeer>> {
        self.buzzers.get(id).map(|entry| entry.value().clone())
    }

    pub fn buzzer_count(&self) -> usize {
        self.buzzers.len()
    }

    /// Snapshot of connected buzzers ordered by player number.
    pub fn buzzers_snapshot(&self) -> Vec<Arc<BuzzerPeer>> {
        let mut peers: Vec<Arc<BuzzerPeer>> = self
            .buzzers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        peers.sort_by_key(|peer| peer.player_number);
        peers
    }
}
