//! Per-vacuum refresh cycles and the consumer pull API
//!
//! The coordinator owns every registered vacuum's connector and runtime
//! state. Each refresh copies the latest status and error, decodes an
//! unconsumed map payload when one exists, and swaps the snapshot in only
//! on success. Consumers pull snapshots and status; an unavailable vacuum
//! answers with an error, never with silently stale data.

use crate::connector::{Connector, ConnectorHandle};
use crate::dispatch::{CommandDispatcher, CommandRequest, Destination};
use crate::error::{VacuumError, VacuumResult};
use crate::map::{MapDataBuilder, MapSnapshot, RoomNameStore};
use crate::protocol::VacuumIdentity;
use crate::registry::{CommandTarget, VacuumRegistry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Mutable per-vacuum state the refresh cycle maintains.
#[derive(Debug, Default)]
struct RuntimeState {
    status: Option<String>,
    error: Option<String>,
    snapshot: Option<Arc<MapSnapshot>>,
}

/// Status and error description together, as consumers poll them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReading {
    pub status: String,
    pub error: Option<String>,
}

/// One registered vacuum under coordination.
struct VacuumEntry {
    identity: VacuumIdentity,
    connector: Connector,
    reader: ConnectorHandle,
    builder: MapDataBuilder,
    state: Arc<RwLock<RuntimeState>>,
    /// Single-flight gate: one decode per vacuum at a time.
    refresh_gate: Arc<tokio::sync::Mutex<()>>,
    decode_count: Arc<AtomicU64>,
}

/// Coordinates every registered vacuum.
pub struct Coordinator {
    registry: Arc<dyn VacuumRegistry>,
    dispatcher: CommandDispatcher,
    vacuums: HashMap<String, VacuumEntry>,
    room_names: Option<Arc<dyn RoomNameStore>>,
}

impl Coordinator {
    pub fn new(registry: Arc<dyn VacuumRegistry>) -> Self {
        let dispatcher = CommandDispatcher::new(registry.clone());
        Self {
            registry,
            dispatcher,
            vacuums: HashMap::new(),
            room_names: None,
        }
    }

    /// Inject a room display-name store. Overrides apply to every snapshot
    /// decoded from then on.
    pub fn set_room_name_store(&mut self, store: Arc<dyn RoomNameStore>) {
        self.room_names = Some(store);
    }

    pub fn registry(&self) -> &Arc<dyn VacuumRegistry> {
        &self.registry
    }

    /// Register a vacuum's connector under a name.
    pub fn insert(&mut self, name: impl Into<String>, connector: Connector) {
        let name = name.into();
        let identity = connector.identity().clone();
        let reader = connector.handle();
        let builder = MapDataBuilder::new(identity.firmware);
        info!(vacuum = %name, entity_id = %identity.entity_id, firmware = ?identity.firmware, "registered vacuum");
        self.vacuums.insert(
            name,
            VacuumEntry {
                identity,
                connector,
                reader,
                builder,
                state: Arc::new(RwLock::new(RuntimeState::default())),
                refresh_gate: Arc::new(tokio::sync::Mutex::new(())),
                decode_count: Arc::new(AtomicU64::new(0)),
            },
        );
    }

    /// Names of every registered vacuum, unordered.
    pub fn vacuum_names(&self) -> Vec<String> {
        self.vacuums.keys().cloned().collect()
    }

    /// Start every connector.
    pub fn start_all(&mut self) -> VacuumResult<()> {
        for (name, entry) in &mut self.vacuums {
            debug!(vacuum = %name, "starting connector");
            entry.connector.start()?;
        }
        Ok(())
    }

    /// Stop every connector.
    pub async fn stop_all(&mut self) -> VacuumResult<()> {
        for (name, entry) in &mut self.vacuums {
            debug!(vacuum = %name, "stopping connector");
            entry.connector.stop().await?;
        }
        Ok(())
    }

    fn entry(&self, name: &str) -> VacuumResult<&VacuumEntry> {
        self.vacuums
            .get(name)
            .ok_or_else(|| VacuumError::not_found(name))
    }

    /// Run one refresh cycle for a vacuum.
    ///
    /// Refreshes are single-flight per vacuum: a cycle that finds another
    /// one in progress returns immediately as a no-op rather than queueing
    /// a duplicate decode. A failed decode logs and keeps the previous
    /// snapshot; it never propagates as a hard error.
    pub async fn refresh(&self, name: &str) -> VacuumResult<()> {
        let entry = self.entry(name)?;

        let Ok(_guard) = entry.refresh_gate.try_lock() else {
            debug!(vacuum = %name, "refresh already in flight, coalescing");
            return Ok(());
        };

        let status = entry.reader.latest_status();
        let error = entry.reader.latest_error();
        {
            let mut state = entry
                .state
                .write()
                .map_err(|_| VacuumError::unavailable(name))?;
            state.status = status;
            state.error = error;
        }

        let Some(payload) = entry.reader.take_map_payload() else {
            return Ok(());
        };

        entry.decode_count.fetch_add(1, Ordering::Relaxed);
        match entry.builder.build(&payload) {
            Ok(mut snapshot) => {
                if let Some(store) = &self.room_names {
                    let vacuum_id = entry.identity.unique_id();
                    for room in &mut snapshot.rooms {
                        if let Some(name) = store.room_name(&vacuum_id, &room.id) {
                            room.name = name;
                        }
                    }
                }
                let snapshot = Arc::new(snapshot);
                let mut state = entry
                    .state
                    .write()
                    .map_err(|_| VacuumError::unavailable(name))?;
                state.snapshot = Some(snapshot);
                debug!(vacuum = %name, bytes = payload.len(), "map snapshot replaced");
            }
            Err(e) => {
                warn!(
                    vacuum = %name,
                    kind = e.kind(),
                    error = %e,
                    "map decode failed, keeping previous snapshot"
                );
            }
        }
        Ok(())
    }

    /// Whether the vacuum is currently answering consumer reads: its
    /// session is subscribed and at least one reading arrived on the
    /// current connection.
    pub fn is_available(&self, name: &str) -> bool {
        self.vacuums
            .get(name)
            .map(|entry| entry.reader.is_subscribed() && entry.reader.has_reading_since_connect())
            .unwrap_or(false)
    }

    /// Latest decoded snapshot.
    pub fn current_snapshot(&self, name: &str) -> VacuumResult<Arc<MapSnapshot>> {
        let entry = self.entry(name)?;
        if !self.is_available(name) {
            return Err(VacuumError::unavailable(name));
        }
        let state = entry
            .state
            .read()
            .map_err(|_| VacuumError::unavailable(name))?;
        state
            .snapshot
            .clone()
            .ok_or_else(|| VacuumError::unavailable(name))
    }

    /// Latest status string.
    pub fn current_status(&self, name: &str) -> VacuumResult<String> {
        let entry = self.entry(name)?;
        if !self.is_available(name) {
            return Err(VacuumError::unavailable(name));
        }
        let state = entry
            .state
            .read()
            .map_err(|_| VacuumError::unavailable(name))?;
        state
            .status
            .clone()
            .ok_or_else(|| VacuumError::unavailable(name))
    }

    /// Status and error description in one read.
    pub fn current_reading(&self, name: &str) -> VacuumResult<StatusReading> {
        let status = self.current_status(name)?;
        let error = self.current_error(name)?;
        Ok(StatusReading { status, error })
    }

    /// Latest error description, if one is cached. Does not require
    /// availability: a stale error string is still worth surfacing.
    pub fn current_error(&self, name: &str) -> VacuumResult<Option<String>> {
        let entry = self.entry(name)?;
        let state = entry
            .state
            .read()
            .map_err(|_| VacuumError::unavailable(name))?;
        Ok(state.error.clone())
    }

    /// Build and publish a go-to command. The payload is published QoS 1,
    /// not retained, through the target vacuum's own connector.
    pub async fn send_go_to(
        &self,
        target: &CommandTarget,
        destination: &Destination,
    ) -> VacuumResult<CommandRequest> {
        let request = self.dispatcher.go_to(target, destination)?;

        let entry = self
            .vacuums
            .values()
            .find(|entry| entry.identity.entity_id == request.identity.entity_id)
            .ok_or_else(|| VacuumError::not_found(request.identity.entity_id.clone()))?;

        let payload = serde_json::to_vec(&request.payload)
            .map_err(crate::transport::mqtt::MqttError::Serialization)
            .map_err(VacuumError::Transport)?;
        entry.connector.publish(&request.topic, payload, false).await?;

        info!(
            entity_id = %request.identity.entity_id,
            topic = %request.topic,
            "dispatched go-to command"
        );
        Ok(request)
    }

    /// Connector of a registered vacuum.
    pub fn connector(&self, name: &str) -> Option<&Connector> {
        self.vacuums.get(name).map(|entry| &entry.connector)
    }

    /// Number of map decodes attempted for a vacuum.
    pub fn decode_count(&self, name: &str) -> u64 {
        self.vacuums
            .get(name)
            .map(|entry| entry.decode_count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;

    #[test]
    fn unknown_vacuum_lookups_fail() {
        let coordinator = Coordinator::new(Arc::new(InMemoryRegistry::default()));
        assert!(matches!(
            coordinator.current_snapshot("ghost"),
            Err(VacuumError::NotFound(_))
        ));
        assert!(matches!(
            coordinator.current_status("ghost"),
            Err(VacuumError::NotFound(_))
        ));
        assert!(!coordinator.is_available("ghost"));
        assert_eq!(coordinator.decode_count("ghost"), 0);
    }

    #[tokio::test]
    async fn refresh_on_unknown_vacuum_fails() {
        let coordinator = Coordinator::new(Arc::new(InMemoryRegistry::default()));
        assert!(matches!(
            coordinator.refresh("ghost").await,
            Err(VacuumError::NotFound(_))
        ));
    }
}
