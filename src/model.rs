//! Model root: zones, transport, partitioner, configuration, lifecycle.
//!
//! A [`Model`] is one rank's view of the distributed mesh. It owns the
//! zones, the transport handle, the active [`Partitioner`] and its
//! parameters, the DFI configuration, and the library metadata written into
//! every container file.
//!
//! # Lifecycle
//!
//! ```text
//! Empty -> Loaded -> Rebuilt -> (partition) -> Rebuilt -> ... -> Disposed
//! ```
//!
//! Ingest and insertion move the model to `Loaded` (derived state invalid).
//! [`Model::rebuild`] reaches `Rebuilt`, the only state in which partition
//! and transfer may run; a partition internally rebuilds, so the model
//! returns to `Rebuilt` when it completes. Any structural write drops the
//! model back to `Loaded`. `Disposed` is terminal.

use crate::config::DfiConfig;
use crate::error::{ErrorKind, Result};
use crate::ids::{LocalId, RankNo};
use crate::migrate::{PartitionOutcome, partition_zone};
use crate::partitioner::{PartitionParams, Partitioner, RcbPartitioner};
use crate::rebuild::rebuild_zone;
use crate::transfer::{TransferStats, transfer_virtual_cells};
use crate::transport::Transport;
use crate::udm_error;
use crate::zone::Zone;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Lifecycle state of a model.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum ModelState {
    /// No mesh data yet.
    Empty,
    /// Mesh data present; incidence and ghost layer not valid.
    Loaded,
    /// Rebuild ran; incidence, connectivity and ghost layer valid.
    Rebuilt,
    /// Torn down; every operation is refused.
    Disposed,
}

/// Library metadata carried in every container file's `UdmInfo` block.
#[derive(Clone, Debug, Serialize)]
pub struct UdmInfo {
    /// Library version that wrote the data.
    pub version: String,
    /// Fixed descriptive text.
    pub description: String,
    /// Communicator size at write time.
    pub process_count: u32,
    /// Writing rank.
    pub rank: RankNo,
}

impl UdmInfo {
    fn new(process_count: u32, rank: RankNo) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "udmesh - distributed unstructured mesh management".to_string(),
            process_count,
            rank,
        }
    }

    /// The `[process-count, rank-number]` array written alongside the
    /// version.
    pub fn rank_info(&self) -> [u32; 2] {
        [self.process_count, self.rank]
    }
}

/// One rank's root object for a distributed mesh.
pub struct Model {
    zones: Vec<Zone>,
    transport: Arc<dyn Transport>,
    partitioner: Box<dyn Partitioner>,
    params: PartitionParams,
    config: DfiConfig,
    info: UdmInfo,
    state: ModelState,
}

impl Model {
    /// Create an empty model on the given transport, using the built-in
    /// coordinate bisector.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let info = UdmInfo::new(transport.world_size(), transport.rank());
        Self {
            zones: Vec::new(),
            transport,
            partitioner: Box::new(RcbPartitioner),
            params: PartitionParams::default(),
            config: DfiConfig::default(),
            info,
            state: ModelState::Empty,
        }
    }

    /// Replace the partitioner backend.
    #[must_use]
    pub fn with_partitioner(mut self, partitioner: Box<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    /// This rank's number.
    pub fn rank(&self) -> RankNo {
        self.transport.rank()
    }

    /// Communicator size.
    pub fn world_size(&self) -> u32 {
        self.transport.world_size()
    }

    /// Current lifecycle state. A structural write after a rebuild drops
    /// the model back to `Loaded` until the next rebuild; field-value
    /// writes do not.
    pub fn state(&self) -> ModelState {
        if self.state == ModelState::Rebuilt && self.zones.iter().any(|z| z.is_dirty()) {
            return ModelState::Loaded;
        }
        self.state
    }

    /// Library metadata.
    pub fn info(&self) -> &UdmInfo {
        &self.info
    }

    /// Partition parameters (method, approach, overrides, wire knobs).
    pub fn partition_params(&self) -> &PartitionParams {
        &self.params
    }

    /// Mutable partition parameters.
    pub fn partition_params_mut(&mut self) -> &mut PartitionParams {
        &mut self.params
    }

    /// The active configuration.
    pub fn config(&self) -> &DfiConfig {
        &self.config
    }

    /// Mutable configuration (units, time slices, solution seeds).
    pub fn config_mut(&mut self) -> &mut DfiConfig {
        &mut self.config
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state == ModelState::Disposed {
            return Err(udm_error!(
                ErrorKind::InvalidState,
                "the model has been disposed"
            ));
        }
        Ok(())
    }

    /// Load a DFI configuration file, seed zone registries from its
    /// solution list, and adopt its partition knobs.
    pub fn load_config(&mut self, path: &Path) -> Result<()> {
        self.ensure_live()?;
        let config = DfiConfig::load(path)?;
        self.params.set_debug_level(config.partition.debug_level);
        for zone in &mut self.zones {
            for solution in config.solution_configs() {
                zone.register_solution(solution);
            }
        }
        self.config = config;
        if self.state == ModelState::Empty && !self.zones.is_empty() {
            self.state = ModelState::Loaded;
        }
        Ok(())
    }

    /// Create a zone and return its id (1-based).
    pub fn create_zone(&mut self) -> Result<u32> {
        self.ensure_live()?;
        let id = self.zones.len() as u32 + 1;
        let mut zone = Zone::new(id, self.transport.rank());
        for solution in self.config.solution_configs() {
            zone.register_solution(solution);
        }
        self.zones.push(zone);
        self.state = ModelState::Loaded;
        Ok(id)
    }

    /// Number of zones.
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Read access to a zone.
    pub fn zone(&self, id: u32) -> Result<&Zone> {
        self.zones
            .get(id.wrapping_sub(1) as usize)
            .ok_or_else(|| udm_error!(ErrorKind::InvalidEntity, "no zone with id {id}"))
    }

    /// Write access to a zone. A structural write through it marks the
    /// zone dirty, which invalidates the rebuilt state; field-value writes
    /// leave it intact.
    pub fn zone_mut(&mut self, id: u32) -> Result<&mut Zone> {
        self.ensure_live()?;
        self.zones
            .get_mut(id.wrapping_sub(1) as usize)
            .ok_or_else(|| udm_error!(ErrorKind::InvalidEntity, "no zone with id {id}"))
    }

    /// Record a boundary-node twin on a zone.
    pub fn insert_rank_connectivity(
        &mut self,
        zone_id: u32,
        node: LocalId,
        peer: RankNo,
        peer_id: LocalId,
    ) -> Result<()> {
        self.zone_mut(zone_id)?
            .insert_rank_connectivity(node, peer, peer_id)
    }

    /// Rebuild every zone: dense ids, incidence, canonical connectivity,
    /// ghost halo. Collective.
    pub fn rebuild(&mut self) -> Result<()> {
        self.ensure_live()?;
        for zone in &mut self.zones {
            if zone.real_cell_count() == 0 {
                tracing::warn!(
                    rank = self.transport.rank(),
                    zone = zone.id(),
                    "rebuild on a zone without cells"
                );
            }
            rebuild_zone(zone, self.transport.as_ref(), &self.params.wire)?;
        }
        self.state = ModelState::Rebuilt;
        Ok(())
    }

    /// Repartition one zone and rebuild it for the new ownership.
    /// Collective; the model must be in the rebuilt state.
    pub fn partition(&mut self, zone_id: u32) -> Result<PartitionOutcome> {
        self.ensure_live()?;
        if self.state() != ModelState::Rebuilt {
            return Err(udm_error!(
                ErrorKind::InvalidState,
                "partition needs a rebuilt model, current state is {:?}",
                self.state()
            ));
        }
        let index = zone_id.wrapping_sub(1) as usize;
        let transport = Arc::clone(&self.transport);
        let zone = self
            .zones
            .get_mut(index)
            .ok_or_else(|| udm_error!(ErrorKind::InvalidEntity, "no zone with id {zone_id}"))?;
        partition_zone(
            zone,
            transport.as_ref(),
            self.partitioner.as_ref(),
            &self.params,
        )
    }

    /// Synchronize ghost-entity field values on every zone. Collective; the
    /// model must be in the rebuilt state.
    pub fn transfer_virtual_cells(&mut self) -> Result<Vec<TransferStats>> {
        self.ensure_live()?;
        if self.state() != ModelState::Rebuilt {
            return Err(udm_error!(
                ErrorKind::InvalidState,
                "transfer needs a rebuilt model, current state is {:?}",
                self.state()
            ));
        }
        let transport = Arc::clone(&self.transport);
        let mut stats = Vec::with_capacity(self.zones.len());
        for zone in &mut self.zones {
            stats.push(transfer_virtual_cells(zone, transport.as_ref())?);
        }
        Ok(stats)
    }

    /// Validate every zone's structure and pairwise rank connectivity.
    /// Collective; debug paths and tests only.
    pub fn debug_validate(&self) -> Result<()> {
        self.ensure_live()?;
        for zone in &self.zones {
            zone.debug_validate()?;
            crate::connectivity::validate_rank_connectivity(zone, self.transport.as_ref())?;
        }
        Ok(())
    }

    /// JSON summary of the model for logs and the staging `--view` trace.
    pub fn summary_json(&self) -> String {
        #[derive(Serialize)]
        struct ModelSummary<'a> {
            info: &'a UdmInfo,
            state: ModelState,
            zones: Vec<crate::zone::ZoneSummary>,
        }
        let summary = ModelSummary {
            info: &self.info,
            state: self.state,
            zones: self.zones.iter().map(|z| z.summary()).collect(),
        };
        serde_json::to_string_pretty(&summary).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }

    /// Tear the model down. Every zone and its entities are released; the
    /// model refuses further operations.
    pub fn dispose(&mut self) {
        self.zones.clear();
        self.state = ModelState::Disposed;
    }
}
