//! Rank-local mesh zone: node and cell tables, sections, and field storage.
//!
//! A [`Zone`] owns dense arrays of [`Node`]s and [`Cell`]s indexed by their
//! 1-based local id, a section table grouping cells by element kind, the
//! solution registry and stores, and the rank-connectivity index for its
//! boundary nodes. Entities are *real* (owned by this rank, authoritative)
//! or *virtual* (read-only ghost copies of peer-rank entities appended after
//! the real ones by halo construction).
//!
//! Structural mutations (inserting nodes/cells, moving coordinates, pairing
//! boundary nodes) mark the zone dirty; derived state -- incidence tables,
//! canonical connectivity, the ghost layer and its exchange plans -- is only
//! valid again after the next rebuild.

use crate::connectivity::{HaloPlans, RankConnectivity};
use crate::element::ElementKind;
use crate::error::{ErrorKind, Result};
use crate::ids::{GlobalId, LocalId, RankNo};
use crate::naming;
use crate::solution::{
    DataType, GridLocation, SolutionConfig, SolutionRegistry, SolutionStore, SolutionValue,
};
use crate::udm_error;
use serde::Serialize;
use std::collections::HashMap;

/// Whether an entity is owned by this rank or ghosted from a peer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reality {
    /// Owned by this rank; authoritative for its field values.
    Real,
    /// Read-only ghost copy of a peer-rank entity.
    Virtual,
}

/// A geometric point of the mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub(crate) id: LocalId,
    pub(crate) global_id: GlobalId,
    pub(crate) coords: [f64; 3],
    pub(crate) reality: Reality,
    /// Incident cells, rebuilt by incidence derivation.
    pub(crate) cells: Vec<LocalId>,
    /// Neighbour nodes (union over incident cells, deduplicated, sorted).
    pub(crate) neighbours: Vec<LocalId>,
    /// Identity tokens: every global id this node has been known by across
    /// migrations and pairings. Compared only for equality.
    pub(crate) tokens: Vec<GlobalId>,
}

impl Node {
    /// Local id within the zone.
    pub fn id(&self) -> LocalId {
        self.id
    }

    /// Global `(owning rank, owner-local id)` identifier.
    pub fn global_id(&self) -> GlobalId {
        self.global_id
    }

    /// Coordinates.
    pub fn coordinates(&self) -> [f64; 3] {
        self.coords
    }

    /// Real or virtual.
    pub fn reality(&self) -> Reality {
        self.reality
    }

    /// True for ghost copies of peer-rank nodes.
    pub fn is_virtual(&self) -> bool {
        self.reality == Reality::Virtual
    }

    /// Cells incident to this node. Valid after a rebuild.
    pub fn incident_cells(&self) -> &[LocalId] {
        &self.cells
    }

    /// Neighbouring nodes. Valid after a rebuild.
    pub fn neighbour_nodes(&self) -> &[LocalId] {
        &self.neighbours
    }
}

/// A polytope of one element kind.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub(crate) id: LocalId,
    pub(crate) global_id: GlobalId,
    pub(crate) kind: ElementKind,
    pub(crate) nodes: Vec<LocalId>,
    pub(crate) reality: Reality,
    pub(crate) weight: Option<f32>,
    pub(crate) removed: bool,
}

impl Cell {
    /// Local id within the zone.
    pub fn id(&self) -> LocalId {
        self.id
    }

    /// Global `(owning rank, owner-local id)` identifier.
    pub fn global_id(&self) -> GlobalId {
        self.global_id
    }

    /// Element kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Ordered node list.
    pub fn node_ids(&self) -> &[LocalId] {
        &self.nodes
    }

    /// Real or virtual.
    pub fn reality(&self) -> Reality {
        self.reality
    }

    /// True for ghost copies of peer-rank cells.
    pub fn is_virtual(&self) -> bool {
        self.reality == Reality::Virtual
    }

    /// Partition weight; 1.0 unless set explicitly.
    pub fn weight(&self) -> f32 {
        self.weight.unwrap_or(1.0)
    }
}

/// A run of cells within a zone.
///
/// Homogeneous sections hold one element kind; a [`ElementKind::Mixed`]
/// section holds cells of several kinds, each cell carrying its own kind.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub(crate) kind: ElementKind,
    pub(crate) name: String,
    pub(crate) cells: Vec<LocalId>,
}

impl Section {
    /// The section's kind tag (`Mixed` for heterogeneous sections).
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Container name of the section.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cells in insertion order.
    pub fn cell_ids(&self) -> &[LocalId] {
        &self.cells
    }
}

/// Serializable zone summary for logs and debug dumps.
#[derive(Clone, Debug, Serialize)]
pub struct ZoneSummary {
    pub zone_id: u32,
    pub rank: RankNo,
    pub generation: u64,
    pub real_nodes: usize,
    pub virtual_nodes: usize,
    pub real_cells: usize,
    pub virtual_cells: usize,
    pub boundary_nodes: usize,
    pub sections: Vec<(String, usize)>,
}

/// Serializable ghost-layer snapshot for debug dumps.
#[derive(Clone, Debug, Serialize)]
pub struct VirtualCellsReport {
    pub zone_id: u32,
    pub rank: RankNo,
    pub cells: Vec<VirtualCellEntry>,
}

/// One ghost cell in a [`VirtualCellsReport`].
#[derive(Clone, Debug, Serialize)]
pub struct VirtualCellEntry {
    pub local_id: u64,
    pub owner_rank: RankNo,
    pub owner_local_id: u64,
    pub kind: String,
}

/// An independent unstructured mesh region held by one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) rank: RankNo,
    pub(crate) nodes: Vec<Node>,
    pub(crate) cells: Vec<Cell>,
    pub(crate) sections: Vec<Section>,
    pub(crate) registry: SolutionRegistry,
    pub(crate) node_store: SolutionStore,
    pub(crate) cell_store: SolutionStore,
    pub(crate) connectivity: RankConnectivity,
    pub(crate) plans: Option<HaloPlans>,
    pub(crate) generation: u64,
    /// Structural change since the last rebuild.
    pub(crate) dirty: bool,
    /// Connectivity must be re-derived from identity tokens (set by
    /// migration).
    pub(crate) connectivity_stale: bool,
    /// Unreferenced real nodes may be dropped at the next rebuild (set by
    /// migration after exports).
    pub(crate) orphan_sweep: bool,
    /// A fatal error left this zone in an unknown state.
    pub(crate) suspect: bool,
}

impl Zone {
    /// Create an empty zone with the given id, owned by `rank`.
    pub fn new(id: u32, rank: RankNo) -> Self {
        Self {
            id,
            name: naming::zone_name(id),
            rank,
            nodes: Vec::new(),
            cells: Vec::new(),
            sections: Vec::new(),
            registry: SolutionRegistry::new(),
            node_store: SolutionStore::new(),
            cell_store: SolutionStore::new(),
            connectivity: RankConnectivity::new(),
            plans: None,
            generation: 0,
            dirty: false,
            connectivity_stale: false,
            orphan_sweep: false,
            suspect: false,
        }
    }

    /// Zone id (1-based within the model).
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Container name (`UdmZone#<id>`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning rank.
    pub fn rank(&self) -> RankNo {
        self.rank
    }

    /// Topology generation; bumped by every rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True after a fatal error; mutating operations refuse to run.
    pub fn is_suspect(&self) -> bool {
        self.suspect
    }

    /// True when a structural change has invalidated derived state.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn ensure_usable(&self) -> Result<()> {
        if self.suspect {
            return Err(udm_error!(
                ErrorKind::InvalidState,
                "zone {} is suspect after a fatal error; re-ingest or dispose it",
                self.id
            ));
        }
        Ok(())
    }

    // |-------|
    // | Nodes |
    // |-------|

    /// Insert a real node and return its local id.
    pub fn insert_node(&mut self, x: f64, y: f64, z: f64) -> LocalId {
        let id = LocalId::from_index(self.nodes.len());
        let gid = GlobalId::new(self.rank, id);
        self.nodes.push(Node {
            id,
            global_id: gid,
            coords: [x, y, z],
            reality: Reality::Real,
            cells: Vec::new(),
            neighbours: Vec::new(),
            tokens: vec![gid],
        });
        self.dirty = true;
        id
    }

    pub(crate) fn insert_virtual_node(&mut self, gid: GlobalId, coords: [f64; 3]) -> LocalId {
        let id = LocalId::from_index(self.nodes.len());
        self.nodes.push(Node {
            id,
            global_id: gid,
            coords,
            reality: Reality::Virtual,
            cells: Vec::new(),
            neighbours: Vec::new(),
            tokens: vec![gid],
        });
        id
    }

    /// Look up a node.
    pub fn node(&self, id: LocalId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| udm_error!(ErrorKind::InvalidEntity, "no node with id {id}"))
    }

    pub(crate) fn node_mut(&mut self, id: LocalId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .ok_or_else(|| udm_error!(ErrorKind::InvalidEntity, "no node with id {id}"))
    }

    /// True when `id` names an existing node.
    pub fn node_exists(&self, id: LocalId) -> bool {
        id.index() < self.nodes.len()
    }

    /// A node's coordinates.
    pub fn node_coordinates(&self, id: LocalId) -> Result<[f64; 3]> {
        Ok(self.node(id)?.coords)
    }

    /// Move a real node. Marks the zone dirty.
    pub fn set_node_coordinates(&mut self, id: LocalId, x: f64, y: f64, z: f64) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.reality == Reality::Virtual {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "node {id} is virtual and read-only"
            ));
        }
        node.coords = [x, y, z];
        self.dirty = true;
        Ok(())
    }

    /// All nodes, real first then virtual (the post-rebuild layout).
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Real nodes only.
    pub fn iter_real_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.reality == Reality::Real)
    }

    /// Virtual (ghost) nodes only.
    pub fn iter_virtual_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.reality == Reality::Virtual)
    }

    /// Total node count, ghosts included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Real node count.
    pub fn real_node_count(&self) -> usize {
        self.iter_real_nodes().count()
    }

    /// Virtual node count.
    pub fn virtual_node_count(&self) -> usize {
        self.iter_virtual_nodes().count()
    }

    // |-------|
    // | Cells |
    // |-------|

    /// Insert a real cell of a concrete kind, placing it in the homogeneous
    /// section of that kind (created on first use).
    pub fn insert_cell(&mut self, kind: ElementKind, nodes: &[LocalId]) -> Result<LocalId> {
        let section = match self
            .sections
            .iter()
            .position(|s| s.kind == kind && kind != ElementKind::Mixed)
        {
            Some(i) => i,
            None => {
                self.sections.push(Section {
                    kind,
                    name: naming::section_name(kind),
                    cells: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        self.insert_cell_in_section(section, kind, nodes)
    }

    /// Create a heterogeneous (mixed-kind) section and return its index.
    pub fn create_mixed_section(&mut self) -> usize {
        self.sections.push(Section {
            kind: ElementKind::Mixed,
            name: naming::section_name(ElementKind::Mixed),
            cells: Vec::new(),
        });
        self.sections.len() - 1
    }

    /// Insert a real cell into a specific section.
    ///
    /// The cell's kind must match the section kind, unless the section is
    /// mixed, in which case any concrete kind is accepted.
    pub fn insert_cell_in_section(
        &mut self,
        section: usize,
        kind: ElementKind,
        nodes: &[LocalId],
    ) -> Result<LocalId> {
        let expected = kind.node_count().ok_or_else(|| {
            udm_error!(
                ErrorKind::InvalidEntity,
                "cells cannot be of kind {kind}; give each cell its concrete kind"
            )
        })?;
        if nodes.len() != expected {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "{kind} takes {expected} nodes, got {}",
                nodes.len()
            ));
        }
        for &n in nodes {
            if !self.node_exists(n) {
                return Err(udm_error!(
                    ErrorKind::InvalidEntity,
                    "cell references missing node {n}"
                ));
            }
        }
        let sec = self.sections.get(section).ok_or_else(|| {
            udm_error!(ErrorKind::InvalidEntity, "no section with index {section}")
        })?;
        if sec.kind != ElementKind::Mixed && sec.kind != kind {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "section {} holds {} cells, not {kind}",
                section,
                sec.kind
            ));
        }

        let id = LocalId::from_index(self.cells.len());
        let gid = GlobalId::new(self.rank, id);
        self.cells.push(Cell {
            id,
            global_id: gid,
            kind,
            nodes: nodes.to_vec(),
            reality: Reality::Real,
            weight: None,
            removed: false,
        });
        self.sections[section].cells.push(id);
        self.dirty = true;
        Ok(id)
    }

    /// Insert a real node arriving through migration, keeping the sender's
    /// global id until the next rebuild renumbers it.
    pub(crate) fn insert_migrated_node(&mut self, gid: GlobalId, coords: [f64; 3]) -> LocalId {
        let id = LocalId::from_index(self.nodes.len());
        self.nodes.push(Node {
            id,
            global_id: gid,
            coords,
            reality: Reality::Real,
            cells: Vec::new(),
            neighbours: Vec::new(),
            tokens: vec![gid],
        });
        self.dirty = true;
        id
    }

    /// Insert a real cell arriving through migration into the homogeneous
    /// section of its kind, keeping the sender's global id until the next
    /// rebuild renumbers it.
    pub(crate) fn insert_migrated_cell(
        &mut self,
        gid: GlobalId,
        kind: ElementKind,
        nodes: Vec<LocalId>,
        weight: Option<f32>,
    ) -> LocalId {
        let section = match self
            .sections
            .iter()
            .position(|s| s.kind == kind && kind != ElementKind::Mixed)
        {
            Some(i) => i,
            None => {
                self.sections.push(Section {
                    kind,
                    name: naming::section_name(kind),
                    cells: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        let id = LocalId::from_index(self.cells.len());
        self.cells.push(Cell {
            id,
            global_id: gid,
            kind,
            nodes,
            reality: Reality::Real,
            weight,
            removed: false,
        });
        self.sections[section].cells.push(id);
        self.dirty = true;
        id
    }

    /// Place a promoted (ghost-to-owned) cell into the homogeneous section
    /// of its kind.
    pub(crate) fn adopt_promoted_cell(&mut self, id: LocalId) {
        let kind = self.cells[id.index()].kind;
        let section = match self
            .sections
            .iter()
            .position(|s| s.kind == kind && kind != ElementKind::Mixed)
        {
            Some(i) => i,
            None => {
                self.sections.push(Section {
                    kind,
                    name: naming::section_name(kind),
                    cells: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        if !self.sections[section].cells.contains(&id) {
            self.sections[section].cells.push(id);
        }
    }

    pub(crate) fn insert_virtual_cell(
        &mut self,
        gid: GlobalId,
        kind: ElementKind,
        nodes: Vec<LocalId>,
        weight: Option<f32>,
    ) -> LocalId {
        let id = LocalId::from_index(self.cells.len());
        self.cells.push(Cell {
            id,
            global_id: gid,
            kind,
            nodes,
            reality: Reality::Virtual,
            weight,
            removed: false,
        });
        id
    }

    /// Look up a cell.
    pub fn cell(&self, id: LocalId) -> Result<&Cell> {
        match self.cells.get(id.index()) {
            Some(c) if !c.removed => Ok(c),
            _ => Err(udm_error!(ErrorKind::InvalidEntity, "no cell with id {id}")),
        }
    }

    pub(crate) fn cell_mut(&mut self, id: LocalId) -> Result<&mut Cell> {
        match self.cells.get_mut(id.index()) {
            Some(c) if !c.removed => Ok(c),
            _ => Err(udm_error!(ErrorKind::InvalidEntity, "no cell with id {id}")),
        }
    }

    /// All live cells, real first then virtual (the post-rebuild layout).
    pub fn iter_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| !c.removed)
    }

    /// Real cells only.
    pub fn iter_real_cells(&self) -> impl Iterator<Item = &Cell> {
        self.iter_cells().filter(|c| c.reality == Reality::Real)
    }

    /// Virtual (ghost) cells only.
    pub fn iter_virtual_cells(&self) -> impl Iterator<Item = &Cell> {
        self.iter_cells().filter(|c| c.reality == Reality::Virtual)
    }

    /// Live cell count, ghosts included.
    pub fn cell_count(&self) -> usize {
        self.iter_cells().count()
    }

    /// Real cell count.
    pub fn real_cell_count(&self) -> usize {
        self.iter_real_cells().count()
    }

    /// Virtual cell count.
    pub fn virtual_cell_count(&self) -> usize {
        self.iter_virtual_cells().count()
    }

    /// Sections in creation order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Arithmetic centroid of a cell's nodes.
    pub fn centroid(&self, cell: LocalId) -> Result<[f64; 3]> {
        let c = self.cell(cell)?;
        let mut acc = [0.0f64; 3];
        for &n in &c.nodes {
            let p = self.node(n)?.coords;
            acc[0] += p[0];
            acc[1] += p[1];
            acc[2] += p[2];
        }
        let k = c.nodes.len() as f64;
        Ok([acc[0] / k, acc[1] / k, acc[2] / k])
    }

    /// Set the partition weight of a real cell.
    pub fn set_partition_weight(&mut self, cell: LocalId, weight: f32) -> Result<()> {
        let c = self.cell_mut(cell)?;
        if c.reality == Reality::Virtual {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "cell {cell} is virtual; weights belong to the owning rank"
            ));
        }
        c.weight = Some(weight);
        Ok(())
    }

    // |-------------------|
    // | Rank connectivity |
    // |-------------------|

    /// Record that real node `node` has a twin `(peer, peer_id)` on another
    /// rank.
    pub fn insert_rank_connectivity(
        &mut self,
        node: LocalId,
        peer: RankNo,
        peer_id: LocalId,
    ) -> Result<()> {
        if peer == self.rank {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "node {node} cannot pair with its own rank {peer}"
            ));
        }
        let n = self.node(node)?;
        if n.reality == Reality::Virtual {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "node {node} is virtual; pairs describe real boundary nodes"
            ));
        }
        self.connectivity.insert(node, peer, peer_id);
        self.dirty = true;
        Ok(())
    }

    /// The boundary-node twin index.
    pub fn rank_connectivity(&self) -> &RankConnectivity {
        &self.connectivity
    }

    /// Ghost exchange plans computed by the last rebuild, if any.
    pub fn halo_plans(&self) -> Option<&HaloPlans> {
        self.plans.as_ref()
    }

    // |-----------|
    // | Solutions |
    // |-----------|

    /// Register (or replace) a solution definition.
    pub fn register_solution(&mut self, config: SolutionConfig) {
        self.registry.register(config);
    }

    /// Look up a solution definition.
    pub fn solution_config(&self, name: &str) -> Option<&SolutionConfig> {
        self.registry.get(name)
    }

    /// The zone's solution registry.
    pub fn solution_registry(&self) -> &SolutionRegistry {
        &self.registry
    }

    /// Enable or disable auto-registration of unknown names on write.
    pub fn set_auto_register_solutions(&mut self, enabled: bool) {
        self.registry.set_auto_register(enabled);
    }

    fn write_config(&mut self, name: &str, location: GridLocation) -> Result<SolutionConfig> {
        if let Some(config) = self.registry.get(name) {
            if config.location != location {
                return Err(udm_error!(
                    ErrorKind::UnknownSolution,
                    "solution `{name}` is not registered at {location:?}"
                ));
            }
            return Ok(config.clone());
        }
        if self.registry.auto_register() {
            let config = SolutionConfig::scalar(name, location, DataType::RealDouble);
            self.registry.register(config.clone());
            return Ok(config);
        }
        Err(udm_error!(
            ErrorKind::UnknownSolution,
            "no solution named `{name}`"
        ))
    }

    fn read_config(&self, name: &str, location: GridLocation) -> Option<SolutionConfig> {
        self.registry
            .get(name)
            .filter(|c| c.location == location)
            .cloned()
    }

    fn writable_node(&self, id: LocalId) -> Result<()> {
        if self.node(id)?.reality == Reality::Virtual {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "node {id} is virtual; its values are written by transfers only"
            ));
        }
        Ok(())
    }

    fn writable_cell(&self, id: LocalId) -> Result<()> {
        if self.cell(id)?.reality == Reality::Virtual {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "cell {id} is virtual; its values are written by transfers only"
            ));
        }
        Ok(())
    }

    fn check_node(&self, id: LocalId) -> Result<()> {
        self.node(id).map(|_| ())
    }

    fn check_cell(&self, id: LocalId) -> Result<()> {
        self.cell(id).map(|_| ())
    }
}

/// Typed solution accessors for one entity kind. Reads of unregistered
/// names yield defaults; writes demand a registry entry unless
/// auto-registration is on.
macro_rules! solution_accessors {
    ($entity:ident, $location:expr, $noun:literal) => {
        paste::paste! {
            impl Zone {
                #[doc = concat!("Write a scalar solution value on a ", $noun, ".")]
                pub fn [<set_ $entity _solution>]<T: SolutionValue>(
                    &mut self,
                    id: LocalId,
                    name: &str,
                    value: T,
                ) -> Result<()> {
                    self.[<writable_ $entity>](id)?;
                    let config = self.write_config(name, $location)?;
                    self.[<$entity _store>].set_one(&config, id.index(), value)
                }

                #[doc = concat!("Write all vector components on a ", $noun, ".")]
                pub fn [<set_ $entity _solutions>]<T: SolutionValue>(
                    &mut self,
                    id: LocalId,
                    name: &str,
                    values: &[T],
                ) -> Result<()> {
                    self.[<writable_ $entity>](id)?;
                    let config = self.write_config(name, $location)?;
                    self.[<$entity _store>].set_values(&config, id.index(), values)
                }

                #[doc = concat!("Read a scalar solution value from a ", $noun, ".")]
                pub fn [<get_ $entity _solution>]<T: SolutionValue>(
                    &self,
                    id: LocalId,
                    name: &str,
                ) -> Result<T> {
                    self.[<check_ $entity>](id)?;
                    match self.read_config(name, $location) {
                        Some(config) => self.[<$entity _store>].get_one(&config, id.index()),
                        None => Ok(T::default()),
                    }
                }

                #[doc = concat!("Read all vector components from a ", $noun, ".")]
                pub fn [<get_ $entity _solutions>]<T: SolutionValue>(
                    &self,
                    id: LocalId,
                    name: &str,
                ) -> Result<Vec<T>> {
                    self.[<check_ $entity>](id)?;
                    match self.read_config(name, $location) {
                        Some(config) => {
                            Ok(self.[<$entity _store>].get_values(&config, id.index()))
                        }
                        None => Ok(vec![T::default()]),
                    }
                }
            }
        }
    };
}

solution_accessors!(node, GridLocation::Vertex, "node");
solution_accessors!(cell, GridLocation::CellCenter, "cell");

impl Zone {
    /// Serializable summary for logs and debug dumps.
    pub fn summary(&self) -> ZoneSummary {
        ZoneSummary {
            zone_id: self.id,
            rank: self.rank,
            generation: self.generation,
            real_nodes: self.real_node_count(),
            virtual_nodes: self.virtual_node_count(),
            real_cells: self.real_cell_count(),
            virtual_cells: self.virtual_cell_count(),
            boundary_nodes: self.connectivity.len(),
            sections: self
                .sections
                .iter()
                .map(|s| (s.name.clone(), s.cells.len()))
                .collect(),
        }
    }

    /// Serializable snapshot of the ghost layer: one entry per virtual
    /// cell with its owner and local id, for debug dumps.
    pub fn virtual_cells_report(&self) -> VirtualCellsReport {
        VirtualCellsReport {
            zone_id: self.id,
            rank: self.rank,
            cells: self
                .iter_virtual_cells()
                .map(|c| VirtualCellEntry {
                    local_id: c.id().get(),
                    owner_rank: c.global_id().rank,
                    owner_local_id: c.global_id().id.get(),
                    kind: c.kind().name().to_string(),
                })
                .collect(),
        }
    }

    /// Structural self-checks: node references, incidence symmetry, ghost
    /// id ownership, and face manifoldness for real cells. Debug paths and
    /// tests only; the checks are O(mesh size).
    pub fn debug_validate(&self) -> Result<()> {
        for cell in self.iter_cells() {
            for &n in &cell.nodes {
                let node = self.node(n)?;
                if !self.dirty && !node.cells.contains(&cell.id) {
                    return Err(udm_error!(
                        ErrorKind::InvalidEntity,
                        "cell {} lists node {n}, which does not list it back",
                        cell.id
                    ));
                }
            }
        }
        for node in self.iter_virtual_nodes() {
            if node.global_id.rank == self.rank {
                return Err(udm_error!(
                    ErrorKind::InvalidEntity,
                    "virtual node {} claims to be owned by this rank",
                    node.id
                ));
            }
        }
        for cell in self.iter_virtual_cells() {
            if cell.global_id.rank == self.rank {
                return Err(udm_error!(
                    ErrorKind::InvalidEntity,
                    "virtual cell {} claims to be owned by this rank",
                    cell.id
                ));
            }
        }
        // Interior faces of the real mesh must be shared by at most two
        // cells.
        let mut face_uses: HashMap<Vec<LocalId>, u32> = HashMap::new();
        for cell in self.iter_real_cells() {
            for face in cell.kind.faces() {
                let mut key: Vec<LocalId> = face.iter().map(|&i| cell.nodes[i]).collect();
                key.sort_unstable();
                *face_uses.entry(key).or_insert(0) += 1;
            }
        }
        if let Some((face, count)) = face_uses.iter().find(|&(_, &c)| c > 2) {
            return Err(udm_error!(
                ErrorKind::InvalidEntity,
                "face {face:?} is shared by {count} real cells"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> Zone {
        let mut zone = Zone::new(1, 0);
        let a = zone.insert_node(0.0, 0.0, 0.0);
        let b = zone.insert_node(1.0, 0.0, 0.0);
        let c = zone.insert_node(0.0, 1.0, 0.0);
        let d = zone.insert_node(1.0, 1.0, 0.0);
        zone.insert_cell(ElementKind::Tri3, &[a, b, c]).unwrap();
        zone.insert_cell(ElementKind::Tri3, &[b, d, c]).unwrap();
        zone
    }

    #[test]
    fn dense_one_based_ids() {
        let zone = two_triangles();
        let ids: Vec<u64> = zone.iter_nodes().map(|n| n.id().get()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(zone.real_cell_count(), 2);
    }

    #[test]
    fn kind_node_count_is_enforced() {
        let mut zone = Zone::new(1, 0);
        let a = zone.insert_node(0.0, 0.0, 0.0);
        let err = zone.insert_cell(ElementKind::Tri3, &[a]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEntity);
    }

    #[test]
    fn missing_node_reference_is_rejected() {
        let mut zone = Zone::new(1, 0);
        let a = zone.insert_node(0.0, 0.0, 0.0);
        let b = zone.insert_node(1.0, 0.0, 0.0);
        let err = zone
            .insert_cell(ElementKind::Tri3, &[a, b, LocalId::new(99)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEntity);
    }

    #[test]
    fn sections_group_by_kind() {
        let zone = two_triangles();
        assert_eq!(zone.sections().len(), 1);
        assert_eq!(zone.sections()[0].kind(), ElementKind::Tri3);
        assert_eq!(zone.sections()[0].name(), "UdmElements_TRI_3");
        assert_eq!(zone.sections()[0].cell_ids().len(), 2);
    }

    #[test]
    fn mixed_section_accepts_concrete_kinds() {
        let mut zone = Zone::new(1, 0);
        let a = zone.insert_node(0.0, 0.0, 0.0);
        let b = zone.insert_node(1.0, 0.0, 0.0);
        let c = zone.insert_node(0.0, 1.0, 0.0);
        let mixed = zone.create_mixed_section();
        let cell = zone
            .insert_cell_in_section(mixed, ElementKind::Tri3, &[a, b, c])
            .unwrap();
        assert_eq!(zone.cell(cell).unwrap().kind(), ElementKind::Tri3);
        assert_eq!(zone.sections()[mixed].kind(), ElementKind::Mixed);
        let err = zone
            .insert_cell_in_section(mixed, ElementKind::Mixed, &[a, b, c])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEntity);
    }

    #[test]
    fn weights_default_to_one() {
        let mut zone = two_triangles();
        let first = LocalId::new(1);
        assert_eq!(zone.cell(first).unwrap().weight(), 1.0);
        zone.set_partition_weight(first, 4.5).unwrap();
        assert_eq!(zone.cell(first).unwrap().weight(), 4.5);
    }

    #[test]
    fn solution_roundtrip_and_unknown_behavior() {
        let mut zone = two_triangles();
        let node = LocalId::new(1);
        // unknown name: read yields default, write is refused
        let v: f64 = zone.get_node_solution(node, "Pressure").unwrap();
        assert_eq!(v, 0.0);
        let err = zone.set_node_solution(node, "Pressure", 1.0f64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownSolution);

        zone.register_solution(SolutionConfig::scalar(
            "Pressure",
            GridLocation::Vertex,
            DataType::RealSingle,
        ));
        zone.set_node_solution(node, "Pressure", 2.5f64).unwrap();
        let v: f64 = zone.get_node_solution(node, "Pressure").unwrap();
        assert_eq!(v, 2.5);
    }

    #[test]
    fn auto_register_creates_entry_on_write() {
        let mut zone = two_triangles();
        zone.set_auto_register_solutions(true);
        zone.set_node_solution(LocalId::new(2), "Temperature", 300.0f64)
            .unwrap();
        let config = zone.solution_config("Temperature").unwrap();
        assert_eq!(config.location, GridLocation::Vertex);
        assert_eq!(config.arity(), 1);
    }

    #[test]
    fn centroid_averages_node_coordinates() {
        let zone = two_triangles();
        let c = zone.centroid(LocalId::new(1)).unwrap();
        assert!((c[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((c[1] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(c[2], 0.0);
    }

    #[test]
    fn own_rank_pairing_is_rejected() {
        let mut zone = two_triangles();
        let err = zone
            .insert_rank_connectivity(LocalId::new(1), 0, LocalId::new(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEntity);
        zone.insert_rank_connectivity(LocalId::new(1), 1, LocalId::new(3))
            .unwrap();
        assert!(zone.rank_connectivity().is_boundary(LocalId::new(1)));
    }
}
