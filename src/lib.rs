//! # udmesh
//!
//! **Distributed unstructured-mesh management** for MPI-style CFD solvers.
//! Each rank of an SPMD job holds one local partition of a global mesh --
//! nodes, cells, physical fields -- and udmesh keeps those partitions
//! coherent: it derives incidence, tracks node identity across rank
//! boundaries, maintains a one-layer ghost halo, migrates cell ownership to
//! balance load, and synchronizes ghost field values every solver step.
//!
//! ## Key Features
//!
//! - **Rank-local topology store** - dense 1-based ids, homogeneous and
//!   mixed element sections, per-entity field values, real/ghost reality
//!   tracking
//! - **Rank connectivity** - a bidirectional boundary-node twin index with a
//!   collective validator
//! - **Rebuild** - one idempotent pass that canonicalizes ids, incidence,
//!   connectivity and the ghost halo
//! - **Repartitioning** - a partitioner-agnostic migration engine (plan,
//!   pack, two-round collective exchange, merge, rebuild) with a built-in
//!   weight-balanced coordinate bisector
//! - **Ghost transfer** - positional, plan-driven field synchronization per
//!   step, constants skipped
//! - **Transport seam** - every collective goes through the
//!   [`Transport`] trait; an in-process implementation backs tests and
//!   demos, an MPI adapter slots in unchanged
//! - **DFI configuration** - the hierarchical text format for file layout,
//!   units, time slices and solution registries
//! - **Staging tool** - `udm-frm` fans a case out into `%06d` per-rank
//!   launch directories
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use udmesh::*;
//!
//! # fn main() -> udmesh::Result<()> {
//! // a single-rank "communicator" for local use
//! let transport = Arc::new(LocalExchange::world(1).remove(0));
//! let mut model = Model::new(transport);
//!
//! // ingest a little mesh
//! let zone_id = model.create_zone()?;
//! let zone = model.zone_mut(zone_id)?;
//! let a = zone.insert_node(0.0, 0.0, 0.0);
//! let b = zone.insert_node(1.0, 0.0, 0.0);
//! let c = zone.insert_node(0.0, 1.0, 0.0);
//! zone.insert_cell(ElementKind::Tri3, &[a, b, c])?;
//!
//! // derive incidence, connectivity and the ghost layer
//! model.rebuild()?;
//! assert_eq!(model.zone(zone_id)?.real_cell_count(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## A two-rank exchange
//!
//! Boundary nodes are paired explicitly; a rebuild then ghosts the peer's
//! adjacent cell layer on each side:
//!
//! ```no_run
//! use std::sync::Arc;
//! use udmesh::*;
//! use udmesh::testing::{overlapping_hex_pair, run_ranks};
//!
//! run_ranks(2, |rank, transport| {
//!     let mut model = Model::new(Arc::new(transport));
//!     let zone_id = model.create_zone().unwrap();
//!     *model.zone_mut(zone_id).unwrap() = overlapping_hex_pair(rank);
//!     model.rebuild().unwrap();
//!     let zone = model.zone(zone_id).unwrap();
//!     assert_eq!(zone.virtual_node_count(), 9);
//!     assert_eq!(zone.virtual_cell_count(), 8);
//! });
//! ```
//!
//! ## Core Concepts
//!
//! ### Real and virtual entities
//!
//! A *real* node or cell is owned by the current rank, which is
//! authoritative for its field values. A *virtual* entity is a read-only
//! ghost copy of a peer's real entity, kept so every real cell sees its
//! full neighbourhood. Ghosts are appended after the real entities and are
//! recomputed by every rebuild.
//!
//! ### Global ids and generations
//!
//! Within a zone, entities are addressed by dense 1-based [`LocalId`]s.
//! Across ranks only the [`GlobalId`] pair `(owning rank, owner-local id)`
//! is meaningful. Every rebuild advances a *generation*; cached exchange
//! plans name the generation they were computed for and become invalid on
//! the next structural change.
//!
//! ### The lifecycle
//!
//! ```text
//! Empty -> Loaded -> Rebuilt -> (partition) -> Rebuilt -> ... -> Disposed
//! ```
//!
//! Structural writes are allowed in any live state but drop the model back
//! to `Loaded`; partition and transfer require `Rebuilt`. Fatal errors
//! (partitioner, transport, plan mismatch) mark the affected zone
//! *suspect*, and it refuses further work until re-ingested or disposed.
//!
//! ### Collectives
//!
//! Rebuild, partition, transfer and the connectivity validator are
//! *collective*: every rank in the communicator must call them together,
//! in the same order, with matching parameters. A rank with no data still
//! participates with empty payloads. Inside one rank there is exactly one
//! thread; the only blocking points are the transport exchanges.
//!
//! ## Module Overview
//!
//! - [`model`] - the per-rank root object and lifecycle state machine
//! - [`zone`] - node/cell tables, sections, field storage
//! - [`solution`] - solution registry and typed field arrays
//! - [`element`] - element kinds, CGNS tags, face layouts
//! - [`connectivity`] - boundary-node twin index, plans, validator
//! - [`rebuild`] - the canonicalization pass
//! - [`partitioner`] - partitioner seam and the built-in bisector
//! - [`migrate`] - the migration engine
//! - [`transfer`] - ghost field synchronization
//! - [`transport`] - the collective-exchange seam and in-process ranks
//! - [`wire`] - the chunked byte protocol for cell/node payloads
//! - [`config`] - DFI text configuration
//! - [`naming`] - container and staging naming contract
//! - [`staging`] - fan-out staging behind `udm-frm`
//! - [`testing`] - builders, multi-rank harness, assertions
//!
//! ## Error Handling
//!
//! Every fallible call returns [`Result`]. Kinds are in [`ErrorKind`];
//! non-fatal conditions ([`Warning`]) travel through success values, e.g. a
//! repartition whose plan moves nothing reports
//! [`PartitionOutcome::NoChange`] rather than failing.

pub mod config;
pub mod connectivity;
pub mod element;
pub mod error;
pub mod ids;
pub mod migrate;
pub mod model;
pub mod naming;
pub mod partitioner;
pub mod rebuild;
pub mod solution;
pub mod staging;
pub mod testing;
mod topology;
pub mod transfer;
pub mod transport;
pub mod wire;
pub mod zone;

// General re-exports
pub use config::{DfiConfig, DfiTree, FieldFilenameFormat, FileCompositionType, SliceRecord};
pub use connectivity::{HaloPlans, PeerPlan, RankConnectivity, validate_rank_connectivity};
pub use element::ElementKind;
pub use error::{ErrorKind, Result, UdmError, Warning};
pub use ids::{GidWidth, GlobalId, LocalId, RankNo};
pub use migrate::PartitionOutcome;
pub use model::{Model, ModelState, UdmInfo};
pub use partitioner::{
    Export, Import, MeshView, PartitionApproach, PartitionMethod, PartitionParams, PartitionPlan,
    Partitioner, RcbPartitioner,
};
pub use rebuild::rebuild_zone;
pub use solution::{
    DataType, FieldArray, GridLocation, SolutionConfig, SolutionRegistry, SolutionValue,
    VectorType,
};
pub use transfer::TransferStats;
pub use transport::{LocalExchange, Transport};
pub use wire::WireOptions;
pub use zone::{Cell, Node, Reality, Section, Zone};
