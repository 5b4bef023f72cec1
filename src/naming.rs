//! Naming contract for the mesh container and staging layout.
//!
//! The on-disk container (CGNS/HDF5) is written by an external collaborator,
//! but the names it uses are fixed here so that every producer and consumer
//! agrees: the base node, zone and section patterns, per-step grid and
//! solution array names, the `UdmInfo` block, and the `%06d` per-rank
//! staging directory rule that downstream tooling depends on.

use crate::element::ElementKind;
use std::path::{Path, PathBuf};

/// Name of the single CGNS base node.
pub const BASE_NAME: &str = "UdmBase";

/// Name of the rank-connectivity user-defined array: `(local-id, peer-rank,
/// peer-local-id)` triplets.
pub const RANK_CONNECTIVITY_NAME: &str = "UdmRankConnectivity";

/// Name of the per-file library-information block.
pub const UDMINFO_NAME: &str = "UdmInfo";

/// Zone node name: `UdmZone#<id>`.
pub fn zone_name(zone_id: u32) -> String {
    format!("UdmZone#{zone_id}")
}

/// Section node name: `UdmElements_<kind>`.
pub fn section_name(kind: ElementKind) -> String {
    format!("UdmElements_{}", kind.name())
}

/// Per-step grid coordinates array name.
pub fn grid_coordinates_name(step: u32) -> String {
    format!("GridCoordinates_{step:010}")
}

/// Per-step vertex solution array name; `_Const` variant for constants.
pub fn vertex_solution_name(step: u32, constant: bool) -> String {
    if constant {
        format!("UdmSol_Node_{step:010}_Const")
    } else {
        format!("UdmSol_Node_{step:010}")
    }
}

/// Per-step cell-centered solution array name; `_Const` variant for
/// constants.
pub fn cell_solution_name(step: u32, constant: bool) -> String {
    if constant {
        format!("UdmSol_Cell_{step:010}_Const")
    } else {
        format!("UdmSol_Cell_{step:010}")
    }
}

/// Per-rank staging directory: `<output>/<rank as %06d>`.
///
/// This layout is relied on by launch tooling; the zero-padded width is
/// load-bearing and must not change.
pub fn rank_directory(output: &Path, rank: u32) -> PathBuf {
    output.join(format!("{rank:06}"))
}
