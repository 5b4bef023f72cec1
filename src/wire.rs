//! Byte protocol for cell/node payloads exchanged between ranks.
//!
//! Migration and halo construction ship cells (with their referenced nodes
//! and solution values) between peers as a length-prefixed chunk stream:
//!
//! ```text
//! u32 chunk_count
//! for each chunk:
//!   u64 byte_length                       -- of the chunk body that follows
//!   u32 cell_count
//!   for each cell:
//!     u8  kind_tag                        -- CGNS element enumeration
//!     u32 owning_rank
//!     u64 owning_local_id
//!     f32 weight
//!     u32 node_ref_count
//!     u64 node_global_ids[...]            -- node_ref_count ids, each in
//!                                            gid_width slots
//!     <per-solution values, registry order>
//!   u32 distinct_node_count
//!   for each distinct node:
//!     u32 owning_rank
//!     u64 owning_local_id
//!     f64 x, y, z
//!     <per-solution values, registry order>
//! ```
//!
//! All integers and floats are little-endian. Chunks are self-contained:
//! every node record a chunk's cells need (and that the sender chose to
//! ship) appears in that same chunk, in first-reference order. A stream is
//! split into multiple chunks when a single chunk body would exceed the
//! configured cap; a lone oversized cell still ships as one chunk.

use crate::element::ElementKind;
use crate::error::{ErrorKind, Result};
use crate::ids::{GidWidth, GlobalId, RankNo};
use crate::solution::{DataType, FieldArray, SolutionConfig};
use crate::udm_error;
use std::collections::BTreeMap;

/// Knobs agreed at startup by every rank in the communicator.
#[derive(Clone, Copy, Debug)]
pub struct WireOptions {
    /// Integer-slot encoding for node references.
    pub gid_width: GidWidth,
    /// Maximum chunk body size in bytes before the stream splits.
    pub chunk_cap: u64,
}

impl Default for WireOptions {
    fn default() -> Self {
        Self {
            gid_width: GidWidth::default(),
            chunk_cap: 1 << 30,
        }
    }
}

/// One cell on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct WireCell {
    /// Element kind of the cell.
    pub kind: ElementKind,
    /// Global id on the sending rank.
    pub gid: GlobalId,
    /// Partition weight.
    pub weight: f32,
    /// Referenced node global ids, in the cell's node order.
    pub nodes: Vec<GlobalId>,
    /// Cell-centered solution values, one entry per registered solution in
    /// registry order; each entry holds that solution's components.
    pub values: Vec<FieldArray>,
}

/// One node on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct WireNode {
    /// Global id on the sending rank.
    pub gid: GlobalId,
    /// Coordinates.
    pub coords: [f64; 3],
    /// Vertex solution values, registry order.
    pub values: Vec<FieldArray>,
}

/// A decoded chunk: cells plus the distinct nodes shipped alongside them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    /// Cells in sender order.
    pub cells: Vec<WireCell>,
    /// Distinct node records in first-reference order.
    pub nodes: Vec<WireNode>,
}

// |---------------------------|
// | Little-endian byte cursor |
// |---------------------------|

/// Append-only little-endian byte buffer.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer, yielding the buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append another writer's bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

/// Bounds-checked little-endian reader over a byte slice.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! reader_get {
    ($name:ident, $ty:ty, $size:expr) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take($size)?;
            Ok(<$ty>::from_le_bytes(bytes.try_into().unwrap()))
        }
    };
}

impl<'a> ByteReader<'a> {
    /// Create a reader over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(udm_error!(
                ErrorKind::TransportFailed,
                "truncated payload: wanted {} bytes, {} remain",
                n,
                self.remaining()
            ));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    reader_get!(get_u32, u32, 4);
    reader_get!(get_u64, u64, 8);
    reader_get!(get_i32, i32, 4);
    reader_get!(get_i64, i64, 8);
    reader_get!(get_f32, f32, 4);
    reader_get!(get_f64, f64, 8);
}

// |----------------------|
// | Solution value codec |
// |----------------------|

pub(crate) fn encode_components(
    w: &mut ByteWriter,
    config: &SolutionConfig,
    values: &FieldArray,
) -> Result<()> {
    let arity = config.arity();
    if values.len() != arity {
        return Err(udm_error!(
            ErrorKind::TransportFailed,
            "solution `{}`: expected {} component(s) on the wire, got {}",
            config.name,
            arity,
            values.len()
        ));
    }
    match (config.data_type, values) {
        (DataType::Integer, FieldArray::Integer(v)) => v.iter().for_each(|&x| w.put_i32(x)),
        (DataType::LongInteger, FieldArray::LongInteger(v)) => {
            v.iter().for_each(|&x| w.put_i64(x))
        }
        (DataType::RealSingle, FieldArray::RealSingle(v)) => v.iter().for_each(|&x| w.put_f32(x)),
        (DataType::RealDouble, FieldArray::RealDouble(v)) => v.iter().for_each(|&x| w.put_f64(x)),
        _ => {
            return Err(udm_error!(
                ErrorKind::TransportFailed,
                "solution `{}`: storage type does not match its registration",
                config.name
            ));
        }
    }
    Ok(())
}

pub(crate) fn decode_components(
    r: &mut ByteReader<'_>,
    config: &SolutionConfig,
) -> Result<FieldArray> {
    let arity = config.arity();
    Ok(match config.data_type {
        DataType::Integer => {
            let mut v = Vec::with_capacity(arity);
            for _ in 0..arity {
                v.push(r.get_i32()?);
            }
            FieldArray::Integer(v)
        }
        DataType::LongInteger => {
            let mut v = Vec::with_capacity(arity);
            for _ in 0..arity {
                v.push(r.get_i64()?);
            }
            FieldArray::LongInteger(v)
        }
        DataType::RealSingle => {
            let mut v = Vec::with_capacity(arity);
            for _ in 0..arity {
                v.push(r.get_f32()?);
            }
            FieldArray::RealSingle(v)
        }
        DataType::RealDouble => {
            let mut v = Vec::with_capacity(arity);
            for _ in 0..arity {
                v.push(r.get_f64()?);
            }
            FieldArray::RealDouble(v)
        }
    })
}

fn field_bytes(configs: &[&SolutionConfig]) -> usize {
    configs
        .iter()
        .map(|c| c.arity() * c.data_type.byte_width())
        .sum()
}

// |----------------|
// | Stream encoder |
// |----------------|

fn cell_record_bytes(cell: &WireCell, width: GidWidth, cell_cfgs: &[&SolutionConfig]) -> usize {
    1 + 4 + 8 + 4 + 4 + cell.nodes.len() * width.slots() * 8 + field_bytes(cell_cfgs)
}

fn node_record_bytes(node_cfgs: &[&SolutionConfig]) -> usize {
    4 + 8 + 24 + field_bytes(node_cfgs)
}

fn encode_cell(
    w: &mut ByteWriter,
    cell: &WireCell,
    width: GidWidth,
    cell_cfgs: &[&SolutionConfig],
) -> Result<()> {
    w.put_u8(cell.kind.cgns_id());
    w.put_u32(cell.gid.rank);
    w.put_u64(cell.gid.id.get());
    w.put_f32(cell.weight);
    w.put_u32(cell.nodes.len() as u32);
    let mut slots = Vec::with_capacity(width.slots());
    for gid in &cell.nodes {
        slots.clear();
        gid.encode(width, &mut slots);
        for &s in &slots {
            w.put_u64(s);
        }
    }
    if cell.values.len() != cell_cfgs.len() {
        return Err(udm_error!(
            ErrorKind::TransportFailed,
            "cell {} carries {} solution entries, registry has {}",
            cell.gid,
            cell.values.len(),
            cell_cfgs.len()
        ));
    }
    for (config, values) in cell_cfgs.iter().zip(&cell.values) {
        encode_components(w, config, values)?;
    }
    Ok(())
}

fn encode_node(
    w: &mut ByteWriter,
    node: &WireNode,
    node_cfgs: &[&SolutionConfig],
) -> Result<()> {
    w.put_u32(node.gid.rank);
    w.put_u64(node.gid.id.get());
    w.put_f64(node.coords[0]);
    w.put_f64(node.coords[1]);
    w.put_f64(node.coords[2]);
    if node.values.len() != node_cfgs.len() {
        return Err(udm_error!(
            ErrorKind::TransportFailed,
            "node {} carries {} solution entries, registry has {}",
            node.gid,
            node.values.len(),
            node_cfgs.len()
        ));
    }
    for (config, values) in node_cfgs.iter().zip(&node.values) {
        encode_components(w, config, values)?;
    }
    Ok(())
}

/// Encode `cells` (and the subset of their referenced nodes present in
/// `nodes`) into a chunked stream.
///
/// Node records ship in first-reference order; references absent from
/// `nodes` are encoded as bare ids only, for the receiver to resolve against
/// entities it already holds.
pub fn encode_stream(
    options: &WireOptions,
    cell_cfgs: &[&SolutionConfig],
    node_cfgs: &[&SolutionConfig],
    cells: &[WireCell],
    nodes: &BTreeMap<GlobalId, WireNode>,
) -> Result<Vec<u8>> {
    let width = options.gid_width;
    let node_bytes = node_record_bytes(node_cfgs);

    // Greedy chunk split: close the current chunk when the next cell (plus
    // any node records it introduces) would push the body past the cap.
    let mut chunks: Vec<(Vec<&WireCell>, Vec<GlobalId>)> = Vec::new();
    let mut current: Vec<&WireCell> = Vec::new();
    let mut current_nodes: Vec<GlobalId> = Vec::new();
    let mut seen: std::collections::BTreeSet<GlobalId> = Default::default();
    let mut body = 8usize; // the two u32 count fields

    for cell in cells {
        let mut fresh = Vec::new();
        for gid in &cell.nodes {
            if nodes.contains_key(gid) && !seen.contains(gid) && !fresh.contains(gid) {
                fresh.push(*gid);
            }
        }
        let addition = cell_record_bytes(cell, width, cell_cfgs) + fresh.len() * node_bytes;
        if !current.is_empty() && (body + addition) as u64 > options.chunk_cap {
            chunks.push((
                std::mem::take(&mut current),
                std::mem::take(&mut current_nodes),
            ));
            seen.clear();
            body = 8;
            fresh.clear();
            for gid in &cell.nodes {
                if nodes.contains_key(gid) && !fresh.contains(gid) {
                    fresh.push(*gid);
                }
            }
        }
        body += cell_record_bytes(cell, width, cell_cfgs) + fresh.len() * node_bytes;
        for gid in fresh {
            seen.insert(gid);
            current_nodes.push(gid);
        }
        current.push(cell);
    }
    if !current.is_empty() {
        chunks.push((current, current_nodes));
    }

    let mut w = ByteWriter::new();
    w.put_u32(chunks.len() as u32);
    for (chunk_cells, chunk_nodes) in chunks {
        let mut cw = ByteWriter::new();
        cw.put_u32(chunk_cells.len() as u32);
        for cell in &chunk_cells {
            encode_cell(&mut cw, cell, width, cell_cfgs)?;
        }
        cw.put_u32(chunk_nodes.len() as u32);
        for gid in &chunk_nodes {
            encode_node(&mut cw, &nodes[gid], node_cfgs)?;
        }
        let body = cw.into_inner();
        w.put_u64(body.len() as u64);
        w.put_bytes(&body);
    }
    Ok(w.into_inner())
}

/// Decode a chunked stream produced by [`encode_stream`].
///
/// With [`GidWidth::Single`] node references resolve against
/// `implicit_rank`.
pub fn decode_stream(
    options: &WireOptions,
    cell_cfgs: &[&SolutionConfig],
    node_cfgs: &[&SolutionConfig],
    bytes: &[u8],
    implicit_rank: RankNo,
) -> Result<Vec<Chunk>> {
    let width = options.gid_width;
    let mut r = ByteReader::new(bytes);
    let chunk_count = r.get_u32()?;
    let mut chunks = Vec::with_capacity(chunk_count as usize);
    for _ in 0..chunk_count {
        let body_len = r.get_u64()? as usize;
        let start = r.position();

        let mut chunk = Chunk::default();
        let cell_count = r.get_u32()?;
        for _ in 0..cell_count {
            let tag = r.get_u8()?;
            let kind = ElementKind::from_cgns_id(tag).ok_or_else(|| {
                udm_error!(ErrorKind::TransportFailed, "unknown element tag {tag}")
            })?;
            let rank = r.get_u32()?;
            let id = r.get_u64()?;
            let weight = r.get_f32()?;
            let ref_count = r.get_u32()?;
            let mut refs = Vec::with_capacity(ref_count as usize);
            let mut slots = vec![0u64; width.slots()];
            for _ in 0..ref_count {
                for s in slots.iter_mut() {
                    *s = r.get_u64()?;
                }
                refs.push(GlobalId::decode(width, &slots, implicit_rank)?);
            }
            let mut values = Vec::with_capacity(cell_cfgs.len());
            for config in cell_cfgs {
                values.push(decode_components(&mut r, config)?);
            }
            chunk.cells.push(WireCell {
                kind,
                gid: GlobalId::new(rank, crate::ids::LocalId::new(id)),
                weight,
                nodes: refs,
                values,
            });
        }
        let node_count = r.get_u32()?;
        for _ in 0..node_count {
            let rank = r.get_u32()?;
            let id = r.get_u64()?;
            let coords = [r.get_f64()?, r.get_f64()?, r.get_f64()?];
            let mut values = Vec::with_capacity(node_cfgs.len());
            for config in node_cfgs {
                values.push(decode_components(&mut r, config)?);
            }
            chunk.nodes.push(WireNode {
                gid: GlobalId::new(rank, crate::ids::LocalId::new(id)),
                coords,
                values,
            });
        }

        if r.position() - start != body_len {
            return Err(udm_error!(
                ErrorKind::TransportFailed,
                "chunk length mismatch: header said {} bytes, decoded {}",
                body_len,
                r.position() - start
            ));
        }
        chunks.push(chunk);
    }
    if r.remaining() != 0 {
        return Err(udm_error!(
            ErrorKind::TransportFailed,
            "{} trailing bytes after final chunk",
            r.remaining()
        ));
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::LocalId;
    use crate::solution::GridLocation;

    fn gid(rank: RankNo, id: u64) -> GlobalId {
        GlobalId::new(rank, LocalId::new(id))
    }

    fn cfgs() -> (SolutionConfig, SolutionConfig) {
        (
            SolutionConfig::scalar("Density", GridLocation::CellCenter, DataType::RealDouble),
            SolutionConfig::scalar("Pressure", GridLocation::Vertex, DataType::RealSingle),
        )
    }

    fn sample(cell_count: u64) -> (Vec<WireCell>, BTreeMap<GlobalId, WireNode>) {
        let mut cells = Vec::new();
        let mut nodes = BTreeMap::new();
        for i in 1..=cell_count {
            let refs = vec![gid(0, i), gid(0, i + 1), gid(0, i + 2)];
            for (k, g) in refs.iter().enumerate() {
                nodes.entry(*g).or_insert_with(|| WireNode {
                    gid: *g,
                    coords: [i as f64, k as f64, 0.0],
                    values: vec![FieldArray::RealSingle(vec![0.5 + i as f32])],
                });
            }
            cells.push(WireCell {
                kind: ElementKind::Tri3,
                gid: gid(0, i),
                weight: 1.0,
                nodes: refs,
                values: vec![FieldArray::RealDouble(vec![i as f64 * 0.1])],
            });
        }
        (cells, nodes)
    }

    #[test]
    fn roundtrip_single_chunk() {
        let (cell_cfg, node_cfg) = cfgs();
        let (cells, nodes) = sample(4);
        let options = WireOptions::default();
        let bytes =
            encode_stream(&options, &[&cell_cfg], &[&node_cfg], &cells, &nodes).unwrap();
        let chunks =
            decode_stream(&options, &[&cell_cfg], &[&node_cfg], &bytes, 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].cells, cells);
        assert_eq!(chunks[0].nodes.len(), nodes.len());
        for node in &chunks[0].nodes {
            assert_eq!(&nodes[&node.gid], node);
        }
    }

    #[test]
    fn tiny_cap_splits_into_chunks() {
        let (cell_cfg, node_cfg) = cfgs();
        let (cells, nodes) = sample(10);
        let options = WireOptions {
            chunk_cap: 256,
            ..Default::default()
        };
        let bytes =
            encode_stream(&options, &[&cell_cfg], &[&node_cfg], &cells, &nodes).unwrap();
        let chunks =
            decode_stream(&options, &[&cell_cfg], &[&node_cfg], &bytes, 0).unwrap();
        assert!(chunks.len() >= 2, "expected a split, got {}", chunks.len());
        let total: Vec<_> = chunks.iter().flat_map(|c| c.cells.clone()).collect();
        assert_eq!(total, cells);
        // every chunk resolves its own references
        for chunk in &chunks {
            let local: std::collections::BTreeSet<_> =
                chunk.nodes.iter().map(|n| n.gid).collect();
            for cell in &chunk.cells {
                for r in &cell.nodes {
                    assert!(local.contains(r), "chunk not self-contained");
                }
            }
        }
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let (cell_cfg, node_cfg) = cfgs();
        let (cells, nodes) = sample(2);
        let options = WireOptions::default();
        let bytes =
            encode_stream(&options, &[&cell_cfg], &[&node_cfg], &cells, &nodes).unwrap();
        let err = decode_stream(
            &options,
            &[&cell_cfg],
            &[&node_cfg],
            &bytes[..bytes.len() - 3],
            0,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailed);
    }

    #[test]
    fn wide_width_roundtrips_large_ids() {
        let (cell_cfg, node_cfg) = cfgs();
        let big = gid(2, (1u64 << 33) + 7);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            big,
            WireNode {
                gid: big,
                coords: [1.0, 2.0, 3.0],
                values: vec![FieldArray::RealSingle(vec![1.0])],
            },
        );
        let cells = vec![WireCell {
            kind: ElementKind::Bar2,
            gid: gid(2, 9),
            weight: 2.0,
            nodes: vec![big, big],
            values: vec![FieldArray::RealDouble(vec![0.25])],
        }];
        let options = WireOptions {
            gid_width: GidWidth::Wide,
            ..Default::default()
        };
        let bytes =
            encode_stream(&options, &[&cell_cfg], &[&node_cfg], &cells, &nodes).unwrap();
        let chunks =
            decode_stream(&options, &[&cell_cfg], &[&node_cfg], &bytes, 0).unwrap();
        assert_eq!(chunks[0].cells[0].nodes[0], big);
    }
}
