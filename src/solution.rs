//! Physical-quantity ("solution") registry and field storage.
//!
//! A zone registers each solution once ([`SolutionConfig`]: grid location,
//! data type, vector arity, constant flag) and then reads/writes values per
//! entity through a [`SolutionStore`]. Storage is a flat typed array per
//! solution name, indexed by entity position; scalar and N-vector values
//! share one code path with the arity carried by the registry entry.
//!
//! Reads of an entity that was never written yield the registered default
//! (zero for every numeric type). Writes with the wrong component count are
//! rejected with *arity-mismatch*; unregistered names are rejected with
//! *unknown-solution* unless auto-registration is enabled.
//!
//! Registry iteration order is the lexicographic name order, which is also
//! the order solution values are laid out in wire payloads; all ranks see
//! the same order because registration is collective.

use crate::error::{ErrorKind, Result};
use crate::udm_error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a solution's values live.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum GridLocation {
    /// One value set per node.
    Vertex,
    /// One value set per cell.
    CellCenter,
}

/// Storage type of a solution's components.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    LongInteger,
    /// 32-bit float.
    RealSingle,
    /// 64-bit float.
    RealDouble,
}

impl DataType {
    /// Parse the DFI spelling (`"Integer"`, `"RealSingle"`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Integer" => DataType::Integer,
            "LongInteger" => DataType::LongInteger,
            "RealSingle" => DataType::RealSingle,
            "RealDouble" => DataType::RealDouble,
            _ => return None,
        })
    }

    /// The DFI spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Integer => "Integer",
            DataType::LongInteger => "LongInteger",
            DataType::RealSingle => "RealSingle",
            DataType::RealDouble => "RealDouble",
        }
    }

    /// Bytes per component in serialized form.
    pub fn byte_width(self) -> usize {
        match self {
            DataType::Integer | DataType::RealSingle => 4,
            DataType::LongInteger | DataType::RealDouble => 8,
        }
    }
}

/// Scalar or fixed-arity vector.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum VectorType {
    /// One component.
    Scalar,
    /// `nvector` components (typically 3 or 9).
    Vector,
}

/// Registry entry for one solution name.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SolutionConfig {
    /// Solution name, unique within the zone.
    pub name: String,
    /// Vertex or cell-center placement.
    pub location: GridLocation,
    /// Component storage type.
    pub data_type: DataType,
    /// Scalar or vector.
    pub vector_type: VectorType,
    /// Component count when `vector_type` is `Vector`.
    pub nvector: usize,
    /// Constant fields are written once and skipped by ghost transfers and
    /// per-step output.
    pub constant: bool,
}

impl SolutionConfig {
    /// A scalar solution.
    pub fn scalar<S: Into<String>>(name: S, location: GridLocation, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            location,
            data_type,
            vector_type: VectorType::Scalar,
            nvector: 1,
            constant: false,
        }
    }

    /// An `n`-component vector solution.
    pub fn vector<S: Into<String>>(
        name: S,
        location: GridLocation,
        data_type: DataType,
        n: usize,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            data_type,
            vector_type: VectorType::Vector,
            nvector: n,
            constant: false,
        }
    }

    /// Mark the solution constant.
    #[must_use]
    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    /// Components per entity.
    pub fn arity(&self) -> usize {
        match self.vector_type {
            VectorType::Scalar => 1,
            VectorType::Vector => self.nvector,
        }
    }
}

/// The zone's solution registry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolutionRegistry {
    entries: BTreeMap<String, SolutionConfig>,
    auto_register: bool,
}

impl SolutionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a solution definition.
    pub fn register(&mut self, config: SolutionConfig) {
        self.entries.insert(config.name.clone(), config);
    }

    /// Enable or disable on-write auto-registration of unknown names.
    ///
    /// When enabled, a write to an unregistered name creates a scalar
    /// `RealDouble` entry at the written location.
    pub fn set_auto_register(&mut self, enabled: bool) {
        self.auto_register = enabled;
    }

    /// Whether on-write auto-registration is enabled.
    pub fn auto_register(&self) -> bool {
        self.auto_register
    }

    /// Look up a solution definition.
    pub fn get(&self, name: &str) -> Option<&SolutionConfig> {
        self.entries.get(name)
    }

    /// Look up a solution definition or fail with *unknown-solution*.
    pub fn require(&self, name: &str) -> Result<&SolutionConfig> {
        self.entries
            .get(name)
            .ok_or_else(|| udm_error!(ErrorKind::UnknownSolution, "no solution named `{name}`"))
    }

    /// All definitions in registry (name) order.
    pub fn iter(&self) -> impl Iterator<Item = &SolutionConfig> {
        self.entries.values()
    }

    /// Definitions at `location`, in registry order.
    pub fn iter_location(&self, location: GridLocation) -> impl Iterator<Item = &SolutionConfig> {
        self.entries.values().filter(move |c| c.location == location)
    }

    /// Number of registered solutions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Typed flat component array backing one solution.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldArray {
    /// 32-bit integers.
    Integer(Vec<i32>),
    /// 64-bit integers.
    LongInteger(Vec<i64>),
    /// 32-bit floats.
    RealSingle(Vec<f32>),
    /// 64-bit floats.
    RealDouble(Vec<f64>),
}

impl FieldArray {
    /// An empty array of the given storage type.
    pub fn new(data_type: DataType) -> Self {
        match data_type {
            DataType::Integer => FieldArray::Integer(Vec::new()),
            DataType::LongInteger => FieldArray::LongInteger(Vec::new()),
            DataType::RealSingle => FieldArray::RealSingle(Vec::new()),
            DataType::RealDouble => FieldArray::RealDouble(Vec::new()),
        }
    }

    /// Component count currently stored.
    pub fn len(&self) -> usize {
        match self {
            FieldArray::Integer(v) => v.len(),
            FieldArray::LongInteger(v) => v.len(),
            FieldArray::RealSingle(v) => v.len(),
            FieldArray::RealDouble(v) => v.len(),
        }
    }

    /// True when no components are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow to at least `len` components, default-filling new slots.
    pub fn ensure_len(&mut self, len: usize) {
        match self {
            FieldArray::Integer(v) if v.len() < len => v.resize(len, 0),
            FieldArray::LongInteger(v) if v.len() < len => v.resize(len, 0),
            FieldArray::RealSingle(v) if v.len() < len => v.resize(len, 0.0),
            FieldArray::RealDouble(v) if v.len() < len => v.resize(len, 0.0),
            _ => {}
        }
    }
}

/// Value types accepted by the typed get/set accessors.
///
/// Conversions between the caller's type and the stored [`DataType`] follow
/// plain numeric casts, matching what a C caller passing `UdmReal_t` or
/// `UdmInteger_t` through the handle API would get.
pub trait SolutionValue: Copy + Default + PartialEq + std::fmt::Debug + 'static {
    /// Write `self` into `field[index]`, converting to the stored type.
    fn store(self, field: &mut FieldArray, index: usize);
    /// Read `field[index]`, converting to `Self`. Out-of-range reads return
    /// the default.
    fn load(field: &FieldArray, index: usize) -> Self;
}

macro_rules! impl_solution_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SolutionValue for $ty {
                fn store(self, field: &mut FieldArray, index: usize) {
                    match field {
                        FieldArray::Integer(v) => v[index] = self as i32,
                        FieldArray::LongInteger(v) => v[index] = self as i64,
                        FieldArray::RealSingle(v) => v[index] = self as f32,
                        FieldArray::RealDouble(v) => v[index] = self as f64,
                    }
                }

                fn load(field: &FieldArray, index: usize) -> Self {
                    match field {
                        FieldArray::Integer(v) => {
                            v.get(index).copied().unwrap_or_default() as $ty
                        }
                        FieldArray::LongInteger(v) => {
                            v.get(index).copied().unwrap_or_default() as $ty
                        }
                        FieldArray::RealSingle(v) => {
                            v.get(index).copied().unwrap_or_default() as $ty
                        }
                        FieldArray::RealDouble(v) => {
                            v.get(index).copied().unwrap_or_default() as $ty
                        }
                    }
                }
            }
        )+
    };
}

impl_solution_value!(i32, i64, f32, f64);

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Field {
    pub(crate) arity: usize,
    pub(crate) data: FieldArray,
}

/// Per-entity-kind storage for all solutions at one grid location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolutionStore {
    fields: BTreeMap<String, Field>,
}

impl SolutionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write all components of `config` for the entity at `index`.
    ///
    /// Fails with *arity-mismatch* when `values.len()` differs from the
    /// registered arity.
    pub fn set_values<T: SolutionValue>(
        &mut self,
        config: &SolutionConfig,
        index: usize,
        values: &[T],
    ) -> Result<()> {
        let arity = config.arity();
        if values.len() != arity {
            return Err(udm_error!(
                ErrorKind::ArityMismatch,
                "solution `{}` expects {} component(s), got {}",
                config.name,
                arity,
                values.len()
            ));
        }
        let field = self.fields.entry(config.name.clone()).or_insert_with(|| Field {
            arity,
            data: FieldArray::new(config.data_type),
        });
        field.data.ensure_len((index + 1) * arity);
        for (c, v) in values.iter().enumerate() {
            v.store(&mut field.data, index * arity + c);
        }
        Ok(())
    }

    /// Write a scalar solution for the entity at `index`.
    ///
    /// Fails with *arity-mismatch* when `config` is a vector solution.
    pub fn set_one<T: SolutionValue>(
        &mut self,
        config: &SolutionConfig,
        index: usize,
        value: T,
    ) -> Result<()> {
        if config.arity() != 1 {
            return Err(udm_error!(
                ErrorKind::ArityMismatch,
                "solution `{}` is a {}-vector; use the vector accessor",
                config.name,
                config.arity()
            ));
        }
        self.set_values(config, index, &[value])
    }

    /// Read all components for the entity at `index`, defaulting missing
    /// slots to zero.
    pub fn get_values<T: SolutionValue>(&self, config: &SolutionConfig, index: usize) -> Vec<T> {
        let arity = config.arity();
        match self.fields.get(&config.name) {
            Some(field) => (0..arity)
                .map(|c| T::load(&field.data, index * arity + c))
                .collect(),
            None => vec![T::default(); arity],
        }
    }

    /// Read a scalar solution for the entity at `index`.
    pub fn get_one<T: SolutionValue>(&self, config: &SolutionConfig, index: usize) -> Result<T> {
        if config.arity() != 1 {
            return Err(udm_error!(
                ErrorKind::ArityMismatch,
                "solution `{}` is a {}-vector; use the vector accessor",
                config.name,
                config.arity()
            ));
        }
        Ok(self
            .fields
            .get(&config.name)
            .map(|f| T::load(&f.data, index))
            .unwrap_or_default())
    }

    /// Read the entity's components as a native typed array (defaults when
    /// the field was never written), e.g. for wire packing.
    pub fn get_components(&self, config: &SolutionConfig, index: usize) -> FieldArray {
        let arity = config.arity();
        let field = self.fields.get(&config.name);
        macro_rules! extract {
            ($variant:ident, $zero:expr) => {{
                let mut out = Vec::with_capacity(arity);
                for c in 0..arity {
                    out.push(match field {
                        Some(Field {
                            data: FieldArray::$variant(v),
                            ..
                        }) => v.get(index * arity + c).copied().unwrap_or($zero),
                        _ => $zero,
                    });
                }
                FieldArray::$variant(out)
            }};
        }
        match config.data_type {
            DataType::Integer => extract!(Integer, 0),
            DataType::LongInteger => extract!(LongInteger, 0),
            DataType::RealSingle => extract!(RealSingle, 0.0),
            DataType::RealDouble => extract!(RealDouble, 0.0),
        }
    }

    /// Write the entity's components from a native typed array, e.g. when
    /// unpacking wire payloads. The array's variant must match the
    /// registered data type.
    pub fn set_components(
        &mut self,
        config: &SolutionConfig,
        index: usize,
        values: &FieldArray,
    ) -> Result<()> {
        let arity = config.arity();
        if values.len() != arity {
            return Err(udm_error!(
                ErrorKind::ArityMismatch,
                "solution `{}` expects {} component(s), got {}",
                config.name,
                arity,
                values.len()
            ));
        }
        let field = self.fields.entry(config.name.clone()).or_insert_with(|| Field {
            arity,
            data: FieldArray::new(config.data_type),
        });
        field.data.ensure_len((index + 1) * arity);
        match (&mut field.data, values) {
            (FieldArray::Integer(dst), FieldArray::Integer(src)) => {
                dst[index * arity..(index + 1) * arity].copy_from_slice(src);
            }
            (FieldArray::LongInteger(dst), FieldArray::LongInteger(src)) => {
                dst[index * arity..(index + 1) * arity].copy_from_slice(src);
            }
            (FieldArray::RealSingle(dst), FieldArray::RealSingle(src)) => {
                dst[index * arity..(index + 1) * arity].copy_from_slice(src);
            }
            (FieldArray::RealDouble(dst), FieldArray::RealDouble(src)) => {
                dst[index * arity..(index + 1) * arity].copy_from_slice(src);
            }
            _ => {
                return Err(udm_error!(
                    ErrorKind::ArityMismatch,
                    "solution `{}`: component storage type mismatch",
                    config.name
                ));
            }
        }
        Ok(())
    }

    /// Rebuild every field keeping only the entity rows in `keep`, in that
    /// order. Rows beyond a field's current extent materialize as defaults.
    pub fn compact(&mut self, keep: &[usize]) {
        for field in self.fields.values_mut() {
            let arity = field.arity;
            macro_rules! permute {
                ($v:expr, $zero:expr) => {{
                    let old = std::mem::take($v);
                    let mut fresh = Vec::with_capacity(keep.len() * arity);
                    for &row in keep {
                        for c in 0..arity {
                            fresh.push(old.get(row * arity + c).copied().unwrap_or($zero));
                        }
                    }
                    *$v = fresh;
                }};
            }
            match &mut field.data {
                FieldArray::Integer(v) => permute!(v, 0),
                FieldArray::LongInteger(v) => permute!(v, 0),
                FieldArray::RealSingle(v) => permute!(v, 0.0),
                FieldArray::RealDouble(v) => permute!(v, 0.0),
            }
        }
    }

    /// Drop every stored field (the registry is unaffected).
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}
