//! DFI text configuration: parsing, typed views, and serialization.
//!
//! A DFI document is a hierarchy of labeled blocks holding `key = value`
//! entries:
//!
//! ```text
//! FileInfo {
//!   DFIType = "Uns"
//!   Prefix  = "model"
//! }
//! TimeSlice {
//!   Slice[@] { Step = 0  Time = 0.0 }
//! }
//! ```
//!
//! [`DfiTree`] is the raw parsed hierarchy; [`DfiConfig`] is the typed view
//! the model consumes: file layout, unit system, time-slice history, the
//! flow-solution registry seed, domain/process descriptors, and the
//! partition knobs. Unknown labels and keys are preserved in the tree but
//! ignored by the typed view. Parse failures report *config-parse* with the
//! offending line.

use crate::error::{ErrorKind, Result};
use crate::solution::{DataType, GridLocation, SolutionConfig, VectorType};
use crate::udm_error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

// |----------------|
// | Raw block tree |
// |----------------|

/// One labeled block: entries plus nested blocks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DfiTree {
    /// Block label; empty for the document root.
    pub label: String,
    /// `key = value` entries in document order (quotes stripped).
    pub entries: Vec<(String, String)>,
    /// Nested blocks in document order.
    pub children: Vec<DfiTree>,
}

impl DfiTree {
    /// Parse a DFI document.
    pub fn parse(text: &str) -> Result<DfiTree> {
        let open = Regex::new(r"^([A-Za-z_][A-Za-z0-9_#]*)(\[@\])?\s*\{$").unwrap();
        let kv = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").unwrap();

        let mut stack: Vec<DfiTree> = vec![DfiTree::default()];
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
                continue;
            }
            if let Some(caps) = open.captures(line) {
                stack.push(DfiTree {
                    label: caps[1].to_string(),
                    ..Default::default()
                });
            } else if line == "}" {
                let done = stack.pop().ok_or_else(|| {
                    udm_error!(ErrorKind::ConfigParse, "line {}: unmatched `}}`", lineno + 1)
                })?;
                let parent = stack.last_mut().ok_or_else(|| {
                    udm_error!(ErrorKind::ConfigParse, "line {}: unmatched `}}`", lineno + 1)
                })?;
                parent.children.push(done);
            } else if let Some(caps) = kv.captures(line) {
                let value = caps[2].trim().trim_matches('"').to_string();
                stack
                    .last_mut()
                    .expect("root block always present")
                    .entries
                    .push((caps[1].to_string(), value));
            } else {
                return Err(udm_error!(
                    ErrorKind::ConfigParse,
                    "line {}: cannot parse `{line}`",
                    lineno + 1
                ));
            }
        }
        if stack.len() != 1 {
            return Err(udm_error!(
                ErrorKind::ConfigParse,
                "unclosed block `{}`",
                stack.last().map(|b| b.label.as_str()).unwrap_or("")
            ));
        }
        Ok(stack.pop().expect("root survives"))
    }

    /// First child block with the given label.
    pub fn child(&self, label: &str) -> Option<&DfiTree> {
        self.children.iter().find(|c| c.label == label)
    }

    /// All child blocks with the given label, in document order.
    pub fn children_named<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a DfiTree> {
        self.children.iter().filter(move |c| c.label == label)
    }

    /// First value of `key` in this block.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize back to DFI text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out, 0);
        out
    }

    fn write_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        let inner = if self.label.is_empty() {
            depth
        } else {
            out.push_str(&format!("{pad}{} {{\n", self.label));
            depth + 1
        };
        let inner_pad = "  ".repeat(inner);
        for (k, v) in &self.entries {
            if v.parse::<f64>().is_ok() || v == "true" || v == "false" {
                out.push_str(&format!("{inner_pad}{k} = {v}\n"));
            } else {
                out.push_str(&format!("{inner_pad}{k} = \"{v}\"\n"));
            }
        }
        for child in &self.children {
            child.write_into(out, inner);
        }
        if !self.label.is_empty() {
            out.push_str(&format!("{pad}}}\n"));
        }
    }
}

// |-------------|
// | Typed views |
// |-------------|

/// `/FileInfo/FieldFilenameFormat` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FieldFilenameFormat {
    /// `<prefix>_<step>_<rank>`.
    #[default]
    StepRank,
    /// `<prefix>_<rank>_<step>`.
    RankStep,
    /// Free `printf`-style pattern.
    Printf,
}

impl FieldFilenameFormat {
    /// Parse the DFI spelling.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "step_rank" => FieldFilenameFormat::StepRank,
            "rank_step" => FieldFilenameFormat::RankStep,
            "printf" => FieldFilenameFormat::Printf,
            _ => return None,
        })
    }

    /// The DFI spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldFilenameFormat::StepRank => "step_rank",
            FieldFilenameFormat::RankStep => "rank_step",
            FieldFilenameFormat::Printf => "printf",
        }
    }
}

/// `/FileInfo/FileCompositionType` flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileCompositionType {
    IncludeGrid,
    ExcludeGrid,
    AppendStep,
    EachStep,
    GridConstant,
    GridTimeSlice,
}

impl FileCompositionType {
    /// Parse the DFI spelling.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "IncludeGrid" => FileCompositionType::IncludeGrid,
            "ExcludeGrid" => FileCompositionType::ExcludeGrid,
            "AppendStep" => FileCompositionType::AppendStep,
            "EachStep" => FileCompositionType::EachStep,
            "GridConstant" => FileCompositionType::GridConstant,
            "GridTimeSlice" => FileCompositionType::GridTimeSlice,
            _ => return None,
        })
    }

    /// The DFI spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            FileCompositionType::IncludeGrid => "IncludeGrid",
            FileCompositionType::ExcludeGrid => "ExcludeGrid",
            FileCompositionType::AppendStep => "AppendStep",
            FileCompositionType::EachStep => "EachStep",
            FileCompositionType::GridConstant => "GridConstant",
            FileCompositionType::GridTimeSlice => "GridTimeSlice",
        }
    }
}

/// `/FileInfo` block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub dfi_type: String,
    pub directory_path: String,
    pub time_slice_directory: bool,
    pub prefix: String,
    pub file_format: String,
    pub field_filename_format: FieldFilenameFormat,
    pub file_composition: Vec<FileCompositionType>,
}

impl Default for FileInfo {
    fn default() -> Self {
        Self {
            dfi_type: "Uns".into(),
            directory_path: "field".into(),
            time_slice_directory: false,
            prefix: "model".into(),
            file_format: "cgns".into(),
            field_filename_format: FieldFilenameFormat::default(),
            file_composition: vec![FileCompositionType::IncludeGrid],
        }
    }
}

/// One `/UnitList` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitEntry {
    /// Quantity name (`Length`, `Pressure`, ...).
    pub name: String,
    /// Unit string (`m`, `Pa`, ...).
    pub unit: String,
    /// Reference value.
    pub reference: f64,
    /// Optional difference value.
    pub difference: Option<f64>,
}

/// One `/TimeSlice/Slice[]` record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SliceRecord {
    pub step: u32,
    pub time: f64,
    pub average_step: Option<u32>,
    pub average_time: Option<f64>,
}

/// One `/FlowSolutionList` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowSolutionEntry {
    pub name: String,
    pub grid_location: GridLocation,
    pub data_type: DataType,
    pub vector_type: VectorType,
    pub nvector_size: usize,
    pub constant: bool,
}

impl FlowSolutionEntry {
    /// Convert to a registry entry.
    pub fn to_solution_config(&self) -> SolutionConfig {
        SolutionConfig {
            name: self.name.clone(),
            location: self.grid_location,
            data_type: self.data_type,
            vector_type: self.vector_type,
            nvector: self.nvector_size,
            constant: self.constant,
        }
    }
}

/// `/Domain` block of proc.dfi.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub cell_dimension: u8,
    pub vertex_size: u64,
    pub cell_size: u64,
}

/// `/UDMlib/partition` knobs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct PartitionKnobs {
    pub debug_level: u32,
    pub mxm_partition: bool,
}

/// The typed configuration a model consumes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct DfiConfig {
    pub file_info: FileInfo,
    /// `/FilePath/Process`: path of the process file.
    pub process_file: Option<String>,
    pub units: Vec<UnitEntry>,
    pub time_slices: Vec<SliceRecord>,
    pub solutions: Vec<FlowSolutionEntry>,
    pub domain: Option<DomainInfo>,
    /// `/MPI/NumberOfRank`.
    pub number_of_rank: Option<u32>,
    /// `/Process/Rank[]/ID` values.
    pub process_ranks: Vec<u32>,
    pub partition: PartitionKnobs,
}

fn parse_num<T: std::str::FromStr>(block: &str, key: &str, v: &str) -> Result<T> {
    v.parse::<T>().map_err(|_| {
        udm_error!(
            ErrorKind::ConfigParse,
            "{block}/{key}: `{v}` is not a valid number"
        )
    })
}

fn parse_bool(v: &str) -> bool {
    matches!(v, "true" | "True" | "on" | "1")
}

impl DfiConfig {
    /// Parse a DFI document into the typed view.
    pub fn parse_str(text: &str) -> Result<Self> {
        let tree = DfiTree::parse(text)?;
        let mut config = DfiConfig::default();

        if let Some(fi) = tree.child("FileInfo") {
            let d = FileInfo::default();
            let mut info = FileInfo {
                dfi_type: fi.value("DFIType").unwrap_or(&d.dfi_type).to_string(),
                directory_path: fi
                    .value("DirectoryPath")
                    .unwrap_or(&d.directory_path)
                    .to_string(),
                time_slice_directory: fi
                    .value("TimeSliceDirectory")
                    .map(parse_bool)
                    .unwrap_or(d.time_slice_directory),
                prefix: fi.value("Prefix").unwrap_or(&d.prefix).to_string(),
                file_format: fi.value("FileFormat").unwrap_or(&d.file_format).to_string(),
                field_filename_format: d.field_filename_format,
                file_composition: d.file_composition,
            };
            if let Some(v) = fi.value("FieldFilenameFormat") {
                info.field_filename_format = FieldFilenameFormat::parse(v).ok_or_else(|| {
                    udm_error!(
                        ErrorKind::ConfigParse,
                        "FileInfo/FieldFilenameFormat: unknown value `{v}`"
                    )
                })?;
            }
            if let Some(v) = fi.value("FileCompositionType") {
                let mut flags = Vec::new();
                for part in v.split([',', ' ']).filter(|p| !p.is_empty()) {
                    flags.push(FileCompositionType::parse(part).ok_or_else(|| {
                        udm_error!(
                            ErrorKind::ConfigParse,
                            "FileInfo/FileCompositionType: unknown value `{part}`"
                        )
                    })?);
                }
                info.file_composition = flags;
            }
            config.file_info = info;
        }

        if let Some(fp) = tree.child("FilePath") {
            config.process_file = fp.value("Process").map(str::to_string);
        }

        if let Some(units) = tree.child("UnitList") {
            for u in &units.children {
                let reference = match u.value("Reference") {
                    Some(v) => parse_num("UnitList", "Reference", v)?,
                    None => 0.0,
                };
                let difference = match u.value("Difference") {
                    Some(v) => Some(parse_num("UnitList", "Difference", v)?),
                    None => None,
                };
                config.units.push(UnitEntry {
                    name: u.label.clone(),
                    unit: u.value("Unit").unwrap_or("").to_string(),
                    reference,
                    difference,
                });
            }
        }

        if let Some(ts) = tree.child("TimeSlice") {
            for slice in ts.children_named("Slice") {
                let step = match slice.value("Step") {
                    Some(v) => parse_num("TimeSlice/Slice", "Step", v)?,
                    None => {
                        return Err(udm_error!(
                            ErrorKind::ConfigParse,
                            "TimeSlice/Slice: missing Step"
                        ));
                    }
                };
                let time = match slice.value("Time") {
                    Some(v) => parse_num("TimeSlice/Slice", "Time", v)?,
                    None => 0.0,
                };
                let average_step = match slice.value("AverageStep") {
                    Some(v) => Some(parse_num("TimeSlice/Slice", "AverageStep", v)?),
                    None => None,
                };
                let average_time = match slice.value("AverageTime") {
                    Some(v) => Some(parse_num("TimeSlice/Slice", "AverageTime", v)?),
                    None => None,
                };
                config.time_slices.push(SliceRecord {
                    step,
                    time,
                    average_step,
                    average_time,
                });
            }
        }

        if let Some(fsl) = tree.child("FlowSolutionList") {
            for s in &fsl.children {
                let location = match s.value("GridLocation") {
                    Some("Vertex") | None => GridLocation::Vertex,
                    Some("CellCenter") => GridLocation::CellCenter,
                    Some(other) => {
                        return Err(udm_error!(
                            ErrorKind::ConfigParse,
                            "FlowSolutionList/{}/GridLocation: unknown value `{other}`",
                            s.label
                        ));
                    }
                };
                let data_type = match s.value("DataType") {
                    Some(v) => DataType::parse(v).ok_or_else(|| {
                        udm_error!(
                            ErrorKind::ConfigParse,
                            "FlowSolutionList/{}/DataType: unknown value `{v}`",
                            s.label
                        )
                    })?,
                    None => DataType::RealDouble,
                };
                let vector_type = match s.value("VectorType") {
                    Some("Vector") => VectorType::Vector,
                    _ => VectorType::Scalar,
                };
                let nvector_size = match s.value("NvectorSize") {
                    Some(v) => parse_num("FlowSolutionList", "NvectorSize", v)?,
                    None => {
                        if vector_type == VectorType::Vector {
                            3
                        } else {
                            1
                        }
                    }
                };
                config.solutions.push(FlowSolutionEntry {
                    name: s.label.clone(),
                    grid_location: location,
                    data_type,
                    vector_type,
                    nvector_size,
                    constant: s.value("Constant").map(parse_bool).unwrap_or(false),
                });
            }
        }

        if let Some(d) = tree.child("Domain") {
            config.domain = Some(DomainInfo {
                cell_dimension: match d.value("CellDimension") {
                    Some(v) => parse_num("Domain", "CellDimension", v)?,
                    None => 3,
                },
                vertex_size: match d.value("VertexSize") {
                    Some(v) => parse_num("Domain", "VertexSize", v)?,
                    None => 0,
                },
                cell_size: match d.value("CellSize") {
                    Some(v) => parse_num("Domain", "CellSize", v)?,
                    None => 0,
                },
            });
        }

        if let Some(mpi) = tree.child("MPI") {
            if let Some(v) = mpi.value("NumberOfRank") {
                config.number_of_rank = Some(parse_num("MPI", "NumberOfRank", v)?);
            }
        }

        if let Some(proc) = tree.child("Process") {
            for rank in proc.children_named("Rank") {
                if let Some(v) = rank.value("ID") {
                    config.process_ranks.push(parse_num("Process/Rank", "ID", v)?);
                }
            }
        }

        if let Some(udm) = tree.child("UDMlib") {
            if let Some(part) = udm.child("partition") {
                if let Some(v) = part.value("DEBUG_LEVEL") {
                    config.partition.debug_level = parse_num("UDMlib/partition", "DEBUG_LEVEL", v)?;
                }
                if let Some(v) = part.value("MxM_PARTITION") {
                    config.partition.mxm_partition = parse_bool(v);
                }
            }
        }

        Ok(config)
    }

    /// Load and parse a DFI file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            udm_error!(
                ErrorKind::ContainerIo,
                "cannot read `{}`: {e}",
                path.display()
            )
        })?;
        Self::parse_str(&text)
    }

    /// Serialize to DFI text.
    pub fn to_text(&self) -> String {
        let mut root = DfiTree::default();

        let mut fi = DfiTree {
            label: "FileInfo".into(),
            ..Default::default()
        };
        fi.entries.push(("DFIType".into(), self.file_info.dfi_type.clone()));
        fi.entries
            .push(("DirectoryPath".into(), self.file_info.directory_path.clone()));
        fi.entries.push((
            "TimeSliceDirectory".into(),
            self.file_info.time_slice_directory.to_string(),
        ));
        fi.entries.push(("Prefix".into(), self.file_info.prefix.clone()));
        fi.entries
            .push(("FileFormat".into(), self.file_info.file_format.clone()));
        fi.entries.push((
            "FieldFilenameFormat".into(),
            self.file_info.field_filename_format.as_str().into(),
        ));
        fi.entries.push((
            "FileCompositionType".into(),
            self.file_info
                .file_composition
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(","),
        ));
        root.children.push(fi);

        if let Some(process) = &self.process_file {
            root.children.push(DfiTree {
                label: "FilePath".into(),
                entries: vec![("Process".into(), process.clone())],
                ..Default::default()
            });
        }

        if !self.units.is_empty() {
            let mut units = DfiTree {
                label: "UnitList".into(),
                ..Default::default()
            };
            for u in &self.units {
                let mut block = DfiTree {
                    label: u.name.clone(),
                    entries: vec![
                        ("Unit".into(), u.unit.clone()),
                        ("Reference".into(), u.reference.to_string()),
                    ],
                    ..Default::default()
                };
                if let Some(d) = u.difference {
                    block.entries.push(("Difference".into(), d.to_string()));
                }
                units.children.push(block);
            }
            root.children.push(units);
        }

        if !self.time_slices.is_empty() {
            let mut ts = DfiTree {
                label: "TimeSlice".into(),
                ..Default::default()
            };
            for s in &self.time_slices {
                let mut block = DfiTree {
                    label: "Slice".into(),
                    entries: vec![
                        ("Step".into(), s.step.to_string()),
                        ("Time".into(), s.time.to_string()),
                    ],
                    ..Default::default()
                };
                if let Some(v) = s.average_step {
                    block.entries.push(("AverageStep".into(), v.to_string()));
                }
                if let Some(v) = s.average_time {
                    block.entries.push(("AverageTime".into(), v.to_string()));
                }
                ts.children.push(block);
            }
            root.children.push(ts);
        }

        if !self.solutions.is_empty() {
            let mut fsl = DfiTree {
                label: "FlowSolutionList".into(),
                ..Default::default()
            };
            for s in &self.solutions {
                let location = match s.grid_location {
                    GridLocation::Vertex => "Vertex",
                    GridLocation::CellCenter => "CellCenter",
                };
                let vector = match s.vector_type {
                    VectorType::Scalar => "Scalar",
                    VectorType::Vector => "Vector",
                };
                fsl.children.push(DfiTree {
                    label: s.name.clone(),
                    entries: vec![
                        ("GridLocation".into(), location.into()),
                        ("DataType".into(), s.data_type.as_str().into()),
                        ("VectorType".into(), vector.into()),
                        ("NvectorSize".into(), s.nvector_size.to_string()),
                        ("Constant".into(), s.constant.to_string()),
                    ],
                    ..Default::default()
                });
            }
            root.children.push(fsl);
        }

        if let Some(d) = &self.domain {
            root.children.push(DfiTree {
                label: "Domain".into(),
                entries: vec![
                    ("CellDimension".into(), d.cell_dimension.to_string()),
                    ("VertexSize".into(), d.vertex_size.to_string()),
                    ("CellSize".into(), d.cell_size.to_string()),
                ],
                ..Default::default()
            });
        }

        if let Some(n) = self.number_of_rank {
            root.children.push(DfiTree {
                label: "MPI".into(),
                entries: vec![("NumberOfRank".into(), n.to_string())],
                ..Default::default()
            });
        }

        if !self.process_ranks.is_empty() {
            let mut proc = DfiTree {
                label: "Process".into(),
                ..Default::default()
            };
            for &id in &self.process_ranks {
                proc.children.push(DfiTree {
                    label: "Rank".into(),
                    entries: vec![("ID".into(), id.to_string())],
                    ..Default::default()
                });
            }
            root.children.push(proc);
        }

        let mut partition = DfiTree {
            label: "partition".into(),
            entries: vec![
                ("DEBUG_LEVEL".into(), self.partition.debug_level.to_string()),
                (
                    "MxM_PARTITION".into(),
                    self.partition.mxm_partition.to_string(),
                ),
            ],
            ..Default::default()
        };
        root.children.push(DfiTree {
            label: "UDMlib".into(),
            children: vec![std::mem::take(&mut partition)],
            ..Default::default()
        });

        root.to_text()
    }

    /// Write the DFI text form to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text()).map_err(|e| {
            udm_error!(
                ErrorKind::ContainerIo,
                "cannot write `{}`: {e}",
                path.display()
            )
        })
    }

    /// Set (or replace) a unit entry.
    pub fn set_unit(&mut self, name: &str, unit: &str, reference: f64, difference: Option<f64>) {
        if let Some(entry) = self.units.iter_mut().find(|u| u.name == name) {
            entry.unit = unit.to_string();
            entry.reference = reference;
            entry.difference = difference;
        } else {
            self.units.push(UnitEntry {
                name: name.to_string(),
                unit: unit.to_string(),
                reference,
                difference,
            });
        }
    }

    /// Look up a unit entry.
    pub fn unit(&self, name: &str) -> Option<&UnitEntry> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Append a time-slice record.
    pub fn add_time_slice(&mut self, step: u32, time: f64) {
        self.time_slices.push(SliceRecord {
            step,
            time,
            average_step: None,
            average_time: None,
        });
    }

    /// Append a time-slice record with averaging metadata.
    pub fn add_time_slice_average(
        &mut self,
        step: u32,
        time: f64,
        average_step: u32,
        average_time: f64,
    ) {
        self.time_slices.push(SliceRecord {
            step,
            time,
            average_step: Some(average_step),
            average_time: Some(average_time),
        });
    }

    /// Registry entries seeded by `/FlowSolutionList`.
    pub fn solution_configs(&self) -> Vec<SolutionConfig> {
        self.solutions.iter().map(|s| s.to_solution_config()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
FileInfo {
  DFIType             = "Uns"
  DirectoryPath       = "field"
  TimeSliceDirectory  = "false"
  Prefix              = "duct"
  FileFormat          = "cgns"
  FieldFilenameFormat = "step_rank"
  FileCompositionType = "IncludeGrid"
}
FilePath {
  Process = "proc.dfi"
}
UnitList {
  Length {
    Unit      = "m"
    Reference = 1.0
  }
  Pressure {
    Unit       = "Pa"
    Reference  = 0.0
    Difference = 101325.0
  }
}
TimeSlice {
  Slice[@] {
    Step = 0
    Time = 0.0
  }
  Slice[@] {
    Step        = 10
    Time        = 0.5
    AverageStep = 5
    AverageTime = 0.25
  }
}
FlowSolutionList {
  Pressure {
    GridLocation = "Vertex"
    DataType     = "RealSingle"
    VectorType   = "Scalar"
    Constant     = "false"
  }
  Velocity {
    GridLocation = "Vertex"
    DataType     = "RealDouble"
    VectorType   = "Vector"
    NvectorSize  = 3
    Constant     = "false"
  }
}
Domain {
  CellDimension = 3
  VertexSize    = 27
  CellSize      = 8
}
MPI {
  NumberOfRank = 2
}
Process {
  Rank[@] {
    ID = 0
  }
  Rank[@] {
    ID = 1
  }
}
UDMlib {
  partition {
    DEBUG_LEVEL   = 1
    MxM_PARTITION = "false"
  }
}
"#;

    #[test]
    fn parses_every_recognized_block() {
        let config = DfiConfig::parse_str(SAMPLE).unwrap();
        assert_eq!(config.file_info.prefix, "duct");
        assert_eq!(
            config.file_info.field_filename_format,
            FieldFilenameFormat::StepRank
        );
        assert_eq!(config.process_file.as_deref(), Some("proc.dfi"));
        assert_eq!(config.units.len(), 2);
        assert_eq!(config.unit("Pressure").unwrap().difference, Some(101325.0));
        assert_eq!(config.time_slices.len(), 2);
        assert_eq!(config.time_slices[1].average_step, Some(5));
        assert_eq!(config.solutions.len(), 2);
        assert_eq!(config.solutions[1].nvector_size, 3);
        assert_eq!(config.domain.unwrap().cell_size, 8);
        assert_eq!(config.number_of_rank, Some(2));
        assert_eq!(config.process_ranks, vec![0, 1]);
        assert_eq!(config.partition.debug_level, 1);
    }

    #[test]
    fn text_roundtrip_preserves_typed_view() {
        let config = DfiConfig::parse_str(SAMPLE).unwrap();
        let back = DfiConfig::parse_str(&config.to_text()).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn bad_syntax_reports_line() {
        let err = DfiConfig::parse_str("FileInfo {\n  what even\n}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigParse);
        assert!(err.message().contains("line 2"));
    }

    #[test]
    fn unclosed_block_is_rejected() {
        let err = DfiConfig::parse_str("FileInfo {\n  Prefix = \"x\"\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigParse);
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let text = "FileInfo {\n  FieldFilenameFormat = \"sideways\"\n}";
        let err = DfiConfig::parse_str(text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigParse);
    }

    #[test]
    fn solution_entries_seed_the_registry() {
        let config = DfiConfig::parse_str(SAMPLE).unwrap();
        let configs = config.solution_configs();
        assert_eq!(configs[1].arity(), 3);
        assert_eq!(configs[0].data_type, DataType::RealSingle);
    }
}
