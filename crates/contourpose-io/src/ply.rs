use std::io::BufRead;
use std::path::Path;

use glam::DVec3;

use crate::error::PlyError;

/// Body encoding declared in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyEncoding {
    /// Whitespace separated text, one element per line.
    Ascii,
    /// Packed little endian values.
    BinaryLittleEndian,
}

/// Scalar type of a PLY property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyDataType {
    /// Signed 8-bit integer.
    Int8,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
}

impl PlyDataType {
    fn parse(type_str: &str) -> Result<Self, PlyError> {
        match type_str {
            "float" | "float32" => Ok(Self::Float32),
            "double" | "float64" => Ok(Self::Float64),
            "char" | "int8" => Ok(Self::Int8),
            "uchar" | "uint8" => Ok(Self::UInt8),
            "short" | "int16" => Ok(Self::Int16),
            "ushort" | "uint16" => Ok(Self::UInt16),
            "int" | "int32" => Ok(Self::Int32),
            "uint" | "uint32" => Ok(Self::UInt32),
            other => Err(PlyError::UnsupportedProperty(other.to_string())),
        }
    }

    /// Size in bytes of one binary value.
    pub fn size_of(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Decode one little endian value; `bytes` must hold [`Self::size_of`] bytes.
    fn decode_le(&self, bytes: &[u8]) -> f64 {
        let mut b8 = [0u8; 8];
        b8[..bytes.len()].copy_from_slice(bytes);
        match self {
            Self::Int8 => i8::from_le_bytes([b8[0]]) as f64,
            Self::UInt8 => b8[0] as f64,
            Self::Int16 => i16::from_le_bytes([b8[0], b8[1]]) as f64,
            Self::UInt16 => u16::from_le_bytes([b8[0], b8[1]]) as f64,
            Self::Int32 => i32::from_le_bytes([b8[0], b8[1], b8[2], b8[3]]) as f64,
            Self::UInt32 => u32::from_le_bytes([b8[0], b8[1], b8[2], b8[3]]) as f64,
            Self::Float32 => f32::from_le_bytes([b8[0], b8[1], b8[2], b8[3]]) as f64,
            Self::Float64 => f64::from_le_bytes(b8),
        }
    }
}

/// A property declared for an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlyProperty {
    /// A single value.
    Scalar {
        /// Property name.
        name: String,
        /// Value type.
        data_type: PlyDataType,
    },
    /// A length-prefixed list, e.g. face vertex indices.
    List {
        /// Property name.
        name: String,
        /// Type of the length prefix.
        count_type: PlyDataType,
        /// Type of the list items.
        item_type: PlyDataType,
    },
}

impl PlyProperty {
    fn name(&self) -> &str {
        match self {
            Self::Scalar { name, .. } | Self::List { name, .. } => name,
        }
    }
}

/// An element block declared in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyElement {
    /// Element name, e.g. `vertex` or `face`.
    pub name: String,
    /// Number of rows.
    pub count: usize,
    /// Properties of each row, in file order.
    pub properties: Vec<PlyProperty>,
}

/// Parsed PLY header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    /// Body encoding.
    pub encoding: PlyEncoding,
    /// Declared elements, in file order.
    pub elements: Vec<PlyElement>,
}

/// Parse the header, leaving the reader at the start of the body.
pub fn read_ply_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, PlyError> {
    let mut line = String::new();
    let mut encoding = None;
    let mut elements: Vec<PlyElement> = Vec::new();

    if reader.read_line(&mut line)? == 0 || line.trim() != "ply" {
        return Err(PlyError::InvalidHeader("missing ply magic".into()));
    }

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::InvalidHeader("missing end_header".into()));
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["end_header"] => break,
            ["comment", ..] | ["obj_info", ..] | [] => {}
            ["format", kind, _version] => {
                encoding = Some(match *kind {
                    "ascii" => PlyEncoding::Ascii,
                    "binary_little_endian" => PlyEncoding::BinaryLittleEndian,
                    other => return Err(PlyError::UnsupportedFormat(other.to_string())),
                });
            }
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| PlyError::InvalidHeader(format!("bad element count {count}")))?;
                elements.push(PlyElement {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count_type, item_type, name] => {
                let property = PlyProperty::List {
                    name: name.to_string(),
                    count_type: PlyDataType::parse(count_type)?,
                    item_type: PlyDataType::parse(item_type)?,
                };
                elements
                    .last_mut()
                    .ok_or_else(|| PlyError::InvalidHeader("property before element".into()))?
                    .properties
                    .push(property);
            }
            ["property", data_type, name] => {
                let property = PlyProperty::Scalar {
                    name: name.to_string(),
                    data_type: PlyDataType::parse(data_type)?,
                };
                elements
                    .last_mut()
                    .ok_or_else(|| PlyError::InvalidHeader("property before element".into()))?
                    .properties
                    .push(property);
            }
            _ => return Err(PlyError::InvalidHeader(line.trim().to_string())),
        }
    }

    let encoding = encoding.ok_or_else(|| PlyError::InvalidHeader("missing format".into()))?;
    Ok(PlyHeader { encoding, elements })
}

/// Row-by-row access to the PLY body.
struct RowReader<'a, R> {
    reader: &'a mut R,
    encoding: PlyEncoding,
    line: String,
    scratch: Vec<u8>,
}

impl<R: BufRead> RowReader<'_, R> {
    /// Read one row; `out` receives the scalar values, lists are skipped.
    fn read_row(&mut self, element: &PlyElement, out: &mut Vec<f64>) -> Result<(), PlyError> {
        out.clear();
        match self.encoding {
            PlyEncoding::Ascii => self.read_ascii_row(element, out),
            PlyEncoding::BinaryLittleEndian => self.read_binary_row(element, out),
        }
    }

    fn read_ascii_row(&mut self, element: &PlyElement, out: &mut Vec<f64>) -> Result<(), PlyError> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Err(PlyError::UnexpectedEof(element.name.clone()));
        }
        let invalid = |value: &str| PlyError::InvalidValue {
            element: element.name.clone(),
            value: value.to_string(),
        };
        let mut tokens = self.line.split_whitespace();
        let mut next = || {
            tokens
                .next()
                .ok_or_else(|| PlyError::UnexpectedEof(element.name.clone()))
                .and_then(|t| t.parse::<f64>().map_err(|_| invalid(t)))
        };
        for property in &element.properties {
            match property {
                PlyProperty::Scalar { .. } => out.push(next()?),
                PlyProperty::List { .. } => {
                    let len = next()?;
                    for _ in 0..len as usize {
                        next()?;
                    }
                }
            }
        }
        Ok(())
    }

    fn read_binary_row(&mut self, element: &PlyElement, out: &mut Vec<f64>) -> Result<(), PlyError> {
        let eof = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                PlyError::UnexpectedEof(element.name.clone())
            } else {
                PlyError::Io(e)
            }
        };
        for property in &element.properties {
            match property {
                PlyProperty::Scalar { data_type, .. } => {
                    self.scratch.resize(data_type.size_of(), 0);
                    self.reader.read_exact(&mut self.scratch).map_err(eof)?;
                    out.push(data_type.decode_le(&self.scratch));
                }
                PlyProperty::List {
                    count_type,
                    item_type,
                    ..
                } => {
                    self.scratch.resize(count_type.size_of(), 0);
                    self.reader.read_exact(&mut self.scratch).map_err(eof)?;
                    let len = count_type.decode_le(&self.scratch) as usize;
                    self.scratch.resize(len * item_type.size_of(), 0);
                    self.reader.read_exact(&mut self.scratch).map_err(eof)?;
                }
            }
        }
        Ok(())
    }
}

/// Read the vertex positions of a PLY stream.
///
/// Other vertex properties and all other elements are ignored.
pub fn read_ply_points_from<R: BufRead>(reader: &mut R) -> Result<Vec<DVec3>, PlyError> {
    let header = read_ply_header(reader)?;
    let mut rows = RowReader {
        reader,
        encoding: header.encoding,
        line: String::new(),
        scratch: Vec::new(),
    };
    let mut values = Vec::new();

    for element in &header.elements {
        if element.name != "vertex" {
            for _ in 0..element.count {
                rows.read_row(element, &mut values)?;
            }
            continue;
        }

        let scalars: Vec<&str> = element
            .properties
            .iter()
            .filter(|p| matches!(p, PlyProperty::Scalar { .. }))
            .map(PlyProperty::name)
            .collect();
        let column = |axis: &'static str| {
            scalars
                .iter()
                .position(|&n| n == axis)
                .ok_or(PlyError::MissingCoordinate(axis))
        };
        let (ix, iy, iz) = (column("x")?, column("y")?, column("z")?);

        let mut points = Vec::with_capacity(element.count);
        for _ in 0..element.count {
            rows.read_row(element, &mut values)?;
            points.push(DVec3::new(values[ix], values[iy], values[iz]));
        }
        return Ok(points);
    }

    Err(PlyError::InvalidHeader("no vertex element".into()))
}

/// Read the vertex positions of a PLY file, ascii or binary little endian.
pub fn read_ply_points(path: impl AsRef<Path>) -> Result<Vec<DVec3>, PlyError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    read_ply_points_from(&mut reader)
}
