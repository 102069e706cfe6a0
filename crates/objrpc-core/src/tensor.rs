//! Multi-dimensional numeric arrays and their `.npy` binary form.
//!
//! The `ndarray` tag carries a base64 string of the NumPy `.npy` format:
//!
//! ```text
//! [\x93NUMPY][major u8][minor u8][header len: u16 LE (v1) | u32 LE (v2, v3)]
//! [header: python dict literal, space padded to 64 bytes, '\n'][raw elements]
//! ```
//!
//! Arrays are always written as version 3.0, little-endian, C order.
//! Reading also accepts versions 1 and 2, big-endian descriptors and
//! Fortran-order payloads, which are normalized on the way in.

use crate::value::Complex;
use crate::{Result, RpcError};
use byteorder::{ByteOrder, LittleEndian};

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGN: usize = 64;

/// Element type of an [`NdArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Complex of two `f32`.
    C64,
    /// Complex of two `f64`.
    C128,
}

impl DType {
    pub const ALL: [DType; 13] = [
        DType::Bool,
        DType::I8,
        DType::U8,
        DType::I16,
        DType::U16,
        DType::I32,
        DType::U32,
        DType::I64,
        DType::U64,
        DType::F32,
        DType::F64,
        DType::C64,
        DType::C128,
    ];

    /// Size of a single element in bytes.
    pub fn item_size(self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 | DType::C64 => 8,
            DType::C128 => 16,
        }
    }

    /// NumPy type name (`uint8`, `float64`, ...).
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "int8",
            DType::U8 => "uint8",
            DType::I16 => "int16",
            DType::U16 => "uint16",
            DType::I32 => "int32",
            DType::U32 => "uint32",
            DType::I64 => "int64",
            DType::U64 => "uint64",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::C64 => "complex64",
            DType::C128 => "complex128",
        }
    }

    /// Little-endian `descr` string as written in `.npy` headers.
    pub fn descr(self) -> &'static str {
        match self {
            DType::Bool => "|b1",
            DType::I8 => "|i1",
            DType::U8 => "|u1",
            DType::I16 => "<i2",
            DType::U16 => "<u2",
            DType::I32 => "<i4",
            DType::U32 => "<u4",
            DType::I64 => "<i8",
            DType::U64 => "<u8",
            DType::F32 => "<f4",
            DType::F64 => "<f8",
            DType::C64 => "<c8",
            DType::C128 => "<c16",
        }
    }

    /// Parse a `descr` string, returning the type and whether its
    /// payload is big-endian.
    fn parse_descr(descr: &str) -> Result<(DType, bool)> {
        let mut chars = descr.chars();
        let (order, rest) = match chars.next() {
            Some(c @ ('<' | '>' | '|' | '=')) => (c, chars.as_str()),
            _ => ('=', descr),
        };
        let dtype = match rest {
            "b1" | "?" => DType::Bool,
            "i1" => DType::I8,
            "u1" => DType::U8,
            "i2" => DType::I16,
            "u2" => DType::U16,
            "i4" => DType::I32,
            "u4" => DType::U32,
            "i8" => DType::I64,
            "u8" => DType::U64,
            "f4" => DType::F32,
            "f8" => DType::F64,
            "c8" => DType::C64,
            "c16" => DType::C128,
            _ => return Err(RpcError::tensor(format!("unsupported dtype '{}'", descr))),
        };
        let big_endian = match order {
            '>' => true,
            '=' => cfg!(target_endian = "big"),
            _ => false,
        };
        Ok((dtype, big_endian))
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A Rust scalar that can be stored in an [`NdArray`].
pub trait Element: Copy {
    const DTYPE: DType;

    fn write_le(self, out: &mut Vec<u8>);

    /// Read one element from exactly `DTYPE.item_size()` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident, $read:ident, $write:ident);* $(;)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn write_le(self, out: &mut Vec<u8>) {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    LittleEndian::$write(&mut buf, self);
                    out.extend_from_slice(&buf);
                }

                fn read_le(bytes: &[u8]) -> Self {
                    LittleEndian::$read(bytes)
                }
            }
        )*
    };
}

impl_element! {
    i16 => I16, read_i16, write_i16;
    u16 => U16, read_u16, write_u16;
    i32 => I32, read_i32, write_i32;
    u32 => U32, read_u32, write_u32;
    i64 => I64, read_i64, write_i64;
    u64 => U64, read_u64, write_u64;
    f32 => F32, read_f32, write_f32;
    f64 => F64, read_f64, write_f64;
}

impl Element for i8 {
    const DTYPE: DType = DType::I8;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl Element for Complex {
    const DTYPE: DType = DType::C128;

    fn write_le(self, out: &mut Vec<u8>) {
        let mut buf = [0u8; 16];
        LittleEndian::write_f64(&mut buf[..8], self.re);
        LittleEndian::write_f64(&mut buf[8..], self.im);
        out.extend_from_slice(&buf);
    }

    fn read_le(bytes: &[u8]) -> Self {
        Complex::new(
            LittleEndian::read_f64(&bytes[..8]),
            LittleEndian::read_f64(&bytes[8..]),
        )
    }
}

/// Byte length of an array of `shape`, or an error if it does not fit in memory.
fn byte_len(dtype: DType, shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(dtype.item_size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| {
            RpcError::tensor(format!("shape {:?} of {} is too large", shape, dtype))
        })
}

/// A dense, C-ordered, little-endian numeric array.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl NdArray {
    /// Build an array from typed values in C order.
    pub fn from_vec<T: Element>(shape: Vec<usize>, values: Vec<T>) -> Result<Self> {
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.item_size());
        for value in values {
            value.write_le(&mut data);
        }
        Self::from_raw(T::DTYPE, shape, data)
    }

    /// Build an array from raw little-endian C-order bytes.
    pub fn from_raw(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let expected = byte_len(dtype, &shape)?;
        if data.len() != expected {
            return Err(RpcError::tensor(format!(
                "shape {:?} of {} needs {} bytes, got {}",
                shape,
                dtype,
                expected,
                data.len()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len() / self.dtype.item_size()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy out the elements, or `None` if `T` does not match the dtype.
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        if T::DTYPE != self.dtype {
            return None;
        }
        Some(
            self.data
                .chunks_exact(self.dtype.item_size())
                .map(T::read_le)
                .collect(),
        )
    }

    /// Reinterpret with a new shape of the same size.
    pub fn reshape(self, shape: Vec<usize>) -> Result<Self> {
        Self::from_raw(self.dtype, shape, self.data)
    }

    /// Encode as `.npy` version 3.0.
    pub fn to_npy(&self) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            self.dtype.descr(),
            shape_literal(&self.shape)
        );
        let prefix_len = MAGIC.len() + 2 + 4;
        let pad = ALIGN - (prefix_len + header.len() + 1) % ALIGN;
        header.extend(std::iter::repeat(' ').take(pad));
        header.push('\n');

        let mut out = Vec::with_capacity(prefix_len + header.len() + self.data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[3, 0]);
        let mut len = [0u8; 4];
        LittleEndian::write_u32(&mut len, header.len() as u32);
        out.extend_from_slice(&len);
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Decode a `.npy` byte stream.
    pub fn from_npy(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(RpcError::tensor("missing npy magic string"));
        }
        let major = bytes[MAGIC.len()];
        let offset = MAGIC.len() + 2;
        let (header_len, header_start) = match major {
            1 => {
                let end = offset + 2;
                let raw = bytes
                    .get(offset..end)
                    .ok_or_else(|| RpcError::tensor("truncated npy header length"))?;
                (LittleEndian::read_u16(raw) as usize, end)
            }
            2 | 3 => {
                let end = offset + 4;
                let raw = bytes
                    .get(offset..end)
                    .ok_or_else(|| RpcError::tensor("truncated npy header length"))?;
                (LittleEndian::read_u32(raw) as usize, end)
            }
            other => {
                return Err(RpcError::tensor(format!(
                    "unsupported npy format version {}",
                    other
                )))
            }
        };
        let header_end = header_start.saturating_add(header_len);
        let header = bytes
            .get(header_start..header_end)
            .ok_or_else(|| RpcError::tensor("truncated npy header"))?;
        let header = std::str::from_utf8(header)
            .map_err(|_| RpcError::tensor("npy header is not valid text"))?;

        let header = parse_header(header)?;
        let (dtype, big_endian) = DType::parse_descr(&header.descr)?;

        let payload = &bytes[header_end..];
        let expected = byte_len(dtype, &header.shape)?;
        if payload.len() < expected {
            return Err(RpcError::tensor(format!(
                "npy payload has {} bytes, expected {}",
                payload.len(),
                expected
            )));
        }
        let mut data = payload[..expected].to_vec();
        if big_endian {
            swap_to_little_endian(dtype, &mut data);
        }
        if header.fortran_order && header.shape.len() > 1 {
            data = fortran_to_c(&data, &header.shape, dtype.item_size());
        }
        Self::from_raw(dtype, header.shape, data)
    }
}

/// Python tuple literal for a shape: `()`, `(3,)`, `(3, 3, 2)`.
fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => {
            let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}

struct NpyHeader {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn parse_header(header: &str) -> Result<NpyHeader> {
    let descr_text = dict_entry(header, "descr")?;
    let quote = descr_text
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| RpcError::tensor("npy 'descr' is not a string"))?;
    let descr = descr_text[1..]
        .split(quote)
        .next()
        .unwrap_or_default()
        .to_string();

    let fortran_text = dict_entry(header, "fortran_order")?;
    let fortran_order = if fortran_text.starts_with("True") {
        true
    } else if fortran_text.starts_with("False") {
        false
    } else {
        return Err(RpcError::tensor("npy 'fortran_order' is not a bool"));
    };

    let shape_text = dict_entry(header, "shape")?;
    let inner = shape_text
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .ok_or_else(|| RpcError::tensor("npy 'shape' is not a tuple"))?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| RpcError::tensor(format!("invalid npy dimension '{}'", part)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(NpyHeader {
        descr,
        fortran_order,
        shape,
    })
}

/// Text following `'key':` in a python dict literal.
fn dict_entry<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    for quoted in [format!("'{}'", key), format!("\"{}\"", key)] {
        if let Some(pos) = header.find(&quoted) {
            let rest = header[pos + quoted.len()..].trim_start();
            if let Some(value) = rest.strip_prefix(':') {
                return Ok(value.trim_start());
            }
        }
    }
    Err(RpcError::tensor(format!("npy header is missing '{}'", key)))
}

fn swap_to_little_endian(dtype: DType, data: &mut [u8]) {
    let width = match dtype {
        DType::C64 | DType::C128 => dtype.item_size() / 2,
        _ => dtype.item_size(),
    };
    if width > 1 {
        data.chunks_exact_mut(width).for_each(|chunk| chunk.reverse());
    }
}

fn fortran_to_c(data: &[u8], shape: &[usize], item_size: usize) -> Vec<u8> {
    let mut f_strides = vec![1usize; shape.len()];
    for axis in 1..shape.len() {
        f_strides[axis] = f_strides[axis - 1] * shape[axis - 1];
    }

    let size: usize = shape.iter().product();
    let mut out = Vec::with_capacity(data.len());
    let mut index = vec![0usize; shape.len()];
    for _ in 0..size {
        let f_offset: usize = index.iter().zip(&f_strides).map(|(i, s)| i * s).sum();
        let start = f_offset * item_size;
        out.extend_from_slice(&data[start..start + item_size]);

        // advance the C-order multi-index, last axis fastest
        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}
