use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use crate::error::{FeatPlotError, FeatPlotResult};

/// Byte length of the fixed header: two `u32` dimensions and a `u64` element size.
pub const HEADER_LEN: usize = 16;

/// Width of every stored scalar in the matrix body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementSize {
    F32,
    F64,
}

impl ElementSize {
    pub fn bytes(self) -> usize {
        match self {
            ElementSize::F32 => 4,
            ElementSize::F64 => 8,
        }
    }

    fn decode_row(self, bytes: &[u8], values: &mut Vec<f64>) {
        match self {
            ElementSize::F32 => values.extend(bytes.chunks_exact(4).map(|chunk| {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(chunk);
                f32::from_le_bytes(buf) as f64
            })),
            ElementSize::F64 => values.extend(bytes.chunks_exact(8).map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })),
        }
    }

    fn encode_row(self, row: &[f64], bytes: &mut Vec<u8>) {
        for &value in row {
            match self {
                ElementSize::F32 => bytes.extend_from_slice(&(value as f32).to_le_bytes()),
                ElementSize::F64 => bytes.extend_from_slice(&value.to_le_bytes()),
            }
        }
    }
}

impl TryFrom<u64> for ElementSize {
    type Error = FeatPlotError;

    fn try_from(value: u64) -> FeatPlotResult<Self> {
        match value {
            4 => Ok(ElementSize::F32),
            8 => Ok(ElementSize::F64),
            other => Err(FeatPlotError::UnsupportedEncoding(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureHeader {
    pub num_frames: u32,
    pub feature_dim: u32,
    pub element_size: ElementSize,
}

impl FeatureHeader {
    /// Reads the 16 header bytes and validates the element size.
    ///
    /// The raw fields are logged before validation so that a rejected file
    /// still reports what it declared.
    pub fn read_from<R: Read>(reader: &mut R) -> FeatPlotResult<FeatureHeader> {
        let bytes = read_block(reader, HEADER_LEN as u64, 0, HEADER_LEN as u64)?;

        let mut num_frames = [0u8; 4];
        let mut feature_dim = [0u8; 4];
        let mut size = [0u8; 8];
        num_frames.copy_from_slice(&bytes[0..4]);
        feature_dim.copy_from_slice(&bytes[4..8]);
        size.copy_from_slice(&bytes[8..16]);

        let num_frames = u32::from_le_bytes(num_frames);
        let feature_dim = u32::from_le_bytes(feature_dim);
        let size = u64::from_le_bytes(size);

        log::info!(
            "num_frames: {}, feature_dim: {}, element_size: {}",
            num_frames,
            feature_dim,
            size
        );

        Ok(FeatureHeader {
            num_frames,
            feature_dim,
            element_size: ElementSize::try_from(size)?,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.num_frames.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.feature_dim.to_le_bytes());
        bytes[8..16].copy_from_slice(&(self.element_size.bytes() as u64).to_le_bytes());
        bytes
    }

    /// Bytes occupied by one frame.
    pub fn row_len(&self) -> u64 {
        self.feature_dim as u64 * self.element_size.bytes() as u64
    }

    /// Bytes occupied by the whole body. Saturates for dimensions no file can hold.
    pub fn body_len(&self) -> u64 {
        self.row_len().saturating_mul(self.num_frames as u64)
    }

    pub fn total_len(&self) -> u64 {
        self.body_len().saturating_add(HEADER_LEN as u64)
    }
}

/// Reads exactly `len` bytes starting at absolute `offset`.
///
/// The buffer only grows with the bytes actually present, so a bogus length
/// in the header cannot trigger a huge allocation.
fn read_block<R: Read>(
    reader: &mut R,
    len: u64,
    offset: u64,
    expected_total: u64,
) -> FeatPlotResult<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut buf)?;

    if (buf.len() as u64) < len {
        return Err(FeatPlotError::TruncatedInput {
            expected: expected_total,
            found: offset + buf.len() as u64,
        });
    }

    Ok(buf)
}

/// A `num_frames x feature_dim` matrix of per-frame features, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    num_frames: u32,
    feature_dim: u32,
    element_size: ElementSize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(
        num_frames: u32,
        feature_dim: u32,
        element_size: ElementSize,
        values: Vec<f64>,
    ) -> FeatPlotResult<FeatureMatrix> {
        let expected = num_frames as usize * feature_dim as usize;
        if values.len() != expected {
            return Err(FeatPlotError::InvalidShape {
                expected,
                found: values.len(),
            });
        }

        Ok(FeatureMatrix {
            num_frames,
            feature_dim,
            element_size,
            values,
        })
    }

    /// Builds a matrix from rows, which must all have the same length.
    pub fn from_rows<T: AsRef<[f64]>>(
        element_size: ElementSize,
        rows: &[T],
    ) -> FeatPlotResult<FeatureMatrix> {
        let num_frames = u32::try_from(rows.len())
            .map_err(|_| FeatPlotError::new(format!("too many frames: {}", rows.len())))?;
        let width = rows.first().map_or(0, |row| row.as_ref().len());
        let feature_dim = u32::try_from(width)
            .map_err(|_| FeatPlotError::new(format!("feature dimension too large: {width}")))?;

        let mut values = Vec::with_capacity(rows.len() * width);
        for row in rows {
            let row = row.as_ref();
            if row.len() != width {
                return Err(FeatPlotError::InvalidShape {
                    expected: width,
                    found: row.len(),
                });
            }
            values.extend_from_slice(row);
        }

        FeatureMatrix::new(num_frames, feature_dim, element_size, values)
    }

    /// Decodes a header and body from `reader`.
    pub fn read_from<R: Read>(mut reader: R) -> FeatPlotResult<FeatureMatrix> {
        let header = FeatureHeader::read_from(&mut reader)?;
        FeatureMatrix::read_body(header, &mut reader)
    }

    /// Decodes the file at `path`. A body shorter than the header declares is
    /// rejected before any of it is read.
    pub fn open<P: AsRef<Path>>(path: P) -> FeatPlotResult<FeatureMatrix> {
        let file = File::open(path.as_ref())?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = FeatureHeader::read_from(&mut reader)?;
        if file_len < header.total_len() {
            return Err(FeatPlotError::TruncatedInput {
                expected: header.total_len(),
                found: file_len,
            });
        }

        FeatureMatrix::read_body(header, &mut reader)
    }

    fn read_body<R: Read>(header: FeatureHeader, reader: &mut R) -> FeatPlotResult<FeatureMatrix> {
        let row_len = header.row_len();
        let expected_total = header.total_len();
        let mut values = Vec::new();

        if row_len > 0 {
            let mut offset = HEADER_LEN as u64;
            for _ in 0..header.num_frames {
                let row = read_block(reader, row_len, offset, expected_total)?;
                header.element_size.decode_row(&row, &mut values);
                offset += row_len;
            }
        }

        log::debug!(
            "decoded {} values ({} frames x {} dims)",
            values.len(),
            header.num_frames,
            header.feature_dim
        );

        FeatureMatrix::new(
            header.num_frames,
            header.feature_dim,
            header.element_size,
            values,
        )
    }

    /// Encodes the matrix with its own element size.
    pub fn write_to<W: Write>(&self, mut writer: W) -> FeatPlotResult<()> {
        writer.write_all(&self.header().to_bytes())?;

        let mut bytes = Vec::with_capacity(self.header().row_len() as usize);
        for row in self.rows() {
            bytes.clear();
            self.element_size.encode_row(row, &mut bytes);
            writer.write_all(&bytes)?;
        }
        writer.flush()?;

        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> FeatPlotResult<()> {
        let file = File::create(path.as_ref())?;
        self.write_to(BufWriter::new(file))
    }
}

impl FeatureMatrix {
    pub fn header(&self) -> FeatureHeader {
        FeatureHeader {
            num_frames: self.num_frames,
            feature_dim: self.feature_dim,
            element_size: self.element_size,
        }
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    pub fn feature_dim(&self) -> u32 {
        self.feature_dim
    }

    pub fn element_size(&self) -> ElementSize {
        self.element_size
    }

    /// All values, row-major.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn row(&self, frame: usize) -> Option<&[f64]> {
        let width = self.feature_dim as usize;
        let start = frame.checked_mul(width)?;
        if frame >= self.num_frames as usize {
            return None;
        }
        self.values.get(start..start + width)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.num_frames as usize).filter_map(move |frame| self.row(frame))
    }

    pub fn get(&self, frame: usize, dim: usize) -> Option<f64> {
        self.row(frame)?.get(dim).copied()
    }

    /// Smallest and largest finite values, or `None` when there are none.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .fold(None, |range, value| match range {
                None => Some((value, value)),
                Some((min, max)) => Some((min.min(value), max.max(value))),
            })
    }

    /// Zeroes dimension 0 of every frame, which otherwise dominates the color scale.
    pub fn zero_first_column(&mut self) {
        let width = self.feature_dim as usize;
        if width == 0 {
            return;
        }
        for value in self.values.iter_mut().step_by(width) {
            *value = 0.0;
        }
    }
}
