//! Chunks: contiguous runs of same-shape cells within one column.
//!
//! A chunk stores a homogeneous buffer and implicitly types it through its
//! storage shape; no per-cell tag exists. Conversion happens once per run
//! during prepare, so everything here is bookkeeping over whole buffers.

/// Storage shape of a chunk. Two cells share a chunk iff they reduce to the
/// same shape, including the temporal flag for numbers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum StorageShape {
    Number { temporal: bool },
    /// Packed RK numerics, kept unexpanded until prepare.
    Rk,
    Str,
    SharedStr,
    Null,
}

impl StorageShape {
    /// Tie-break rank for dominant-shape selection:
    /// numeric > temporal numeric > string > null.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            StorageShape::Number { temporal: false } | StorageShape::Rk => 3,
            StorageShape::Number { temporal: true } => 2,
            StorageShape::Str | StorageShape::SharedStr => 1,
            StorageShape::Null => 0,
        }
    }
}

/// One element of a chunk, used when runs are rebuilt after row drops.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Element {
    Number { value: f64, temporal: bool },
    Rk(u32),
    Str(String),
    SharedIdx(u64),
    Null,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ChunkData {
    F64Run { temporal: bool, values: Vec<f64> },
    Rk32Run(Vec<u32>),
    InlineStrRun(Vec<String>),
    SharedIdxRun(Vec<u64>),
    NullRun(usize),
}

/// A run of consecutive body rows in one column sharing a storage shape.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Chunk {
    /// Body row of the first element.
    pub(crate) origin_row: usize,
    pub(crate) data: ChunkData,
}

impl Chunk {
    /// Opens a new single-element chunk at the given body row.
    pub(crate) fn open(origin_row: usize, element: Element) -> Chunk {
        let data = match element {
            Element::Number { value, temporal } => ChunkData::F64Run {
                temporal,
                values: vec![value],
            },
            Element::Rk(raw) => ChunkData::Rk32Run(vec![raw]),
            Element::Str(string) => ChunkData::InlineStrRun(vec![string]),
            Element::SharedIdx(index) => ChunkData::SharedIdxRun(vec![index]),
            Element::Null => ChunkData::NullRun(1),
        };
        Chunk { origin_row, data }
    }

    pub(crate) fn len(&self) -> usize {
        match &self.data {
            ChunkData::F64Run { values, .. } => values.len(),
            ChunkData::Rk32Run(values) => values.len(),
            ChunkData::InlineStrRun(values) => values.len(),
            ChunkData::SharedIdxRun(values) => values.len(),
            ChunkData::NullRun(count) => *count,
        }
    }

    /// Body row just past the last element.
    pub(crate) fn end_row(&self) -> usize {
        self.origin_row + self.len()
    }

    pub(crate) fn shape(&self) -> StorageShape {
        match &self.data {
            ChunkData::F64Run { temporal, .. } => StorageShape::Number {
                temporal: *temporal,
            },
            ChunkData::Rk32Run(_) => StorageShape::Rk,
            ChunkData::InlineStrRun(_) => StorageShape::Str,
            ChunkData::SharedIdxRun(_) => StorageShape::SharedStr,
            ChunkData::NullRun(_) => StorageShape::Null,
        }
    }

    /// Tries to extend this chunk with an element landing on its end row.
    /// Returns the element back when the shapes differ and a new chunk must
    /// be opened.
    pub(crate) fn extend(&mut self, element: Element) -> Option<Element> {
        match (&mut self.data, element) {
            (ChunkData::F64Run { temporal, values }, Element::Number { value, temporal: t })
                if *temporal == t =>
            {
                values.push(value);
                None
            }
            (ChunkData::Rk32Run(values), Element::Rk(raw)) => {
                values.push(raw);
                None
            }
            (ChunkData::InlineStrRun(values), Element::Str(string)) => {
                values.push(string);
                None
            }
            (ChunkData::SharedIdxRun(values), Element::SharedIdx(index)) => {
                values.push(index);
                None
            }
            (ChunkData::NullRun(count), Element::Null) => {
                *count += 1;
                None
            }
            (_, element) => Some(element),
        }
    }

    /// Removes elements at body rows >= `row`. Returns true when the chunk
    /// still holds elements afterwards.
    pub(crate) fn truncate_to(&mut self, row: usize) -> bool {
        let keep = row.saturating_sub(self.origin_row).min(self.len());
        match &mut self.data {
            ChunkData::F64Run { values, .. } => values.truncate(keep),
            ChunkData::Rk32Run(values) => values.truncate(keep),
            ChunkData::InlineStrRun(values) => values.truncate(keep),
            ChunkData::SharedIdxRun(values) => values.truncate(keep),
            ChunkData::NullRun(count) => *count = keep,
        }
        keep > 0
    }

    /// Consumes the chunk into `(body_row, element)` pairs.
    pub(crate) fn into_elements(self) -> impl Iterator<Item = (usize, Element)> {
        let origin = self.origin_row;
        let elements: Vec<Element> = match self.data {
            ChunkData::F64Run { temporal, values } => values
                .into_iter()
                .map(|value| Element::Number { value, temporal })
                .collect(),
            ChunkData::Rk32Run(values) => values.into_iter().map(Element::Rk).collect(),
            ChunkData::InlineStrRun(values) => values.into_iter().map(Element::Str).collect(),
            ChunkData::SharedIdxRun(values) => {
                values.into_iter().map(Element::SharedIdx).collect()
            }
            ChunkData::NullRun(count) => (0..count).map(|_| Element::Null).collect(),
        };
        elements
            .into_iter()
            .enumerate()
            .map(move |(offset, element)| (origin + offset, element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_respects_shape_and_temporal_flag() {
        let mut chunk = Chunk::open(0, Element::Number { value: 1.0, temporal: false });
        assert!(chunk.extend(Element::Number { value: 2.0, temporal: false }).is_none());
        // temporal flip forces a new chunk
        let rejected = chunk.extend(Element::Number { value: 3.0, temporal: true });
        assert!(rejected.is_some());
        // shape change forces a new chunk
        assert!(chunk.extend(Element::Str("x".to_string())).is_some());
        assert_eq!(chunk.len(), 2);
    }

    #[test]
    fn truncate_drops_trailing_rows() {
        let mut chunk = Chunk::open(3, Element::Number { value: 1.0, temporal: false });
        assert!(chunk.extend(Element::Number { value: 2.0, temporal: false }).is_none());
        assert!(chunk.extend(Element::Number { value: 3.0, temporal: false }).is_none());

        assert!(chunk.truncate_to(5));
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.end_row(), 5);
        assert!(!chunk.truncate_to(3));
        assert_eq!(chunk.len(), 0);
    }

    #[test]
    fn null_runs_count_elements() {
        let mut chunk = Chunk::open(0, Element::Null);
        assert!(chunk.extend(Element::Null).is_none());
        assert!(chunk.extend(Element::Null).is_none());
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.shape(), StorageShape::Null);

        let rows: Vec<usize> = chunk.into_elements().map(|(row, _)| row).collect();
        assert_eq!(rows, vec![0, 1, 2]);
    }

    #[test]
    fn shape_rank_ordering() {
        assert!(StorageShape::Number { temporal: false }.rank() > StorageShape::Number { temporal: true }.rank());
        assert!(StorageShape::Number { temporal: true }.rank() > StorageShape::Str.rank());
        assert!(StorageShape::Str.rank() > StorageShape::Null.rank());
        assert_eq!(StorageShape::Rk.rank(), StorageShape::Number { temporal: false }.rank());
    }
}
