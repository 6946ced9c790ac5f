//! Ragged-batch index bookkeeping.
//!
//! A [`RaggedIndex`] stores the flat concatenation of B variable-length
//! index arrays together with per-entry `counts` and `offsets`. Boundary
//! `edges` are derived by prefix-summing the counts, which makes single
//! entry extraction an O(1) slice. Index values may be stored globally
//! offset; `offsets[i]` is subtracted on extraction so consumers recover
//! entry-local addressing.
//!
//! Two storage modes are supported: a single flat index, or a list of
//! sub-indexes (one buffer per stored object, e.g. one index per cluster).
//! In list mode `counts` tracks sub-indexes per entry while `full_counts`
//! tracks raw elements per entry.

use ndarray::Array1;
use thiserror::Error;

/// Errors that can occur during ragged index construction and slicing.
#[derive(Error, Debug)]
pub enum RaggedError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("entry {index} out of bounds for batch size {batch_size}")]
    IndexOutOfRange { index: usize, batch_size: usize },
}

/// Result type for ragged index operations.
pub type Result<T> = std::result::Result<T, RaggedError>;

/// Numeric backend holding an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Plain contiguous `Vec<i64>`
    Native,
    /// `ndarray` tensor, the representation handed to accelerator interop
    Tensor,
}

#[derive(Debug, Clone, PartialEq)]
enum BufferRepr {
    Native(Vec<i64>),
    Tensor(Array1<i64>),
}

/// A single index buffer, stored in one of the two supported backends.
///
/// Construction goes through `from_native`, `from_tensor` or `from_vec`,
/// which guarantee a contiguous layout; slice views never fail.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBuffer(BufferRepr);

impl IndexBuffer {
    /// Wrap a vector in the requested backend.
    pub fn from_vec(values: Vec<i64>, backend: Backend) -> Self {
        match backend {
            Backend::Native => Self(BufferRepr::Native(values)),
            Backend::Tensor => Self(BufferRepr::Tensor(Array1::from(values))),
        }
    }

    /// Wrap a vector in the native backend.
    pub fn from_native(values: Vec<i64>) -> Self {
        Self(BufferRepr::Native(values))
    }

    /// Wrap a tensor in the tensor backend. Strided arrays are rebuilt
    /// into standard layout so slice views stay total.
    pub fn from_tensor(values: Array1<i64>) -> Self {
        if values.as_slice().is_some() {
            Self(BufferRepr::Tensor(values))
        } else {
            Self(BufferRepr::Tensor(values.iter().copied().collect()))
        }
    }

    /// Backend this buffer currently lives in.
    #[inline]
    pub fn backend(&self) -> Backend {
        match &self.0 {
            BufferRepr::Native(_) => Backend::Native,
            BufferRepr::Tensor(_) => Backend::Tensor,
        }
    }

    /// View the buffer contents as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[i64] {
        match &self.0 {
            BufferRepr::Native(v) => v,
            BufferRepr::Tensor(a) => a.as_slice().expect("index buffer is contiguous"),
        }
    }

    /// Number of elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.0 {
            BufferRepr::Native(v) => v.len(),
            BufferRepr::Tensor(a) => a.len(),
        }
    }

    /// Returns true if the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the buffer contents into a plain vector.
    pub fn to_vec(&self) -> Vec<i64> {
        self.as_slice().to_vec()
    }

    /// Convert the buffer to the requested backend. A no-op clone if the
    /// buffer already lives there.
    pub fn to_backend(&self, kind: Backend) -> Self {
        if self.backend() == kind {
            return self.clone();
        }
        IndexBuffer::from_vec(self.to_vec(), kind)
    }
}

/// Underlying data of a ragged index: one flat index, or a list of
/// sub-indexes.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexData {
    Flat(IndexBuffer),
    List(Vec<IndexBuffer>),
}

impl IndexData {
    /// Number of stored items: elements in flat mode, sub-indexes in list
    /// mode.
    pub fn num_items(&self) -> usize {
        match self {
            IndexData::Flat(buf) => buf.len(),
            IndexData::List(bufs) => bufs.len(),
        }
    }

    fn backend(&self) -> Backend {
        match self {
            IndexData::Flat(buf) => buf.backend(),
            // An empty list carries no elements; treat it as native.
            IndexData::List(bufs) => bufs.first().map_or(Backend::Native, |b| b.backend()),
        }
    }

    fn to_backend(&self, kind: Backend) -> Self {
        match self {
            IndexData::Flat(buf) => IndexData::Flat(buf.to_backend(kind)),
            IndexData::List(bufs) => {
                IndexData::List(bufs.iter().map(|b| b.to_backend(kind)).collect())
            }
        }
    }
}

/// Batched index with the metadata needed to slice it.
///
/// Immutable after construction; backend conversion returns a new
/// instance.
#[derive(Debug, Clone)]
pub struct RaggedIndex {
    data: IndexData,
    counts: IndexBuffer,
    full_counts: IndexBuffer,
    offsets: IndexBuffer,
    edges: Vec<usize>,
    batch_size: usize,
}

impl RaggedIndex {
    /// Initialize a ragged index from its parts.
    ///
    /// When `counts` is omitted it is derived by counting occurrences of
    /// each id in `batch_ids` (both `batch_ids` and `batch_size` must then
    /// be supplied). In list mode `full_counts` is mandatory; in flat mode
    /// it defaults to `counts`.
    pub fn new(
        data: IndexData,
        offsets: Vec<i64>,
        counts: Option<Vec<i64>>,
        full_counts: Option<Vec<i64>>,
        batch_ids: Option<&[i64]>,
        batch_size: Option<usize>,
    ) -> Result<Self> {
        let is_list = matches!(data, IndexData::List(_));

        let counts = match counts {
            Some(counts) => counts,
            None => {
                let (ids, size) = match (batch_ids, batch_size) {
                    (Some(ids), Some(size)) => (ids, size),
                    _ => {
                        return Err(RaggedError::Configuration(
                            "must provide either `counts` or both `batch_ids` and `batch_size`"
                                .to_string(),
                        ))
                    }
                };
                bincount(ids, size)?
            }
        };
        let batch_size = counts.len();

        let full_counts = match full_counts {
            Some(full_counts) => full_counts,
            None if is_list => {
                return Err(RaggedError::Configuration(
                    "must provide `full_counts` when initializing an index list".to_string(),
                ))
            }
            None => counts.clone(),
        };

        // Negative counts can cancel out in the sum, so check them first
        if let Some(&bad) = counts.iter().chain(&full_counts).find(|&&c| c < 0) {
            return Err(RaggedError::Validation(format!(
                "counts must be non-negative, got {}",
                bad
            )));
        }

        let total: i64 = counts.iter().sum();
        if total as usize != data.num_items() {
            return Err(RaggedError::Validation(format!(
                "`counts` add up to {} but the index holds {} items",
                total,
                data.num_items()
            )));
        }
        if offsets.len() != batch_size {
            return Err(RaggedError::Validation(format!(
                "got {} offsets for {} counts",
                offsets.len(),
                batch_size
            )));
        }
        if full_counts.len() != batch_size {
            return Err(RaggedError::Validation(format!(
                "got {} full counts for {} counts",
                full_counts.len(),
                batch_size
            )));
        }

        // Boundaries between successive entries
        let mut edges = Vec::with_capacity(batch_size + 1);
        let mut cursor = 0usize;
        edges.push(0);
        for &count in &counts {
            cursor += count as usize;
            edges.push(cursor);
        }

        let backend = data.backend();
        Ok(Self {
            data,
            counts: IndexBuffer::from_vec(counts, backend),
            full_counts: IndexBuffer::from_vec(full_counts, backend),
            offsets: IndexBuffer::from_vec(offsets, backend),
            edges,
            batch_size,
        })
    }

    /// Build a flat index from explicit per-entry counts.
    pub fn from_counts(data: Vec<i64>, offsets: Vec<i64>, counts: Vec<i64>) -> Result<Self> {
        Self::new(
            IndexData::Flat(IndexBuffer::from_native(data)),
            offsets,
            Some(counts),
            None,
            None,
            None,
        )
    }

    /// Build a flat index from a per-element batch id vector.
    pub fn from_batch_ids(
        data: Vec<i64>,
        offsets: Vec<i64>,
        batch_ids: &[i64],
        batch_size: usize,
    ) -> Result<Self> {
        Self::new(
            IndexData::Flat(IndexBuffer::from_native(data)),
            offsets,
            None,
            None,
            Some(batch_ids),
            Some(batch_size),
        )
    }

    /// Build a list-of-indexes batch from explicit counts.
    pub fn from_list(
        data: Vec<Vec<i64>>,
        offsets: Vec<i64>,
        counts: Vec<i64>,
        full_counts: Vec<i64>,
    ) -> Result<Self> {
        let bufs = data.into_iter().map(IndexBuffer::from_native).collect();
        Self::new(
            IndexData::List(bufs),
            offsets,
            Some(counts),
            Some(full_counts),
            None,
            None,
        )
    }

    /// Number of entries in the batch.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of stored items (elements in flat mode, sub-indexes in list
    /// mode).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.num_items()
    }

    /// Returns true if the index holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the underlying data is a list of sub-indexes.
    #[inline]
    pub fn is_list(&self) -> bool {
        matches!(self.data, IndexData::List(_))
    }

    /// Backend the index currently lives in.
    #[inline]
    pub fn backend(&self) -> Backend {
        self.counts.backend()
    }

    /// Per-entry item counts.
    #[inline]
    pub fn counts(&self) -> &[i64] {
        self.counts.as_slice()
    }

    /// Per-entry raw element counts (same as `counts` in flat mode).
    #[inline]
    pub fn full_counts(&self) -> &[i64] {
        self.full_counts.as_slice()
    }

    /// Per-entry index offsets.
    #[inline]
    pub fn offsets(&self) -> &[i64] {
        self.offsets.as_slice()
    }

    /// Entry boundaries in the flat concatenation, length `batch_size + 1`.
    #[inline]
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }

    fn check_entry(&self, i: usize) -> Result<()> {
        if i >= self.batch_size {
            return Err(RaggedError::IndexOutOfRange {
                index: i,
                batch_size: self.batch_size,
            });
        }
        Ok(())
    }

    /// Extract one entry of a flat index, shifted back to local addressing.
    pub fn entry(&self, i: usize) -> Result<Vec<i64>> {
        self.check_entry(i)?;
        match &self.data {
            IndexData::Flat(buf) => {
                let offset = self.offsets.as_slice()[i];
                let slice = &buf.as_slice()[self.edges[i]..self.edges[i + 1]];
                Ok(slice.iter().map(|&v| v - offset).collect())
            }
            IndexData::List(_) => Err(RaggedError::Validation(
                "underlying data is an index list, use `entry_list`".to_string(),
            )),
        }
    }

    /// Extract one entry of an index list, each sub-index shifted back to
    /// local addressing.
    pub fn entry_list(&self, i: usize) -> Result<Vec<Vec<i64>>> {
        self.check_entry(i)?;
        match &self.data {
            IndexData::List(bufs) => {
                let offset = self.offsets.as_slice()[i];
                Ok(bufs[self.edges[i]..self.edges[i + 1]]
                    .iter()
                    .map(|buf| buf.as_slice().iter().map(|&v| v - offset).collect())
                    .collect())
            }
            IndexData::Flat(_) => Err(RaggedError::Validation(
                "underlying data is a single index, use `entry`".to_string(),
            )),
        }
    }

    /// The whole concatenation, unmodified. In list mode all sub-indexes
    /// are concatenated in storage order.
    pub fn full_index(&self) -> Vec<i64> {
        match &self.data {
            IndexData::Flat(buf) => buf.to_vec(),
            IndexData::List(bufs) => {
                let total: usize = bufs.iter().map(|b| b.len()).sum();
                let mut out = Vec::with_capacity(total);
                for buf in bufs {
                    out.extend_from_slice(buf.as_slice());
                }
                out
            }
        }
    }

    /// Entry id of each stored item, expanded by repetition from `counts`.
    pub fn batch_ids(&self) -> Vec<i64> {
        expand_ids(self.counts.as_slice())
    }

    /// Entry id of each raw element, expanded by repetition from
    /// `full_counts`.
    pub fn full_batch_ids(&self) -> Vec<i64> {
        expand_ids(self.full_counts.as_slice())
    }

    /// Break a flat index batch back into its per-entry constituents.
    pub fn split(&self) -> Result<Vec<Vec<i64>>> {
        (0..self.batch_size).map(|i| self.entry(i)).collect()
    }

    /// Break an index-list batch back into its per-entry constituents.
    pub fn split_list(&self) -> Result<Vec<Vec<Vec<i64>>>> {
        (0..self.batch_size).map(|i| self.entry_list(i)).collect()
    }

    /// Return a new index with data and metadata converted to the
    /// requested backend. A no-op clone if already there.
    pub fn to_backend(&self, kind: Backend) -> Self {
        if self.backend() == kind && self.data.backend() == kind {
            return self.clone();
        }
        Self {
            data: self.data.to_backend(kind),
            counts: self.counts.to_backend(kind),
            full_counts: self.full_counts.to_backend(kind),
            offsets: self.offsets.to_backend(kind),
            edges: self.edges.clone(),
            batch_size: self.batch_size,
        }
    }
}

/// Count occurrences of each id in `0..batch_size`.
fn bincount(batch_ids: &[i64], batch_size: usize) -> Result<Vec<i64>> {
    let mut counts = vec![0i64; batch_size];
    for &id in batch_ids {
        if id < 0 || id as usize >= batch_size {
            return Err(RaggedError::Validation(format!(
                "batch id {} out of range for batch size {}",
                id, batch_size
            )));
        }
        counts[id as usize] += 1;
    }
    Ok(counts)
}

/// Repeat entry id i `counts[i]` times, in entry order.
fn expand_ids(counts: &[i64]) -> Vec<i64> {
    let total: i64 = counts.iter().sum();
    let mut ids = Vec::with_capacity(total as usize);
    for (i, &count) in counts.iter().enumerate() {
        ids.extend(std::iter::repeat(i as i64).take(count as usize));
    }
    ids
}
