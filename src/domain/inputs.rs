// ============================================================
// Layer 3 — Input Channels
// ============================================================
// A multi-input example is an ordered tuple of text segments,
// e.g. (question, context). The model consumes them column-wise:
// one sequence per segment position, aligned by example index.
//
//   examples                     channels
//   [q0, c0]                     question: [q0, q1]
//   [q1, c1]          ──▶        context:  [c0, c1]
//
// The number of segments is declared up front by an InputSchema
// and every example is checked against it before transposing.

use serde::{Deserialize, Serialize};

use crate::error::{FinetuneError, FinetuneResult};

/// Ordered, named input channels. Its length is the declared arity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    names: Vec<String>,
}

impl InputSchema {
    /// Declare channels by name, in segment order.
    pub fn new<I, S>(names: I) -> FinetuneResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(FinetuneError::InvalidSchema(
                "at least one input channel is required".into(),
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(FinetuneError::InvalidSchema(format!(
                    "channel {i} has an empty name"
                )));
            }
            if names[..i].contains(name) {
                return Err(FinetuneError::InvalidSchema(format!(
                    "channel '{name}' is declared twice"
                )));
            }
        }
        Ok(Self { names })
    }

    /// `arity` unnamed channels called `input_0`, `input_1`, ...
    pub fn positional(arity: usize) -> FinetuneResult<Self> {
        Self::new((0..arity).map(|i| format!("input_{i}")))
    }

    pub fn arity(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Transpose per-example tuples into per-channel sequences.
    ///
    /// Order is preserved: `column(j)[i] == examples[i][j]`.
    pub fn transpose<E, S>(&self, examples: &[E]) -> FinetuneResult<InputChannels>
    where
        E: AsRef<[S]>,
        S: AsRef<str>,
    {
        let arity = self.arity();
        let mut columns: Vec<Vec<String>> = vec![Vec::with_capacity(examples.len()); arity];

        for (index, example) in examples.iter().enumerate() {
            let segments = example.as_ref();
            if segments.len() != arity {
                return Err(FinetuneError::ArityMismatch {
                    index,
                    expected: arity,
                    found: segments.len(),
                });
            }
            for (column, segment) in columns.iter_mut().zip(segments) {
                column.push(segment.as_ref().to_string());
            }
        }

        Ok(InputChannels {
            names: self.names.clone(),
            columns,
            len: examples.len(),
        })
    }
}

/// Per-channel text sequences, all of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct InputChannels {
    names: Vec<String>,
    columns: Vec<Vec<String>>,
    len: usize,
}

impl InputChannels {
    /// Number of examples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Vec<String>] {
        &self.columns
    }

    pub fn column(&self, j: usize) -> &[String] {
        &self.columns[j]
    }

    /// Segments of example `i`, in channel order.
    pub fn example(&self, i: usize) -> Vec<&str> {
        self.columns.iter().map(|c| c[i].as_str()).collect()
    }
}
