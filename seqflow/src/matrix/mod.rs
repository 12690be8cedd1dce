//! Gene-by-sample expression matrices assembled from htseq-count tables.
//!
//! The matrix file is tab separated: a header row `gene` followed by the
//! sample names, then one row per gene with its count in every sample.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::GenomeLayout;
use crate::errors::MatrixError;

/// Suffix of htseq-count output files.
pub const HTSEQ_SUFFIX: &str = ".htseq";

/// htseq-count's own counters; rows containing these are not genes.
const COUNTER_FIELDS: [&str; 5] = [
    "no_feature",
    "ambiguous",
    "too_low_aQual",
    "not_aligned",
    "alignment_not_unique",
];

/// A gene-by-sample count matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpressionMatrix {
    samples: Vec<String>,
    genes: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl ExpressionMatrix {
    /// Creates an empty matrix over the given samples.
    #[must_use]
    pub fn new(samples: Vec<String>) -> Self {
        Self {
            samples,
            genes: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Adds a gene row. Missing trailing values are filled with zero.
    pub fn push_row(&mut self, gene: impl Into<String>, mut row: Vec<f64>) {
        row.resize(self.samples.len(), 0.0);
        self.genes.push(gene.into());
        self.values.push(row);
    }

    /// Returns the sample names.
    #[must_use]
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Returns the gene ids in row order.
    #[must_use]
    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    /// Returns the row of a gene.
    #[must_use]
    pub fn row(&self, gene: &str) -> Option<&[f64]> {
        self.genes
            .iter()
            .position(|g| g == gene)
            .map(|i| self.values[i].as_slice())
    }

    /// Iterates over `(gene, row)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.genes
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Vec::as_slice))
    }

    /// Returns the value for a gene in a sample.
    #[must_use]
    pub fn value(&self, gene: &str, sample: &str) -> Option<f64> {
        let column = self.samples.iter().position(|s| s == sample)?;
        self.row(gene).map(|row| row[column])
    }

    /// Returns a copy with every value mapped through `f`.
    #[must_use]
    pub fn map_values(&self, f: impl Fn(&str, &str, f64) -> f64) -> Self {
        let values = self
            .genes
            .iter()
            .zip(&self.values)
            .map(|(gene, row)| {
                row.iter()
                    .zip(&self.samples)
                    .map(|(value, sample)| f(gene, sample, *value))
                    .collect()
            })
            .collect();
        Self {
            samples: self.samples.clone(),
            genes: self.genes.clone(),
            values,
        }
    }

    /// Assembles a matrix from every `.htseq` file in `dir`.
    ///
    /// Samples are ordered by file name and named after the file without
    /// its suffix. Genes keep the order in which they are first seen; a
    /// gene absent from a sample counts as zero. htseq-count's own
    /// counters are dropped.
    pub fn from_htseq_dir(dir: &Path) -> Result<Self, MatrixError> {
        let io_err = |source: io::Error| MatrixError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_table = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(HTSEQ_SUFFIX));
            if is_table && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let samples = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .map(|n| n.trim_end_matches(HTSEQ_SUFFIX).to_string())
            .collect::<Vec<_>>();

        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, Vec<f64>> = HashMap::new();

        for (column, file) in files.iter().enumerate() {
            debug!(path = %file.display(), "Reading htseq table");
            for (gene, count) in read_count_table(file)? {
                let row = counts.entry(gene.clone()).or_insert_with(|| {
                    order.push(gene);
                    vec![0.0; samples.len()]
                });
                row[column] = count;
            }
        }

        let mut matrix = Self::new(samples);
        for gene in order {
            if COUNTER_FIELDS.iter().any(|field| gene.contains(field)) {
                continue;
            }
            if let Some(row) = counts.remove(&gene) {
                matrix.push_row(gene, row);
            }
        }

        info!(
            dir = %dir.display(),
            samples = matrix.samples.len(),
            genes = matrix.genes.len(),
            "Assembled expression matrix"
        );
        Ok(matrix)
    }

    /// Reads a matrix file.
    pub fn read(path: &Path) -> Result<Self, MatrixError> {
        let content = fs::read_to_string(path).map_err(|source| MatrixError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let format_err = |line: usize, message: String| MatrixError::Format {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut lines = content.lines().enumerate();
        let samples = match lines.next() {
            Some((_, header)) => header.split('\t').skip(1).map(str::to_string).collect(),
            None => return Err(format_err(1, "missing header".to_string())),
        };

        let mut matrix = Self::new(samples);
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let gene = fields.next().unwrap_or_default().trim().to_string();
            let row = fields
                .map(|f| f.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format_err(index + 1, format!("invalid value for '{gene}': {e}")))?;
            if row.len() != matrix.samples.len() {
                return Err(format_err(
                    index + 1,
                    format!("expected {} values, found {}", matrix.samples.len(), row.len()),
                ));
            }
            matrix.push_row(gene, row);
        }
        Ok(matrix)
    }

    /// Writes the matrix, creating the parent directory if needed.
    pub fn write(&self, path: &Path) -> Result<(), MatrixError> {
        let io_err = |source: io::Error| MatrixError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = fs::File::create(path).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        writeln!(out, "gene\t{}", self.samples.join("\t")).map_err(io_err)?;
        for (gene, row) in self.rows() {
            let values = row.iter().map(ToString::to_string).collect::<Vec<_>>();
            writeln!(out, "{gene}\t{}", values.join("\t")).map_err(io_err)?;
        }
        out.flush().map_err(io_err)
    }
}

fn read_count_table(path: &Path) -> Result<Vec<(String, f64)>, MatrixError> {
    let content = fs::read_to_string(path).map_err(|source| MatrixError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim().split('\t').filter(|f| !f.is_empty()).collect();
        let [gene, count] = fields.as_slice() else {
            return Err(MatrixError::Format {
                path: path.to_path_buf(),
                line: index + 1,
                message: format!("expected 2 fields, found {}", fields.len()),
            });
        };
        let count = count.parse::<f64>().map_err(|e| MatrixError::Format {
            path: path.to_path_buf(),
            line: index + 1,
            message: format!("invalid count for '{gene}': {e}"),
        })?;
        rows.push(((*gene).to_string(), count));
    }
    Ok(rows)
}

/// Rewrites an assembled matrix, e.g. to normalize counts.
///
/// Implementations receive the raw count matrix and the genome it belongs
/// to, so length based normalizations can read the coding sequences.
pub trait MatrixTransform: Send + Sync {
    /// Returns the name of the transform.
    fn name(&self) -> &str;

    /// Produces the transformed matrix.
    fn apply(&self, matrix: &ExpressionMatrix, genome: &GenomeLayout) -> Result<ExpressionMatrix, MatrixError>;
}
