//! Built-in stages of the transcriptome and protein domain pipelines.
//!
//! Each stage reads from the layout role the previous stage writes to:
//!
//! | stage         | reads                 | writes                         |
//! |---------------|-----------------------|--------------------------------|
//! | `build_index` | `genome_fasta`        | `indexing_output`              |
//! | `trim_fastq`  | `fastq_dir`           | `trimmomatic_output`           |
//! | `align`       | `trimmomatic_output`  | `alignment_output`             |
//! | `htseq`       | `alignment_output`    | `htseq_output`                 |
//! | `pcc`         | expression matrix     | `pcc_output`, `pcc_mcl_output` |
//! | `mcl`         | `pcc_mcl_output`      | `mcl_cluster_output`           |
//! | `interpro`    | `protein_fasta`       | `interpro_output`              |

mod align;
mod coexpression;
mod count;
mod index;
mod interpro;
mod trim;

pub use align::AlignStage;
pub use coexpression::{MclStage, PccStage};
pub use count::CountStage;
pub use index::BuildIndexStage;
pub use interpro::{split_fasta, InterproStage};
pub use trim::TrimFastqStage;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{DataLayout, GenomeLayout};
use crate::core::WorkUnit;
use crate::errors::SeqflowError;

/// Genome indexing.
pub const BUILD_INDEX: &str = "build_index";
/// Read trimming.
pub const TRIM_FASTQ: &str = "trim_fastq";
/// Read alignment.
pub const ALIGN: &str = "align";
/// Read counting.
pub const HTSEQ: &str = "htseq";
/// Expression matrix assembly (local).
pub const EXP_MATRIX: &str = "exp_matrix";
/// Sample quality check (local).
pub const QUALITY: &str = "quality";
/// Co-expression (PCC).
pub const PCC: &str = "pcc";
/// Co-expression clustering.
pub const MCL: &str = "mcl";
/// Protein domain annotation.
pub const INTERPRO: &str = "interpro";

/// Looks up the genome of a unit.
pub(crate) fn genome_of<'a>(
    stage: &str,
    unit: &WorkUnit,
    layout: &'a DataLayout,
) -> Result<&'a GenomeLayout, SeqflowError> {
    layout
        .genome(unit.genome())
        .ok_or_else(|| SeqflowError::stage(stage, format!("unknown genome '{}'", unit.genome())))
}

/// Returns the file name of a path as text.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Appends a suffix to a path without treating it as an extension.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Returns the parent directory of a file path, if it has a real one.
pub(crate) fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
