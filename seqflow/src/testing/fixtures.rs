//! Dataset fixtures for pipeline testing.

use std::path::Path;

use crate::config::GenomeLayout;

/// Returns a genome layout with every location under `root`.
///
/// Inputs are `genome.fasta`, `genes.gff3`, `proteins.fasta` and `fastq/`;
/// each stage writes to its own subdirectory. Nothing is created on disk.
#[must_use]
pub fn genome_layout(root: &Path) -> GenomeLayout {
    GenomeLayout {
        genome_fasta: root.join("genome.fasta"),
        gff_file: root.join("genes.gff3"),
        gff_feature: "CDS".to_string(),
        gff_id: "Parent".to_string(),
        cds_fasta: None,
        protein_fasta: Some(root.join("proteins.fasta")),
        fastq_dir: root.join("fastq"),
        indexing_output: root.join("index").join("genome"),
        trimmomatic_output: root.join("trimmed"),
        alignment_output: root.join("aligned"),
        htseq_output: root.join("htseq"),
        exp_matrix_output: root.join("matrix").join("raw.tsv"),
        exp_matrix_transformed_output: None,
        pcc_output: root.join("pcc").join("pcc.tsv"),
        pcc_mcl_output: root.join("pcc").join("pcc.mcl"),
        mcl_cluster_output: root.join("mcl").join("clusters.txt"),
        interpro_output: Some(root.join("interpro")),
        alignment_cutoff: 0,
        htseq_cutoff: 0,
    }
}

#[cfg(test)]
pub use self::dataset::TempDataset;

#[cfg(test)]
mod dataset {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::genome_layout;
    use crate::config::{DataLayout, GenomeLayout};

    /// A single-genome dataset in a temporary directory.
    ///
    /// The input files exist; output locations do not.
    #[derive(Debug)]
    pub struct TempDataset {
        dir: TempDir,
        name: String,
        genome: GenomeLayout,
    }

    impl TempDataset {
        /// Creates the dataset with its input files.
        pub fn new(name: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let genome = genome_layout(dir.path());

            fs::write(&genome.genome_fasta, ">chr1\nACGTACGT\n").unwrap();
            fs::write(&genome.gff_file, "chr1\tsrc\tCDS\t1\t8\t.\t+\t0\tParent=g1\n").unwrap();
            if let Some(proteins) = &genome.protein_fasta {
                fs::write(proteins, ">p1\nMKV*\n>p2\nMAL*\n").unwrap();
            }
            fs::create_dir_all(&genome.fastq_dir).unwrap();

            Self {
                dir,
                name: name.to_string(),
                genome,
            }
        }

        /// Returns the dataset root.
        pub fn root(&self) -> &Path {
            self.dir.path()
        }

        /// Returns the genome layout.
        pub fn genome(&self) -> &GenomeLayout {
            &self.genome
        }

        /// Returns the genome layout for modification.
        pub fn genome_mut(&mut self) -> &mut GenomeLayout {
            &mut self.genome
        }

        /// Returns a layout holding this genome.
        pub fn layout(&self) -> DataLayout {
            DataLayout::new().with_genome(&self.name, self.genome.clone())
        }

        /// Creates empty read files in the fastq directory.
        pub fn add_reads(&self, files: &[&str]) {
            for file in files {
                fs::write(self.genome.fastq_dir.join(file), b"@r1\nACGT\n+\nIIII\n").unwrap();
            }
        }
    }
}
