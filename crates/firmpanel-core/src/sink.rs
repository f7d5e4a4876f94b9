//! Output sinks: Parquet cache writer, CSV export writer, Parquet reader

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::{Error, Result};

/// Rows per Parquet row group.
const ROW_GROUP_SIZE: usize = 1024 * 1024;

/// Buffered parquet writer with atomic tmp→rename
pub struct ParquetSink {
    writer: ArrowWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for ParquetSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl ParquetSink {
    /// Create a new sink writing `{dir}/{filename}` through a `.tmp` file
    pub fn new(dir: &Path, filename: &str, schema: &Schema, zstd_level: i32) -> Result<Self> {
        let final_path = dir.join(filename);
        let tmp_path = dir.join(format!("{filename}.tmp"));

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        let level = ZstdLevel::try_new(zstd_level)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .set_max_row_group_size(ROW_GROUP_SIZE)
            .build();

        let writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props))?;

        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    /// Write a record batch
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch)?;
        Ok(())
    }

    /// Finalize: flush footer and atomically rename tmp → final
    pub fn finalize(self) -> Result<usize> {
        let row_count = self.row_count;
        self.writer.close()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

/// Plain-text export with a header row, same tmp→rename discipline
pub struct CsvSink {
    writer: arrow::csv::Writer<BufWriter<File>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_count: usize,
}

impl std::fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink")
            .field("final_path", &self.final_path)
            .field("row_count", &self.row_count)
            .finish_non_exhaustive()
    }
}

impl CsvSink {
    pub fn new(dir: &Path, filename: &str) -> Result<Self> {
        let final_path = dir.join(filename);
        let tmp_path = dir.join(format!("{filename}.tmp"));
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }
        let file = BufWriter::new(File::create(&tmp_path)?);
        let writer = arrow::csv::WriterBuilder::new()
            .with_header(true)
            .build(file);
        Ok(Self {
            writer,
            tmp_path,
            final_path,
            row_count: 0,
        })
    }

    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.row_count += batch.num_rows();
        self.writer.write(batch)?;
        Ok(())
    }

    pub fn finalize(self) -> Result<usize> {
        let row_count = self.row_count;
        let mut buf = self.writer.into_inner();
        std::io::Write::flush(&mut buf)?;
        drop(buf);
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(row_count)
    }
}

/// Read every batch of a parquet file.
///
/// Returns the file schema too, so an empty file still carries its columns.
pub fn read_parquet(path: &Path) -> Result<(Arc<Schema>, Vec<RecordBatch>)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = Arc::clone(builder.schema());
    let batches = builder
        .build()?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)?;
    Ok((schema, batches))
}
