//! This module has the I/O functionality for the generated dataset: one `scan_NNNN.csv` point
//! cloud per sample and a single `ground_truth.csv` table with one row per sample.
//!
//! The ground truth table is structured as follows:
//!
//! - line 1: a `# Settings: ...` comment recording the run configuration
//! - line 2: the header `sample_id,filename,rx_rad,ry_rad,rz_rad,tx_m,ty_m,tz_m,m00,...,m33`
//! - one row per sample, with the pose scalars and the row-major flattened 4x4 world transform of
//!   the target, all with six decimals
//!
//! While a run is in progress the table is written to `ground_truth.csv.partial` and it is only
//! renamed to its final name by `GroundTruthTable::finish`.

use crate::pose::Pose;
use crate::{Matrix4, Point3, Result, ScanError};
use itertools::Itertools;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const GROUND_TRUTH_FILE: &str = "ground_truth.csv";
const PARTIAL_SUFFIX: &str = ".partial";
const POSE_FIELDS: [&str; 6] = ["rx_rad", "ry_rad", "rz_rad", "tx_m", "ty_m", "tz_m"];

/// The name of the point cloud file for a sample index, zero padded to four digits
pub fn scan_file_name(sample_id: usize) -> String {
    format!("scan_{sample_id:04}.csv")
}

/// The 24 column names of the ground truth table
pub fn ground_truth_header() -> Vec<String> {
    let mut header = vec!["sample_id".to_string(), "filename".to_string()];
    header.extend(POSE_FIELDS.iter().map(|s| s.to_string()));
    header.extend((0..4).cartesian_product(0..4).map(|(r, c)| format!("m{r}{c}")));
    header
}

/// One row of the ground truth table
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthRecord {
    pub sample_id: usize,
    pub filename: String,
    pub pose: Pose,
    pub matrix: Matrix4,
}

impl GroundTruthRecord {
    pub fn new(sample_id: usize, pose: Pose, matrix: Matrix4) -> Self {
        Self {
            sample_id,
            filename: scan_file_name(sample_id),
            pose,
            matrix,
        }
    }

    /// The matrix entries in row-major order
    pub fn flat_matrix(&self) -> [f64; 16] {
        let mut flat = [0.0; 16];
        for (r, c) in (0..4).cartesian_product(0..4) {
            flat[r * 4 + c] = self.matrix[(r, c)];
        }
        flat
    }

    fn to_row(&self) -> String {
        let values = self
            .pose
            .as_array()
            .into_iter()
            .chain(self.flat_matrix())
            // Exact zeros from the rotation matrix may carry a sign
            .map(|v| if v == 0.0 { 0.0 } else { v })
            .map(|v| format!("{v:.6}"));
        [self.sample_id.to_string(), self.filename.clone()]
            .into_iter()
            .chain(values)
            .join(",")
    }
}

/// Write the points of one sample as `X,Y,Z` rows with six decimals, preserving their order.
pub fn write_scan_csv(path: &Path, points: &[Point3]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "X,Y,Z")?;
    for p in points {
        writeln!(writer, "{:.6},{:.6},{:.6}", p.x, p.y, p.z)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_scan_csv(path: &Path) -> Result<Vec<Point3>> {
    let reader = BufReader::new(File::open(path)?);
    let mut points = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if i == 0 {
            if line.trim() != "X,Y,Z" {
                return Err(parse_error(path, 1, "expected header 'X,Y,Z'"));
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let values = parse_floats(&line).map_err(|m| parse_error(path, i + 1, &m))?;
        if values.len() != 3 {
            return Err(parse_error(path, i + 1, "expected 3 fields"));
        }
        points.push(Point3::new(values[0], values[1], values[2]));
    }
    Ok(points)
}

/// The streaming writer for the ground truth table. Rows are flushed as they are appended so that
/// progress survives in the partial file, but the table only takes its final name once the run
/// finishes.
pub struct GroundTruthTable {
    writer: BufWriter<File>,
    partial_path: PathBuf,
    final_path: PathBuf,
    rows: usize,
}

impl GroundTruthTable {
    /// Create the table in `dir`, writing the settings comment line and the header. A complete
    /// table left by an earlier run in the same directory is removed first, since its scan files
    /// are about to be overwritten.
    pub fn create(dir: &Path, settings: &str) -> Result<Self> {
        let final_path = dir.join(GROUND_TRUTH_FILE);
        let partial_path = dir.join(format!("{GROUND_TRUTH_FILE}{PARTIAL_SUFFIX}"));

        match std::fs::remove_file(&final_path) {
            Ok(()) => warn!("Removed the ground truth table of a previous run"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = File::create(&partial_path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "# Settings: {settings}")?;
        writeln!(writer, "{}", ground_truth_header().join(","))?;
        writer.flush()?;

        Ok(Self {
            writer,
            partial_path,
            final_path,
            rows: 0,
        })
    }

    pub fn append(&mut self, record: &GroundTruthRecord) -> Result<()> {
        writeln!(self.writer, "{}", record.to_row())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Flush and move the table to its final name, returning that path
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        drop(self.writer);
        std::fs::rename(&self.partial_path, &self.final_path)?;
        Ok(self.final_path)
    }
}

/// The contents of a ground truth file read back from disk
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub settings: String,
    pub records: Vec<GroundTruthRecord>,
}

pub fn read_ground_truth(path: &Path) -> Result<GroundTruth> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines().enumerate();

    let settings = match lines.next() {
        Some((_, line)) => {
            let line = line?;
            line.strip_prefix("# Settings: ")
                .map(|s| s.to_string())
                .ok_or_else(|| parse_error(path, 1, "missing settings comment"))?
        }
        None => return Err(parse_error(path, 1, "file is empty")),
    };

    let header = match lines.next() {
        Some((_, line)) => line?,
        None => String::new(),
    };
    if header != ground_truth_header().join(",") {
        return Err(parse_error(path, 2, "unexpected header"));
    }

    let mut records = Vec::new();
    for (i, line) in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_record(&line).map_err(|m| parse_error(path, i + 1, &m))?;
        records.push(record);
    }

    Ok(GroundTruth { settings, records })
}

fn parse_record(line: &str) -> std::result::Result<GroundTruthRecord, String> {
    let fields = line.split(',').collect::<Vec<_>>();
    if fields.len() != 24 {
        return Err(format!("expected 24 fields, found {}", fields.len()));
    }
    let sample_id = fields[0]
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("sample_id: {e}"))?;
    let values = parse_floats(&fields[2..].join(","))?;
    let pose = Pose::new(values[0], values[1], values[2], values[3], values[4], values[5]);
    let matrix = Matrix4::from_row_slice(&values[6..]);

    Ok(GroundTruthRecord {
        sample_id,
        filename: fields[1].trim().to_string(),
        pose,
        matrix,
    })
}

fn parse_floats(line: &str) -> std::result::Result<Vec<f64>, String> {
    line.split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| format!("'{}': {e}", s.trim()))
        })
        .collect()
}

fn parse_error(path: &Path, line: usize, message: &str) -> ScanError {
    ScanError::Parse {
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    }
}
