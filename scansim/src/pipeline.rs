//! The dataset generation loop: for each sample the target is moved to a random pose, scanned, and
//! the resulting point cloud and ground truth row are written out.

use crate::config::RunConfig;
use crate::dataset::{self, GroundTruthRecord, GroundTruthTable};
use crate::pose::PoseRandomizer;
use crate::scene::{GeometryOracle, TargetProvider, TargetState};
use crate::sensors::{RangeScanner, ScanSample, SimulatedPointSensor};
use crate::visualize::{DebugVisualizer, VisualizationRequest, render_best_effort};
use crate::{Result, ScanError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const PROGRESS_EVERY: usize = 10;

/// A coarse, shareable abort flag which the generator checks once per sample.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub samples: usize,
    pub total_points: usize,
    pub ground_truth: PathBuf,
    pub debug_views: Vec<PathBuf>,
    pub seed: u64,
}

/// The random number generator for one sample. Every sample has its own stream derived from the
/// run seed, so the dataset does not depend on the order in which samples are processed. The run
/// seed and the sample index fill separate halves of the generator key, so no two different
/// `(seed, sample_id)` pairs share a stream.
pub fn sample_rng(seed: u64, sample_id: usize) -> StdRng {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&seed.to_le_bytes());
    key[16..24].copy_from_slice(&(sample_id as u64).to_le_bytes());
    StdRng::from_seed(key)
}

pub struct DatasetGenerator<'a, O: GeometryOracle> {
    config: RunConfig,
    oracle: &'a O,
    target: TargetState,
    scanner: RangeScanner,
    randomizer: PoseRandomizer,
    seed: u64,
}

impl<'a, O: GeometryOracle> DatasetGenerator<'a, O> {
    /// Validate the configuration and resolve every collaborator. All configuration errors are
    /// raised here, before anything is sampled or written.
    pub fn new<P: TargetProvider + ?Sized>(
        config: RunConfig,
        provider: &P,
        oracle: &'a O,
    ) -> Result<Self> {
        config.validate()?;
        let target = provider.resolve_target(&config.target)?;
        let frame = config.sensor_frame()?;
        let scanner = RangeScanner::new(
            frame,
            config.ray_grid()?,
            config.max_range_m,
            config.noise_std_dev_m,
        )?
        .with_parallel_rays(config.parallel_rays);
        let randomizer =
            PoseRandomizer::new(config.rotation_range_deg, config.translation_range_m)?;
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());

        Ok(Self {
            config,
            oracle,
            target,
            scanner,
            randomizer,
            seed,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn target(&self) -> &TargetState {
        &self.target
    }

    pub fn scanner(&self) -> &RangeScanner {
        &self.scanner
    }

    /// Move the target to the random pose of sample `sample_id` and scan it. This only depends on
    /// the run seed and the sample index.
    pub fn generate_sample(
        &self,
        sample_id: usize,
        target: &mut TargetState,
    ) -> (GroundTruthRecord, ScanSample) {
        let mut rng = sample_rng(self.seed, sample_id);
        let (matrix, pose) = self.randomizer.apply(target, &mut rng);
        let sample = self.scanner.get_points(self.oracle, target, &mut rng);
        (GroundTruthRecord::new(sample_id, pose, matrix), sample)
    }

    fn write_sample(&self, record: &GroundTruthRecord, sample: &ScanSample) -> Result<()> {
        let path = self.config.output_dir.join(&record.filename);
        dataset::write_scan_csv(&path, sample.points())
    }

    /// Run the whole generation. Debug views are rendered first when enabled and a visualizer is
    /// given; their failure is only logged. Any I/O error or a cancellation aborts the run and
    /// leaves the ground truth table under its partial name.
    pub fn run(
        &self,
        visualizer: Option<&dyn DebugVisualizer>,
        cancel: &CancelToken,
    ) -> Result<RunSummary> {
        let requested = self.config.sample_count;
        info!(
            "Starting dataset generation: {} samples, max range {}m, seed {}",
            requested, self.config.max_range_m, self.seed
        );

        std::fs::create_dir_all(&self.config.output_dir)?;
        let config_path = self.config.output_dir.join("run_config.json");
        let mut recorded = self.config.clone();
        recorded.seed = Some(self.seed);
        std::fs::write(&config_path, serde_json::to_string_pretty(&recorded)?)?;

        let debug_views = match visualizer {
            Some(v) if self.config.visualize => {
                let request = VisualizationRequest {
                    output_dir: &self.config.output_dir,
                    target: &self.target,
                    frame: self.scanner.frame(),
                    fov: self.config.fov,
                    max_range: self.config.max_range_m,
                };
                render_best_effort(v, self.oracle, &request)
            }
            _ => {
                info!("Visualization skipped");
                Vec::new()
            }
        };

        let mut table = GroundTruthTable::create(
            &self.config.output_dir,
            &self.config.settings_line(self.seed),
        )?;

        let total_points = if self.config.parallel_samples {
            self.run_parallel(&mut table, cancel)?
        } else {
            self.run_serial(&mut table, cancel)?
        };

        let ground_truth = table.finish()?;
        info!(
            "Dataset generation finished: {} samples, {} points",
            requested, total_points
        );

        Ok(RunSummary {
            samples: requested,
            total_points,
            ground_truth,
            debug_views,
            seed: self.seed,
        })
    }

    fn run_serial(&self, table: &mut GroundTruthTable, cancel: &CancelToken) -> Result<usize> {
        let requested = self.config.sample_count;
        let mut target = self.target.clone();
        let mut total = 0;

        for i in 0..requested {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled {
                    completed: i,
                    requested,
                });
            }

            let (record, sample) = self.generate_sample(i, &mut target);
            self.write_sample(&record, &sample)?;
            table.append(&record)?;
            total += sample.len();
            log_progress(i, requested, sample.len());
        }

        Ok(total)
    }

    /// Samples are independent once each worker owns its own copy of the target state. They are
    /// processed in batches so that table rows are still appended in sample order, from this
    /// thread only, while the point cloud files are written by the workers.
    fn run_parallel(&self, table: &mut GroundTruthTable, cancel: &CancelToken) -> Result<usize> {
        let requested = self.config.sample_count;
        let batch = (rayon::current_num_threads() * 4).max(1);
        let mut total = 0;
        let mut start = 0;

        while start < requested {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled {
                    completed: start,
                    requested,
                });
            }

            let end = (start + batch).min(requested);
            debug!("Processing samples {start}..{end} in parallel");
            let results = (start..end)
                .into_par_iter()
                .map(|i| -> Result<(GroundTruthRecord, usize)> {
                    let mut target = self.target.clone();
                    let (record, sample) = self.generate_sample(i, &mut target);
                    self.write_sample(&record, &sample)?;
                    Ok((record, sample.len()))
                })
                .collect::<Result<Vec<_>>>()?;

            for (record, count) in results {
                table.append(&record)?;
                total += count;
                log_progress(record.sample_id, requested, count);
            }
            start = end;
        }

        Ok(total)
    }
}

fn log_progress(i: usize, requested: usize, points: usize) {
    if i % PROGRESS_EVERY == 0 {
        info!("Generated sample {i}/{requested} - {points} points");
    } else {
        debug!("Generated sample {i}/{requested} - {points} points");
    }
}
