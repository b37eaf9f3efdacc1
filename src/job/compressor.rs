use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::{
    config::CompressConfig,
    foundation::error::{CompressError, CompressResult},
    job::{JobStatus, TranscodeJob},
    media::{
        backend::MediaBackend,
        codec::{CodecMode, CodecPort},
        sink::{ContainerFormat, MuxSink},
        source::{DemuxSource, select_video_track},
    },
    pipeline::{Pump, PumpOptions, PumpStats},
    plan::params::{OutputParams, encoder_format, plan_output_params},
};

/// Outcome of a successful job.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CompressReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: OutputParams,
    pub stats: PumpStats,
    pub elapsed: Duration,
    /// `None` when the path is not a file on disk, e.g. with the loopback backend.
    pub input_bytes: Option<u64>,
    pub output_bytes: Option<u64>,
}

impl CompressReport {
    /// `output_bytes / input_bytes` when both sizes are known and the input is not empty.
    pub fn ratio(&self) -> Option<f64> {
        match (self.input_bytes, self.output_bytes) {
            (Some(input), Some(output)) if input > 0 => Some(output as f64 / input as f64),
            _ => None,
        }
    }

    /// Share of the input size saved by re-encoding, in percent. Negative when the output grew.
    pub fn saved_percent(&self) -> Option<f64> {
        self.ratio().map(|ratio| (1.0 - ratio) * 100.0)
    }
}

/// Entry point for transcode jobs. Runs at most one job at a time.
///
/// `Compressor` is `Sync`; share it behind an `Arc` to start jobs from several threads. A
/// second [`Compressor::begin`] while a job is running fails with
/// [`CompressError::AlreadyInProgress`] and leaves the running job alone.
#[derive(Debug)]
pub struct Compressor {
    config: CompressConfig,
    status: Arc<Mutex<JobStatus>>,
}

impl Compressor {
    pub fn new(config: CompressConfig) -> CompressResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            status: Arc::new(Mutex::new(JobStatus::Idle)),
        })
    }

    pub fn config(&self) -> &CompressConfig {
        &self.config
    }

    pub fn status(&self) -> JobStatus {
        lock(&self.status).clone()
    }

    /// Claim the compressor for `input`. The claim is held until the handle is run or dropped.
    pub fn begin(&self, input: impl Into<PathBuf>) -> CompressResult<JobHandle> {
        let mut status = lock(&self.status);
        if status.is_running() {
            return Err(CompressError::AlreadyInProgress);
        }
        let job = TranscodeJob::for_input(input, &self.config.output_suffix)?;
        *status = JobStatus::Running {
            input: job.input.clone(),
        };
        Ok(JobHandle {
            job,
            config: self.config.clone(),
            status: Arc::clone(&self.status),
            settled: false,
        })
    }

    pub fn compress(
        &self,
        backend: &dyn MediaBackend,
        input: impl Into<PathBuf>,
    ) -> CompressResult<CompressReport> {
        self.begin(input)?.run(backend)
    }
}

/// Exclusive claim on a [`Compressor`] for one job.
#[derive(Debug)]
pub struct JobHandle {
    job: TranscodeJob,
    config: CompressConfig,
    status: Arc<Mutex<JobStatus>>,
    settled: bool,
}

impl JobHandle {
    pub fn job(&self) -> &TranscodeJob {
        &self.job
    }

    #[tracing::instrument(skip_all, fields(input = %self.job.input.display()))]
    pub fn run(mut self, backend: &dyn MediaBackend) -> CompressResult<CompressReport> {
        let started = Instant::now();
        let mut resources = JobResources::default();

        let body = self.execute(backend, &mut resources);
        let teardown = resources.teardown();
        let result = match (body, teardown) {
            (Ok(_), Err(e)) => Err(e),
            (body, _) => body,
        };

        let result = result.map(|(params, stats)| {
            let report = CompressReport {
                input: self.job.input.clone(),
                output: self.job.output.clone(),
                params,
                stats,
                elapsed: started.elapsed(),
                input_bytes: file_size(&self.job.input),
                output_bytes: file_size(&self.job.output),
            };
            log_sizes(&report);
            report
        });

        let status = match &result {
            Ok(report) => {
                tracing::info!(
                    output = %report.output.display(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "compression finished"
                );
                JobStatus::Succeeded {
                    output: report.output.clone(),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "compression failed");
                JobStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        *lock(&self.status) = status;
        self.settled = true;
        result
    }

    fn execute(
        &self,
        backend: &dyn MediaBackend,
        res: &mut JobResources,
    ) -> CompressResult<(OutputParams, PumpStats)> {
        let settings = &self.config.encoder;

        let source = res.source.insert(backend.open_source(&self.job.input)?);
        let track = select_video_track(&mut **source)?;

        let encoder = res.encoder.insert(backend.create_encoder(&settings.mime)?);
        let params = plan_output_params(&track.format, &**encoder, settings)?;
        let format = encoder_format(&params, settings);
        if let Err(e) = encoder.configure(&format, CodecMode::Encode) {
            if !format.has_quality_hints() {
                return Err(e);
            }
            tracing::warn!(error = %e, "encoder rejected quality hints, configuring without them");
            encoder.configure(&format.without_quality_hints(), CodecMode::Encode)?;
        }

        let decoder = res
            .decoder
            .insert(backend.create_decoder(&track.format.mime)?);
        decoder.configure(&track.format, CodecMode::Decode)?;

        let sink = res
            .sink
            .insert(backend.create_sink(&self.job.output, ContainerFormat::Mp4)?);
        sink.set_orientation_hint(params.rotation)?;

        let (Some(source), Some(decoder), Some(encoder), Some(sink)) = (
            res.source.as_deref_mut(),
            res.decoder.as_deref_mut(),
            res.encoder.as_deref_mut(),
            res.sink.as_deref_mut(),
        ) else {
            return Err(CompressError::validation("job resources were not created"));
        };
        decoder.start()?;
        encoder.start()?;

        let opts = PumpOptions::from(&self.config);
        let stats = Pump::new(source, decoder, encoder, sink, opts).run()?;
        Ok((params, stats))
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if !self.settled {
            let mut status = lock(&self.status);
            if status.is_running() {
                *status = JobStatus::Idle;
            }
        }
    }
}

/// Resources created by a job, torn down in a fixed order.
#[derive(Default)]
struct JobResources {
    source: Option<Box<dyn DemuxSource>>,
    decoder: Option<Box<dyn CodecPort>>,
    encoder: Option<Box<dyn CodecPort>>,
    sink: Option<Box<dyn MuxSink>>,
}

impl JobResources {
    /// Decoder, encoder, source, then sink. Only resources that exist are touched, and each
    /// one is taken out so a second teardown is a no-op. Returns the first error.
    fn teardown(&mut self) -> CompressResult<()> {
        let mut first: Option<CompressError> = None;
        let mut note = |what: &str, result: CompressResult<()>| {
            if let Err(e) = result {
                tracing::warn!(resource = what, error = %e, "teardown step failed");
                first.get_or_insert(e);
            }
        };

        if let Some(mut decoder) = self.decoder.take() {
            note("decoder.stop", decoder.stop());
            note("decoder.release", decoder.release());
        }
        if let Some(mut encoder) = self.encoder.take() {
            note("encoder.stop", encoder.stop());
            note("encoder.release", encoder.release());
        }
        if let Some(mut source) = self.source.take() {
            note("source.release", source.release());
        }
        if let Some(mut sink) = self.sink.take() {
            note("sink.stop", sink.stop());
            note("sink.release", sink.release());
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for JobResources {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

fn lock(status: &Mutex<JobStatus>) -> MutexGuard<'_, JobStatus> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

fn log_sizes(report: &CompressReport) {
    let (Some(input), Some(output), Some(saved)) =
        (report.input_bytes, report.output_bytes, report.saved_percent())
    else {
        return;
    };
    tracing::info!(
        input_mib = format!("{:.2}", input as f64 / (1024.0 * 1024.0)),
        output_mib = format!("{:.2}", output as f64 / (1024.0 * 1024.0)),
        saved = format!("{saved:.1}%"),
        "output size"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{Call, LoopbackBackend, Resource, SyntheticMedia};

    #[test]
    fn second_begin_is_rejected_until_handle_drops() {
        let compressor = Compressor::new(CompressConfig::default()).unwrap();
        let handle = compressor.begin("a.mp4").unwrap();
        assert!(compressor.status().is_running());
        assert!(matches!(
            compressor.begin("b.mp4"),
            Err(CompressError::AlreadyInProgress)
        ));
        drop(handle);
        assert_eq!(compressor.status(), JobStatus::Idle);
        assert!(compressor.begin("b.mp4").is_ok());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = CompressConfig {
            output_suffix: String::new(),
            ..CompressConfig::default()
        };
        assert!(Compressor::new(cfg).is_err());
    }

    #[test]
    fn status_tracks_outcome() {
        let compressor = Compressor::new(CompressConfig::default()).unwrap();
        let backend = LoopbackBackend::new(SyntheticMedia::clip(3, 16, 16, 1_000));
        let report = compressor.compress(&backend, "clip.mp4").unwrap();
        assert_eq!(
            compressor.status(),
            JobStatus::Succeeded {
                output: report.output.clone()
            }
        );
        assert_eq!(report.output, PathBuf::from("clip_compress.mp4"));
        assert_eq!(report.input_bytes, None);
        assert_eq!(report.ratio(), None);

        let empty = LoopbackBackend::new(SyntheticMedia::default());
        assert!(compressor.compress(&empty, "clip.mp4").is_err());
        assert!(matches!(compressor.status(), JobStatus::Failed { .. }));
    }

    #[test]
    fn failed_setup_tears_down_only_what_exists() {
        let cfg = CompressConfig::default();
        let compressor = Compressor::new(cfg).unwrap();
        let mut media = SyntheticMedia::clip(2, 16, 16, 1);
        media.tracks[0].format.mime = "video/x-unknown".to_string();
        media.tracks[0].format.width = None;
        let backend = LoopbackBackend::new(media);

        assert!(matches!(
            compressor.compress(&backend, "clip.mp4"),
            Err(CompressError::Validation(_))
        ));
        let journal = backend.journal();
        assert_eq!(
            journal.teardown(),
            vec![
                (Resource::Encoder, Call::Stop),
                (Resource::Encoder, Call::Release),
                (Resource::Source, Call::Release),
            ]
        );
        assert_eq!(journal.count(Resource::Decoder, Call::Open), 0);
        assert_eq!(journal.count(Resource::Sink, Call::Open), 0);
    }

    #[test]
    fn rejected_quality_hints_fall_back_to_plain_format() {
        let compressor = Compressor::new(CompressConfig::default()).unwrap();
        let mut backend = LoopbackBackend::new(SyntheticMedia::clip(3, 16, 16, 1_000));
        backend.encoder.reject_quality_hints = true;

        let report = compressor.compress(&backend, "clip.mp4").unwrap();
        assert_eq!(report.stats.samples_written, 3);
        assert_eq!(backend.journal().count(Resource::Encoder, Call::Configure), 2);
        let rec = backend.last_recording().unwrap();
        assert_eq!(rec.tracks.len(), 1);
        assert!(!rec.tracks[0].has_quality_hints());
    }

    #[test]
    fn teardown_is_idempotent() {
        let backend = LoopbackBackend::new(SyntheticMedia::clip(1, 16, 16, 1));
        let mut res = JobResources::default();
        res.source = Some(backend.open_source(Path::new("x.mp4")).unwrap());
        res.teardown().unwrap();
        res.teardown().unwrap();
        drop(res);
        assert_eq!(backend.journal().count(Resource::Source, Call::Release), 1);
    }

    #[test]
    fn ratio_needs_both_sizes() {
        let report = CompressReport {
            input: PathBuf::from("a.mp4"),
            output: PathBuf::from("a_compress.mp4"),
            params: OutputParams {
                width: 2,
                height: 2,
                frame_rate: 60,
                bit_rate: 1,
                rotation: Default::default(),
                color_format: crate::foundation::format::ColorFormat::YUV420_FLEXIBLE,
                color_range: None,
                color_standard: None,
                color_transfer: None,
            },
            stats: PumpStats::default(),
            elapsed: Duration::ZERO,
            input_bytes: Some(200),
            output_bytes: Some(50),
        };
        assert_eq!(report.ratio(), Some(0.25));
        assert_eq!(report.saved_percent(), Some(75.0));

        let grown = CompressReport {
            output_bytes: Some(300),
            ..report.clone()
        };
        assert_eq!(grown.saved_percent(), Some(-50.0));

        let empty = CompressReport {
            input_bytes: Some(0),
            ..report
        };
        assert_eq!(empty.ratio(), None);
        assert_eq!(empty.saved_percent(), None);
    }
}
