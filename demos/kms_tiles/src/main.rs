// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renders independent tiles on KMS overlay planes.
//!
//! Each tile gets its own overlay plane, buffer chain and render thread; the
//! main thread composites the latest frame of every tile with one atomic
//! commit per cycle until SIGINT or SIGTERM.
//!
//! ```text
//! kms_tiles --connector 24 --tiles 3 --producer cube --trace
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread::JoinHandle;

use clap::{CommandFactory, Parser, ValueEnum};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use laminate_backend_drm::{DrmDevice, now, timebase};
use laminate_core::cancel::CancelToken;
use laminate_core::config::{CompositorConfig, RetirePolicy, ValidationPolicy};
use laminate_core::error::AllocError;
use laminate_core::geometry::SurfaceRect;
use laminate_core::id::ConnectorId;
use laminate_core::plane::PlaneRegistry;
use laminate_core::scheduler::{CommitScheduler, CycleOutcome};
use laminate_core::surface::Surface;
use laminate_core::timing::{DEFAULT_FPS_WINDOW, FrameRateMeter};
use laminate_core::trace::{TraceSink, Tracer};
use laminate_core::worker::{ContentProducer, RenderWorker, WorkerStats};
use laminate_debug::pretty::PrettyPrintSink;
use laminate_debug::tracing_sink::TracingSink;
use laminate_render::{CubeProducer, YuvTileProducer};

const TILE_WIDTH: u32 = 960;
const TILE_HEIGHT: u32 = 540;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Producer {
    /// Rotating cube over a color-cycling background.
    Cube,
    /// Scrolling YUV 4:2:0 tile pattern.
    Yuv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Validation {
    /// Submit even if the test commit fails.
    Proceed,
    /// Skip the cycle if the test commit fails.
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TraceOutput {
    /// One human-readable line per event on stderr.
    Pretty,
    /// Forward events to the log at trace/debug level.
    Log,
}

/// Composite independently rendered tiles on KMS overlay planes.
#[derive(Debug, Parser)]
#[command(name = "kms_tiles", version)]
struct Args {
    /// Connector to drive.
    #[arg(long, default_value_t = 24)]
    connector: u32,
    /// DRM card node.
    #[arg(long, default_value = "/dev/dri/card0")]
    device: PathBuf,
    /// Tiles to request, one overlay plane each.
    #[arg(long, default_value_t = 3)]
    tiles: u32,
    /// Content drawn into every tile.
    #[arg(long, value_enum, default_value_t = Producer::Cube)]
    producer: Producer,
    /// Reaction to a failed test commit.
    #[arg(long, value_enum, default_value_t = Validation::Proceed)]
    validation: Validation,
    /// Keep each committed buffer until the next commit completes.
    #[arg(long)]
    deferred_release: bool,
    /// Emit commit-loop trace events.
    #[arg(
        long,
        value_enum,
        num_args = 0..=1,
        default_missing_value = "pretty",
        require_equals = true
    )]
    trace: Option<TraceOutput>,
}

impl Args {
    fn config(&self) -> CompositorConfig {
        let mut config = CompositorConfig::reference();
        config.validation = match self.validation {
            Validation::Proceed => ValidationPolicy::Proceed,
            Validation::Skip => ValidationPolicy::SkipCycle,
        };
        if self.deferred_release {
            config.retire = RetirePolicy::Deferred;
            config.chain_length = config.chain_length.max(config.retire.min_chain_length());
        }
        config
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let setup = match Setup::new(&args) {
        Ok(setup) => setup,
        Err(err) => {
            error!(%err, "initialization failed");
            if let Err(err) = Args::command().print_help() {
                warn!(%err, "could not print usage");
            }
            return ExitCode::FAILURE;
        }
    };
    setup.run(args.trace)
}

/// Everything built before the first thread starts.
struct Setup {
    cancel: CancelToken,
    scheduler: CommitScheduler<DrmDevice>,
    surfaces: Vec<Arc<Surface<DrmDevice>>>,
    producer: Producer,
}

impl Setup {
    fn new(args: &Args) -> Result<Self, Box<dyn Error>> {
        let config = args.config();
        config.validate()?;

        // -- device and planes -------------------------------------------------
        let device = Arc::new(DrmDevice::open(&args.device, ConnectorId(args.connector))?);
        let descriptors = device.discover_planes()?;
        let mut registry =
            PlaneRegistry::from_discovery(Arc::clone(&device), descriptors, config.max_overlays);
        let ordered = registry.apply_stacking_order()?;
        info!(
            planes = registry.planes().len(),
            overlays = registry.overlay_count(),
            ordered,
            "planes ready"
        );

        // -- surfaces ----------------------------------------------------------
        let mut surfaces = Vec::new();
        for i in 0..args.tiles {
            // Tiles march down the diagonal; out-of-range ones are rejected.
            let x = i32::try_from(i.saturating_mul(TILE_WIDTH)).unwrap_or(i32::MAX);
            let y = i32::try_from(i.saturating_mul(TILE_HEIGHT)).unwrap_or(i32::MAX);
            let rect = SurfaceRect::new(x, y, TILE_WIDTH, TILE_HEIGHT);
            match registry.allocate(rect, config.chain_length) {
                Ok(surface) => surfaces.push(surface),
                Err(AllocError::NoFreePlane) => break,
                Err(err) => warn!(tile = i, %err, "tile skipped"),
            }
        }
        info!(
            "requested {} instances, rendering {}",
            args.tiles,
            surfaces.len()
        );
        if surfaces.is_empty() {
            return Err("no tile could be placed on an overlay plane".into());
        }

        // The registry is frozen from here on.
        let scheduler = CommitScheduler::new(registry, config).with_clock(now);

        let cancel = CancelToken::new();
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, cancel.flag())?;
        }

        Ok(Self {
            cancel,
            scheduler,
            surfaces,
            producer: args.producer,
        })
    }

    fn run(mut self, trace: Option<TraceOutput>) -> ExitCode {
        // -- render threads ----------------------------------------------------
        let spawned = match self.producer {
            Producer::Cube => spawn_workers(&self.surfaces, &self.cancel, || {
                CubeProducer::new(fastrand::u32(..))
            }),
            Producer::Yuv => {
                spawn_workers(&self.surfaces, &self.cancel, YuvTileProducer::default)
            }
        };
        let workers = match spawned {
            Ok(workers) => workers,
            Err(err) => {
                error!(%err, "failed to start render workers");
                self.cancel.cancel();
                return ExitCode::FAILURE;
            }
        };

        // -- commit loop -------------------------------------------------------
        let mut pretty;
        let mut logged;
        let sink: Option<&mut dyn TraceSink> = match trace {
            Some(TraceOutput::Pretty) => {
                pretty = PrettyPrintSink::stderr(timebase());
                Some(&mut pretty)
            }
            Some(TraceOutput::Log) => {
                logged = TracingSink::new(timebase());
                Some(&mut logged)
            }
            None => None,
        };
        let mut tracer = sink.map_or_else(Tracer::none, Tracer::new);

        let mut meter = FrameRateMeter::new(DEFAULT_FPS_WINDOW, timebase());
        let result = self.scheduler.run(&self.cancel, &mut tracer, |report| {
            if report.outcome == CycleOutcome::Committed
                && let Some(fps) = meter.tick(now())
            {
                info!(cycle = report.cycle, "{fps:.1} fps");
            }
        });

        // -- shutdown ----------------------------------------------------------
        self.cancel.cancel();
        for (i, worker) in workers.into_iter().enumerate() {
            match worker.join() {
                Ok(WorkerStats { frames, failures }) => {
                    info!(tile = i, frames, failures, "render worker stopped");
                }
                Err(_) => error!(tile = i, "render worker panicked"),
            }
        }

        match result {
            Ok(summary) => {
                info!(
                    cycles = summary.cycles,
                    committed = summary.committed,
                    failed = summary.failed,
                    "done"
                );
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!(%err, "commit loop gave up");
                ExitCode::FAILURE
            }
        }
    }
}

fn spawn_workers<P: ContentProducer>(
    surfaces: &[Arc<Surface<DrmDevice>>],
    cancel: &CancelToken,
    mut producer: impl FnMut() -> P,
) -> Result<Vec<JoinHandle<WorkerStats>>, Box<dyn Error>> {
    let mut handles = Vec::with_capacity(surfaces.len());
    for surface in surfaces {
        let worker = RenderWorker::new(Arc::clone(surface), producer())?;
        handles.push(worker.spawn(cancel.clone())?);
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn usage_renders_into_a_buffer() {
        let mut out = Vec::new();
        Args::command()
            .write_help(&mut out)
            .expect("help should render");
        let help = String::from_utf8(out).expect("help is UTF-8");
        assert!(help.contains("--connector"), "usage lists the connector flag");
    }

    #[test]
    fn deferred_release_lengthens_the_chain() {
        let args = Args::parse_from(["kms_tiles", "--deferred-release", "--validation", "skip"]);
        let config = args.config();
        assert_eq!(config.retire, RetirePolicy::Deferred);
        assert_eq!(config.validation, ValidationPolicy::SkipCycle);
        assert!(config.validate().is_ok(), "adjusted config must validate");
    }
}
