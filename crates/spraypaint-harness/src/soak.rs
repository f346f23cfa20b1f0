//! Worker/round soak driver.
//!
//! Each round the root owner paints a parent buffer and every worker runs
//! the inherit/repaint/relay/check lifecycle on its own copy. Workers scan
//! into private sinks; their diagnostics are written through the shared
//! emitter once the round's threads have joined.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use spraypaint_core::two_color::{IDENTITY_SPACE, color, paint};
use spraypaint_core::{
    Diagnostic, MemorySink, Owner, ScanLabel, ScanReport, TrackerConfig, Verifier,
};

use crate::HarnessError;
use crate::fault::{FaultPlan, XorShift64};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Largest chunk relayed through the pipe in one transfer.
pub const MAX_PIPE_CHUNK: usize = 4127;

pub const PHASE_CTOR: &str = "Ctor";
pub const PHASE_CHECK_PAPA: &str = "CheckPapa";
pub const PHASE_PAGE_PROMOTE: &str = "PagePromote";
pub const PHASE_FIRST_CHECK_ME: &str = "FirstCheckMe";
pub const PHASE_MAPPED: &str = "Mapped";
pub const PHASE_PIPE: &str = "Pipe";
pub const PHASE_MAP_CHECK: &str = "MapCheck";
pub const PHASE_FINAL_CHECK_ME: &str = "FinalCheckMe";
pub const PHASE_DTOR: &str = "Dtor";

/// Soak run parameters.
#[derive(Debug, Clone)]
pub struct SoakConfig {
    /// Worker count; worker `w` paints as owner `w`.
    pub workers: u16,
    /// Round limit; 0 means no limit, which requires `run_time`.
    pub rounds: u64,
    /// Wall-clock budget. No new round starts once it has elapsed.
    pub run_time: Option<Duration>,
    /// Size of the inherited primary buffer.
    pub buffer_size: usize,
    pub mapped_buffers: usize,
    pub mapped_size: usize,
    pub page_size: usize,
    /// Inject one random fault per worker every `n` rounds; 0 disables.
    pub fault_every: u64,
    pub seed: u64,
    pub tracker: TrackerConfig,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            rounds: 3,
            run_time: None,
            buffer_size: 64 * 1024,
            mapped_buffers: 2,
            mapped_size: 8192,
            page_size: 4096,
            fault_every: 0,
            seed: 0x5EED,
            tracker: TrackerConfig::default(),
        }
    }
}

impl SoakConfig {
    pub fn validate(&self) -> Result<(), HarnessError> {
        let max_workers = IDENTITY_SPACE - 1;
        if self.workers == 0 || self.workers > max_workers {
            return Err(HarnessError::InvalidArgument(format!(
                "workers must be in 1..={max_workers}, got {}",
                self.workers
            )));
        }
        if self.rounds == 0 && self.run_time.is_none() {
            return Err(HarnessError::InvalidArgument(
                "an unlimited round count needs a run time".to_string(),
            ));
        }
        if self.buffer_size == 0 || self.page_size == 0 {
            return Err(HarnessError::InvalidArgument(
                "buffer and page sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One worker per available CPU, capped at the number of non-root owners.
#[must_use]
pub fn default_workers() -> u16 {
    let cpus = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
    cpus.min(usize::from(IDENTITY_SPACE - 1)) as u16
}

/// A scan that did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseFailure {
    pub worker: u16,
    pub phase: &'static str,
    pub buffer_id: usize,
    pub total_fails: u64,
    pub ranges: usize,
    /// Foreign owner attributed to the first indiscretion.
    pub culprit: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoundSummary {
    pub round: u64,
    pub scans: u64,
    pub injected_faults: usize,
    pub failures: Vec<PhaseFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SoakSummary {
    pub rounds: Vec<RoundSummary>,
}

impl SoakSummary {
    #[must_use]
    pub fn total_failures(&self) -> usize {
        self.rounds.iter().map(|r| r.failures.len()).sum()
    }

    #[must_use]
    pub fn total_scans(&self) -> u64 {
        self.rounds.iter().map(|r| r.scans).sum()
    }

    /// Failures with a named culprit.
    #[must_use]
    pub fn indiscretions(&self) -> usize {
        self.rounds
            .iter()
            .flat_map(|r| &r.failures)
            .filter(|f| f.culprit.is_some())
            .count()
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.total_failures() == 0
    }
}

// What one worker produced in one round.
struct WorkerOutcome {
    worker: u16,
    scans: u64,
    injected_faults: usize,
    failures: Vec<PhaseFailure>,
    diagnostics: Vec<Diagnostic>,
    elapsed_ms: u64,
}

// Scans for one worker, collecting diagnostics and failures.
struct WorkerScanner {
    round: u64,
    worker: u16,
    local: Owner,
    tracker: TrackerConfig,
    sink: MemorySink,
    scans: u64,
    failures: Vec<PhaseFailure>,
}

impl WorkerScanner {
    fn verifier(&self, painted_by: Owner) -> Verifier {
        Verifier::new(painted_by)
            .with_local(self.local)
            .with_config(self.tracker)
    }

    fn label(&self, buffer_id: usize, phase: &str) -> String {
        ScanLabel::new(self.round, self.worker, buffer_id, phase).to_string()
    }

    fn check(&mut self, painted_by: Owner, buffer_id: usize, buffer: &[u8], phase: &'static str) {
        let label = self.label(buffer_id, phase);
        let report = self
            .verifier(painted_by)
            .scan(buffer_id, buffer, &label, &mut self.sink);
        self.record(buffer_id, phase, &report);
    }

    fn check_zeroed(&mut self, buffer_id: usize, buffer: &[u8]) {
        let label = self.label(buffer_id, PHASE_MAPPED);
        let report = self
            .verifier(self.local)
            .scan_zeroed(buffer, &label, &mut self.sink);
        self.record(buffer_id, PHASE_MAPPED, &report);
    }

    fn check_loopback(&mut self, painted_by: Owner, sent: &[u8], received: &[u8]) {
        let label = self.label(0, PHASE_PIPE);
        let report = self
            .verifier(painted_by)
            .scan_loopback(sent, received, &label, &mut self.sink);
        self.record(0, PHASE_PIPE, &report);
    }

    fn record(&mut self, buffer_id: usize, phase: &'static str, report: &ScanReport) {
        self.scans += 1;
        if report.passed() {
            return;
        }
        self.failures.push(PhaseFailure {
            worker: self.worker,
            phase,
            buffer_id,
            total_fails: report.total_fails,
            ranges: report.range_count,
            culprit: report.first_indiscretion.as_ref().map(|i| i.identity.get()),
        });
    }
}

/// Run the soak, writing every diagnostic and per-round results to `emitter`.
pub fn run_soak(
    config: &SoakConfig,
    emitter: &Mutex<LogEmitter>,
) -> Result<SoakSummary, HarnessError> {
    config.validate()?;
    let started = Instant::now();
    let mut summary = SoakSummary::default();

    let mut round = 0;
    loop {
        if config.rounds != 0 && round >= config.rounds {
            break;
        }
        if config.run_time.is_some_and(|budget| started.elapsed() >= budget) {
            break;
        }
        round += 1;

        let mut parent = vec![0u8; config.buffer_size];
        paint(Owner::ROOT, 0, &mut parent);

        let mut root = WorkerScanner {
            round,
            worker: 0,
            local: Owner::ROOT,
            tracker: config.tracker,
            sink: MemorySink::new(),
            scans: 0,
            failures: Vec::new(),
        };
        root.check(Owner::ROOT, 0, &parent, PHASE_CTOR);

        let outcomes = std::thread::scope(|scope| {
            let parent = &parent;
            let handles: Vec<_> = (1..=config.workers)
                .map(|worker| scope.spawn(move || run_worker(config, round, worker, parent)))
                .collect();
            handles
                .into_iter()
                .zip(1..=config.workers)
                .map(|(handle, worker)| {
                    handle
                        .join()
                        .map_err(|_| HarnessError::WorkerPanicked { round, worker })?
                })
                .collect::<Result<Vec<_>, HarnessError>>()
        })?;

        root.check(Owner::ROOT, 0, &parent, PHASE_DTOR);

        let mut round_summary = RoundSummary {
            round,
            ..RoundSummary::default()
        };
        let mut log = emitter.lock();
        log.emit_diagnostics(root.sink.drain(), |entry| entry.with_worker(round, 0))?;
        round_summary.scans += root.scans;
        round_summary.failures.extend(root.failures);

        for outcome in outcomes {
            let worker = outcome.worker;
            log.emit_diagnostics(outcome.diagnostics, |entry| {
                entry.with_worker(round, worker)
            })?;
            let result = if outcome.failures.is_empty() {
                Outcome::Pass
            } else {
                Outcome::Fail
            };
            log.emit_entry(
                LogEntry::new("", LogLevel::Info, "worker_result")
                    .with_worker(round, worker)
                    .with_outcome(result)
                    .with_total_fails(outcome.failures.iter().map(|f| f.total_fails).sum())
                    .with_duration_ms(outcome.elapsed_ms)
                    .with_details(serde_json::json!({
                        "scans": outcome.scans,
                        "injected_faults": outcome.injected_faults,
                        "failures": outcome.failures,
                    })),
            )?;
            round_summary.scans += outcome.scans;
            round_summary.injected_faults += outcome.injected_faults;
            round_summary.failures.extend(outcome.failures);
        }

        let level = if round_summary.failures.is_empty() {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        log.emit_entry(
            LogEntry::new("", level, "round_complete")
                .with_worker(round, 0)
                .with_details(serde_json::json!({
                    "scans": round_summary.scans,
                    "failures": round_summary.failures.len(),
                    "injected_faults": round_summary.injected_faults,
                })),
        )?;
        log.flush()?;
        drop(log);

        summary.rounds.push(round_summary);
    }

    Ok(summary)
}

fn run_worker(
    config: &SoakConfig,
    round: u64,
    worker: u16,
    parent: &[u8],
) -> Result<WorkerOutcome, HarnessError> {
    let started = Instant::now();
    let me = Owner::new(u32::from(worker))?;
    let mut rng = XorShift64::new(
        config.seed ^ round.rotate_left(32) ^ u64::from(worker).wrapping_mul(0x9E37_79B9),
    );
    let mut scanner = WorkerScanner {
        round,
        worker,
        local: me,
        tracker: config.tracker,
        sink: MemorySink::new(),
        scans: 0,
        failures: Vec::new(),
    };

    // Inherited copy still carries the parent's paint.
    let mut primary = parent.to_vec();
    let mut painted_by = Owner::ROOT;
    scanner.check(painted_by, 0, &primary, PHASE_CHECK_PAPA);

    // Touch one byte per page without changing its value.
    for p in (0..primary.len()).step_by(config.page_size) {
        primary[p] = color(painted_by, 0, p);
    }
    scanner.check(painted_by, 0, &primary, PHASE_PAGE_PROMOTE);

    paint(me, 0, &mut primary);
    painted_by = me;
    scanner.check(painted_by, 0, &primary, PHASE_FIRST_CHECK_ME);

    let mut mapped = Vec::with_capacity(config.mapped_buffers);
    for index in 0..config.mapped_buffers {
        let buffer_id = index + 1;
        let mut region = vec![0u8; config.mapped_size];
        scanner.check_zeroed(buffer_id, &region);
        paint(me, buffer_id, &mut region);
        mapped.push(region);
    }

    let received = relay_through_pipe(&primary, &mut rng);
    scanner.check_loopback(painted_by, &primary, &received);

    let mut injected_faults = 0;
    if config.fault_every != 0 && round % config.fault_every == 0 {
        let target = rng.gen_range(0, config.mapped_buffers);
        let buffer = if target == 0 {
            &mut primary
        } else {
            &mut mapped[target - 1]
        };
        let plan = FaultPlan::random(&mut rng, buffer.len(), me);
        plan.apply(buffer);
        injected_faults += plan.faults.len();
    }

    for (index, region) in mapped.iter().enumerate() {
        scanner.check(me, index + 1, region, PHASE_MAP_CHECK);
    }
    scanner.check(painted_by, 0, &primary, PHASE_FINAL_CHECK_ME);

    Ok(WorkerOutcome {
        worker,
        scans: scanner.scans,
        injected_faults,
        failures: scanner.failures,
        diagnostics: scanner.sink.drain(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

/// Copy `data` through a bounded channel in chunks of random length.
pub fn relay_through_pipe(data: &[u8], rng: &mut XorShift64) -> Vec<u8> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let len = rng.gen_range(1, MAX_PIPE_CHUNK).min(data.len() - offset);
        chunks.push(offset..offset + len);
        offset += len;
    }

    let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(4);
    std::thread::scope(|scope| {
        scope.spawn(move || {
            for range in chunks {
                if tx.send(data[range].to_vec()).is_err() {
                    break;
                }
            }
        });
        let mut received = Vec::with_capacity(data.len());
        for chunk in rx {
            received.extend_from_slice(&chunk);
        }
        received
    })
}
