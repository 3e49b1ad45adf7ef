//! Scan orchestrator - runs the collectors one step at a time, then the detectors

use crate::blockers;
use crate::config::{AppConfig, ScanLimits};
use crate::error::{ScanError, ScanResult};
use crate::inventory::{automation, org, ownership, reporting, schema, CollectorContext};
use crate::salesforce::{SalesforceAuth, SalesforceClient};
use crate::types::{ScanOutput, ScanProgress};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Receives every progress report of one scan, in order.
pub type ProgressSink = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// Per-scan knobs supplied by the caller.
#[derive(Clone, Default)]
pub struct ScanOptions {
    pub cancel: CancellationToken,
    pub on_progress: Option<ProgressSink>,
    pub limits: ScanLimits,
}

impl ScanOptions {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.on_progress = Some(sink);
        self
    }

    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }
}

// ============================================
// STEP TABLE
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    OrgInfo,
    Schema,
    Picklists,
    RecordTypes,
    Flows,
    Triggers,
    ValidationRules,
    Profiles,
    PermissionSets,
    Roles,
    Queues,
    SharingRules,
    Reports,
    Dashboards,
    Layouts,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanStep {
    pub kind: StepKind,
    pub name: &'static str,
    pub percent: u8,
    pub message: &'static str,
}

const fn step(kind: StepKind, name: &'static str, percent: u8, message: &'static str) -> ScanStep {
    ScanStep {
        kind,
        name,
        percent,
        message,
    }
}

/// Executed strictly in this order, one at a time.
pub const SCAN_STEPS: [ScanStep; 15] = [
    step(StepKind::OrgInfo, "org_info", 10, "Retrieving organization information"),
    step(StepKind::Schema, "schema", 25, "Scanning objects and fields"),
    step(StepKind::Picklists, "picklists", 30, "Scanning picklist values"),
    step(StepKind::RecordTypes, "record_types", 35, "Scanning record types"),
    step(StepKind::Flows, "flows", 45, "Scanning flows"),
    step(StepKind::Triggers, "triggers", 50, "Scanning Apex triggers"),
    step(StepKind::ValidationRules, "validation_rules", 55, "Scanning validation rules"),
    step(StepKind::Profiles, "profiles", 65, "Scanning profiles"),
    step(StepKind::PermissionSets, "permission_sets", 70, "Scanning permission sets"),
    step(StepKind::Roles, "roles", 75, "Scanning roles"),
    step(StepKind::Queues, "queues", 80, "Scanning queues"),
    step(StepKind::SharingRules, "sharing_rules", 85, "Scanning sharing rules"),
    step(StepKind::Reports, "reports", 90, "Scanning reports"),
    step(StepKind::Dashboards, "dashboards", 92, "Scanning dashboards"),
    step(StepKind::Layouts, "layouts", 95, "Scanning page layouts"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    Initializing,
    Running { step: usize },
    Analyzing,
    Finalizing,
    Complete,
}

fn enter(phase: ScanPhase) {
    tracing::debug!(?phase, "Scan phase");
}

// ============================================
// PROGRESS
// ============================================

/// Forwards progress to the caller's sink, never letting percent go backwards.
struct ProgressEmitter {
    sink: Option<ProgressSink>,
    high_water: AtomicU8,
}

impl ProgressEmitter {
    fn new(sink: Option<ProgressSink>) -> Self {
        Self {
            sink,
            high_water: AtomicU8::new(0),
        }
    }

    fn emit(&self, step: &str, percent: u8, current_process: &str) {
        let Some(sink) = &self.sink else { return };
        let percent = self.high_water.fetch_max(percent, Ordering::SeqCst).max(percent);
        sink(ScanProgress {
            step: step.to_string(),
            percent,
            current_process: current_process.to_string(),
        });
    }
}

// ============================================
// ORCHESTRATION
// ============================================

/// Connect to the org and run a full scan.
pub async fn start_scan(auth: SalesforceAuth, config: &AppConfig, options: ScanOptions) -> ScanResult<ScanOutput> {
    let client = SalesforceClient::connect(auth, &config.api_version, config.http_timeout)
        .map_err(|e| ScanError::NonRecoverable(e.to_string()))?;
    compose_scan(&client, &options).await
}

/// Run every step against `client` and assemble the aggregate.
///
/// Cancellation aborts the whole scan without output. The org info step is
/// the only other failure that escapes; every later step degrades to its
/// empty value.
pub async fn compose_scan(client: &SalesforceClient, options: &ScanOptions) -> ScanResult<ScanOutput> {
    let started = Instant::now();
    enter(ScanPhase::Initializing);
    if options.cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }
    tracing::info!("Starting org scan");

    let emitter = ProgressEmitter::new(options.on_progress.clone());
    let mut output = ScanOutput::default();

    for (i, step) in SCAN_STEPS.iter().enumerate() {
        enter(ScanPhase::Running { step: i });
        if options.cancel.is_cancelled() {
            tracing::info!(step = step.name, "Scan cancelled before step");
            return Err(ScanError::Cancelled);
        }
        emitter.emit(step.name, step.percent, step.message);

        let on_item = |item: &str| emitter.emit(step.name, step.percent, item);
        let ctx = CollectorContext::new(client, &options.cancel, options.limits).with_item_callback(&on_item);

        let step_started = Instant::now();
        run_step(step, &ctx, &mut output).await?;
        tracing::debug!(
            step = step.name,
            duration_ms = step_started.elapsed().as_millis() as u64,
            "Step finished"
        );
    }

    enter(ScanPhase::Analyzing);
    emitter.emit("analysis", 98, "Detecting migration blockers");
    output.blockers = blockers::detect_all(&output);

    enter(ScanPhase::Finalizing);
    output.scanned_at = chrono::Utc::now().to_rfc3339();
    output.scan_duration = started.elapsed().as_millis() as u64;
    emitter.emit("complete", 100, "Complete");
    enter(ScanPhase::Complete);

    tracing::info!(
        duration_ms = output.scan_duration,
        objects = output.objects.len(),
        blockers = output.blockers.len(),
        "Org scan completed"
    );
    Ok(output)
}

async fn run_step(step: &ScanStep, ctx: &CollectorContext<'_>, out: &mut ScanOutput) -> ScanResult<()> {
    match step.kind {
        StepKind::OrgInfo => out.org_info = org::scan_org_info(ctx).await?,
        StepKind::Schema => out.objects = absorb(step, schema::scan_schema(ctx).await)?,
        StepKind::Picklists => out.picklists = absorb(step, schema::scan_picklists(ctx).await)?,
        StepKind::RecordTypes => out.record_types = absorb(step, schema::scan_record_types(ctx).await)?,
        StepKind::Flows => out.flows = absorb(step, automation::scan_flows(ctx).await)?,
        StepKind::Triggers => out.triggers = absorb(step, automation::scan_triggers(ctx).await)?,
        StepKind::ValidationRules => {
            out.validation_rules = absorb(step, automation::scan_validation_rules(ctx).await)?
        }
        StepKind::Profiles => out.profiles = absorb(step, ownership::scan_profiles(ctx).await)?,
        StepKind::PermissionSets => {
            out.permission_sets = absorb(step, ownership::scan_permission_sets(ctx).await)?
        }
        StepKind::Roles => out.roles = absorb(step, ownership::scan_roles(ctx).await)?,
        StepKind::Queues => out.queues = absorb(step, ownership::scan_queues(ctx).await)?,
        StepKind::SharingRules => out.sharing_rules = absorb(step, ownership::scan_sharing_rules(ctx).await)?,
        StepKind::Reports => out.reports = absorb(step, reporting::scan_reports(ctx).await)?,
        StepKind::Dashboards => out.dashboards = absorb(step, reporting::scan_dashboards(ctx).await)?,
        StepKind::Layouts => out.layouts = absorb(step, reporting::scan_layouts(ctx).await)?,
    }
    Ok(())
}

/// Step-level guard: only cancellation passes through.
fn absorb<T: Default>(step: &ScanStep, result: ScanResult<T>) -> ScanResult<T> {
    match result {
        Err(ScanError::Cancelled) => Err(ScanError::Cancelled),
        Err(error) => {
            tracing::warn!(step = step.name, error = %error, "Step failed, using empty result");
            Ok(T::default())
        }
        Ok(value) => Ok(value),
    }
}
