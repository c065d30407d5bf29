//! The rotation pipeline: main → daily → weekly → monthly → discarded.
//!
//! Each step lists the tier it works on again, so decisions always see the
//! overflow that arrived from the tier above. Callers must not run two
//! rotations against the same target at the same time.

use crate::backup::dir_ops::DirOps;
use crate::backup::listing::list_tier;
use crate::backup::materializer::Materializer;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::retention::{decide_capacity, decide_dedupe, RetentionConfig};
use crate::backup::tier::{TargetLayout, Tier};
use derive_more::Display;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum RotationStep {
    #[display("enforce capacity of {_0} tier")]
    EnforceCapacity(Tier),
    #[display("group {_0} tier by period")]
    Dedupe(Tier),
    #[display("refresh latest pointer of {_0} tier")]
    RefreshLatest(Tier),
}

pub const ROTATION_PIPELINE: [RotationStep; 12] = [
    RotationStep::EnforceCapacity(Tier::Main),
    RotationStep::RefreshLatest(Tier::Main),
    RotationStep::RefreshLatest(Tier::Daily),
    RotationStep::Dedupe(Tier::Daily),
    RotationStep::EnforceCapacity(Tier::Daily),
    RotationStep::RefreshLatest(Tier::Weekly),
    RotationStep::Dedupe(Tier::Weekly),
    RotationStep::EnforceCapacity(Tier::Weekly),
    RotationStep::RefreshLatest(Tier::Monthly),
    RotationStep::Dedupe(Tier::Monthly),
    RotationStep::EnforceCapacity(Tier::Monthly),
    RotationStep::RefreshLatest(Tier::Monthly),
];

/// Counts of what one rotation did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub moved: usize,
    pub deleted: usize,
}

pub fn rotate(
    ops: &dyn DirOps,
    layout: &TargetLayout,
    retention: &RetentionConfig,
) -> Result<RotationReport> {
    let materializer = Materializer::new(ops, layout);
    let mut report = RotationReport::default();

    for step in ROTATION_PIPELINE {
        run_step(ops, layout, retention, &materializer, step, &mut report)
            .add_msg(format!("Rotation step \"{step}\" failed"))?;
    }

    tracing::info!(
        "Rotation finished: {} moved, {} removed",
        report.moved,
        report.deleted
    );
    Ok(report)
}

fn run_step(
    ops: &dyn DirOps,
    layout: &TargetLayout,
    retention: &RetentionConfig,
    materializer: &Materializer,
    step: RotationStep,
    report: &mut RotationReport,
) -> Result<()> {
    let decision = match step {
        RotationStep::EnforceCapacity(tier) => {
            let capacity = tier.capacity(retention);
            tracing::info!("> Handling excess backups (> {}) in {} tier", capacity, tier);
            decide_capacity(tier, list_tier(ops, layout, tier)?, capacity)
        }
        RotationStep::Dedupe(tier) => {
            tracing::info!("> Grouping backups in {} tier", tier);
            decide_dedupe(tier, list_tier(ops, layout, tier)?)?
        }
        RotationStep::RefreshLatest(tier) => {
            materializer.refresh_latest(tier)?;
            return Ok(());
        }
    };

    if decision.is_noop() {
        tracing::info!("Nothing to do in {} tier", decision.tier);
        return Ok(());
    }

    materializer.apply(&decision)?;
    report.moved += decision.moves.len();
    report.deleted += decision.deletes.len();
    Ok(())
}
