//! `rescue merge`: add a sighting to an existing case.

use crate::cmd::{ContributionView, SightingArgs, engine_failure, write_contribution};
use crate::output::{OutputMode, render};
use clap::Args;
use rescue_core::model::CaseId;
use rescue_core::{Caller, Engine};

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Case to contribute to.
    pub id: String,

    #[command(flatten)]
    pub sighting: SightingArgs,
}

pub fn run_merge(
    args: &MergeArgs,
    caller: &Caller,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let submission = args.sighting.to_submission(None)?;
    let contribution = engine
        .merge_into_case(caller, &CaseId::new_unchecked(args.id.trim()), &submission)
        .map_err(|err| engine_failure(output, &err))?;

    let view = ContributionView::from(&contribution);
    render(output, &view, |view, w| write_contribution(w, view, "Updated"))
}
