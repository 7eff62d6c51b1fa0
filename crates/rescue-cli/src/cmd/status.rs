//! `rescue status`: move a case through Unhandled → Collected →
//! InTreatment → Resolved (administrators only).

use crate::cmd::engine_failure;
use crate::output::{OutputMode, pretty_kv, render, status_progress};
use clap::Args;
use rescue_core::model::CaseId;
use rescue_core::{Caller, Engine};

#[derive(Args, Debug)]
pub struct StatusArgs {
    pub id: String,

    /// New status: Unhandled, Collected, InTreatment or Resolved.
    pub status: String,
}

pub fn run_status(
    args: &StatusArgs,
    caller: &Caller,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let case = engine
        .set_status(caller, &CaseId::new_unchecked(args.id.trim()), &args.status)
        .map_err(|err| engine_failure(output, &err))?;

    render(output, &case, |case, w| {
        pretty_kv(w, "Case", case.id.as_str())?;
        pretty_kv(w, "Status", status_progress(case.status))
    })
}
