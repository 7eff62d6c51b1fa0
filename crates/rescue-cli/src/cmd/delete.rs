//! `rescue delete`: purge a case (administrators only).

use crate::cmd::engine_failure;
use crate::output::{OutputMode, render};
use clap::Args;
use rescue_core::model::CaseId;
use rescue_core::{Caller, Engine};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub id: String,
}

#[derive(Serialize)]
struct Deleted<'a> {
    deleted: &'a str,
}

pub fn run_delete(
    args: &DeleteArgs,
    caller: &Caller,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let case_id = CaseId::new_unchecked(args.id.trim());
    engine
        .delete_case(caller, &case_id)
        .map_err(|err| engine_failure(output, &err))?;

    render(
        output,
        &Deleted {
            deleted: case_id.as_str(),
        },
        |deleted, w| writeln!(w, "Deleted {}", deleted.deleted),
    )
}
