//! `rescue show`: full detail of one case.

use crate::cmd::engine_failure;
use crate::output::{OutputMode, render, write_case};
use clap::Args;
use rescue_core::model::CaseId;
use rescue_core::{Caller, Engine};

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub id: String,
}

pub fn run_show(
    args: &ShowArgs,
    caller: &Caller,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let case = engine
        .get_case(caller, &CaseId::new_unchecked(args.id.trim()))
        .map_err(|err| engine_failure(output, &err))?;
    render(output, &case, |case, w| write_case(w, case))
}
