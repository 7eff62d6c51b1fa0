//! `rescue mine`: cases the caller has contributed to.

use crate::cmd::engine_failure;
use crate::output::{OutputMode, render, write_cases};
use rescue_core::{Caller, Engine};

pub fn run_mine(caller: &Caller, engine: &Engine, output: OutputMode) -> anyhow::Result<()> {
    let cases = engine
        .my_cases(caller)
        .map_err(|err| engine_failure(output, &err))?;
    render(output, &cases, |cases, w| write_cases(w, cases))
}
