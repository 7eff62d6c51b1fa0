//! `rescue report`: open a new case, unless nearby cases may already
//! cover the sighting.

use crate::cmd::{ContributionView, SightingArgs, engine_failure, write_contribution};
use crate::output::{CliError, OutputMode, render, render_error, write_candidates};
use clap::Args;
use rescue_core::{Caller, Engine};
use std::io;
use tracing::info;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Animal category (dog, cat, cow, other; any casing).
    pub category: String,

    #[command(flatten)]
    pub sighting: SightingArgs,

    /// Open a new case even when nearby candidates exist.
    #[arg(long)]
    pub new: bool,
}

pub fn run_report(
    args: &ReportArgs,
    caller: &Caller,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let submission = args.sighting.to_submission(Some(&args.category))?;

    if !args.new
        && let Some(point) = submission.point
    {
        let candidates = engine
            .find_candidates(caller, &args.category, point)
            .map_err(|err| engine_failure(output, &err))?;
        if !candidates.is_empty() {
            if !output.is_json() {
                write_candidates(&mut io::stderr().lock(), &candidates)?;
            }
            render_error(
                output,
                &CliError::with_details(
                    format!("{} nearby case(s) may already cover this sighting", candidates.len()),
                    format!(
                        "merge into one with `rescue merge {} ...`, \
                         or pass --new to open a separate case",
                        candidates[0].case_id
                    ),
                    "duplicate_candidates",
                ),
            )?;
            anyhow::bail!("nearby cases found; not opening a new case");
        }
    }

    let contribution = engine
        .create_case(caller, &submission)
        .map_err(|err| engine_failure(output, &err))?;
    info!(case_id = %contribution.case.id, "reported new case");

    let view = ContributionView::from(&contribution);
    render(output, &view, |view, w| write_contribution(w, view, "Opened"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ReportArgs,
    }

    #[test]
    fn parses_full_report() {
        let w = Wrapper::parse_from([
            "test",
            "other",
            "--lat",
            "12.9",
            "--lng",
            "77.6",
            "--custom-category",
            "goat",
            "--new",
        ]);
        assert_eq!(w.args.category, "other");
        assert!(w.args.new);
        assert_eq!(w.args.sighting.custom_category.as_deref(), Some("goat"));
    }

    #[test]
    fn new_defaults_to_false() {
        let w = Wrapper::parse_from(["test", "dog"]);
        assert!(!w.args.new);
        assert!(w.args.sighting.point().is_none());
    }
}
