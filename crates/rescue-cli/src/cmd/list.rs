//! `rescue list`: administrator dashboard listing.

use crate::cmd::engine_failure;
use crate::output::{CliError, OutputMode, render, render_error, write_cases};
use clap::Args;
use rescue_core::lifecycle::parse_status;
use rescue_core::model::{Category, Status};
use rescue_core::store::{CaseFilter, SortOrder};
use rescue_core::{Caller, Engine};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only cases in this status (Unhandled, Collected, InTreatment, Resolved).
    #[arg(long)]
    pub status: Option<String>,

    /// Only cases of this category; ALL disables the filter.
    #[arg(long)]
    pub category: Option<String>,

    /// created_desc (default) or updated_desc.
    #[arg(long, default_value = "created_desc")]
    pub sort: SortOrder,
}

fn is_all(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("all")
}

fn category_filter(raw: Option<&str>) -> Result<Option<Category>, CliError> {
    match raw {
        None => Ok(None),
        Some(raw) if is_all(raw) => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            CliError::with_details(
                format!("unknown category '{}'", raw.trim()),
                "use one of: Dog, Cat, Cow, Other, ALL",
                "invalid_category",
            )
        }),
    }
}

fn status_filter(raw: Option<&str>) -> Result<Option<Status>, rescue_core::EngineError> {
    match raw {
        None => Ok(None),
        Some(raw) if is_all(raw) => Ok(None),
        Some(raw) => parse_status(raw).map(Some),
    }
}

pub fn run_list(
    args: &ListArgs,
    caller: &Caller,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let status = status_filter(args.status.as_deref()).map_err(|err| engine_failure(output, &err))?;
    let category = match category_filter(args.category.as_deref()) {
        Ok(category) => category,
        Err(err) => {
            render_error(output, &err)?;
            anyhow::bail!("{}", err.message);
        }
    };

    let filter = CaseFilter {
        status,
        category,
        sort: args.sort,
        ..CaseFilter::default()
    };
    let cases = engine
        .list_cases(caller, &filter)
        .map_err(|err| engine_failure(output, &err))?;
    render(output, &cases, |cases, w| write_cases(w, cases))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ListArgs,
    }

    #[test]
    fn defaults_to_newest_first() {
        let w = Wrapper::parse_from(["test"]);
        assert_eq!(w.args.sort, SortOrder::CreatedDesc);
        assert!(w.args.status.is_none());
    }

    #[test]
    fn sort_accepts_updated() {
        let w = Wrapper::parse_from(["test", "--sort", "updated_desc"]);
        assert_eq!(w.args.sort, SortOrder::UpdatedDesc);
        assert!(Wrapper::try_parse_from(["test", "--sort", "oldest"]).is_err());
    }

    #[test]
    fn all_disables_filters() {
        assert_eq!(category_filter(Some("ALL")).expect("all"), None);
        assert_eq!(category_filter(Some(" cow ")).expect("cow"), Some(Category::Cow));
        assert!(category_filter(Some("horse")).is_err());
        assert_eq!(status_filter(Some("all")).expect("all"), None);
        assert_eq!(
            status_filter(Some("InTreatment")).expect("status"),
            Some(Status::InTreatment)
        );
        assert!(status_filter(Some("Closed")).is_err());
    }
}
