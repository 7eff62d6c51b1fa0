//! `rescue nearby`: list open cases close to a sighting.

use crate::cmd::engine_failure;
use crate::output::{OutputMode, render, write_candidates};
use clap::Args;
use rescue_core::model::Point;
use rescue_core::{Caller, Engine};

#[derive(Args, Debug)]
pub struct NearbyArgs {
    /// Animal category (dog, cat, cow, other; any casing).
    pub category: String,

    /// Latitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub lng: f64,
}

pub fn run_nearby(
    args: &NearbyArgs,
    caller: &Caller,
    engine: &Engine,
    output: OutputMode,
) -> anyhow::Result<()> {
    let candidates = engine
        .find_candidates(caller, &args.category, Point::new(args.lng, args.lat))
        .map_err(|err| engine_failure(output, &err))?;
    render(output, &candidates, |found, w| write_candidates(w, found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: NearbyArgs,
    }

    #[test]
    fn parses_category_and_coordinates() {
        let w = Wrapper::parse_from(["test", "Dog", "--lat", "-1.5", "--lng", "36.8"]);
        assert_eq!(w.args.category, "Dog");
        assert!((w.args.lat + 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn coordinates_are_required() {
        assert!(Wrapper::try_parse_from(["test", "cat", "--lat", "1.0"]).is_err());
    }
}
