// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{CpaError, CpaResult};
use crate::k_limits;

use clap::{App, AppSettings, Arg, ArgMatches};
use itertools::Itertools;
use mirai_annotations::*;
use std::str::FromStr;

/// Creates the clap::App metadata for argument parsing.
fn make_options_parser<'a>() -> App<'a, 'a> {
    App::new("predicate-cpa")
    .setting(AppSettings::NoBinaryName)
    .version("v0.1.0")
    .arg(Arg::with_name("block_size")
        .long("block_size")
        .takes_value(true)
        .default_value("0")
        .help("Abstract after this many edges since the last abstraction.")
        .long_help("0 disables the threshold, so that only structural locations trigger abstraction."))
    .arg(Arg::with_name("sat_check")
        .long("sat_check")
        .takes_value(true)
        .default_value("0")
        .help("Check path formulas for satisfiability every this many edges.")
        .long_help("0 disables intermediate satisfiability checks."))
    .arg(Arg::with_name("abstraction_type")
        .long("abstraction_type")
        .possible_values(&["boolean", "cartesian"])
        .default_value("boolean")
        .help("How the abstraction of a block is computed.\n")
        .long_help("With `boolean`, the strongest boolean combination of the predicates is computed.\nWith `cartesian`, the strongest conjunction of predicate literals is computed.\n"))
    .arg(Arg::with_name("merge")
        .long("merge")
        .possible_values(&["sep", "join"])
        .default_value("join")
        .help("Whether states of the same block that reach the same location are merged."))
    .arg(Arg::with_name("threshold_combination")
        .long("threshold_combination")
        .possible_values(&["or", "and"])
        .default_value("or")
        .help("How the block size threshold combines with the structural abstraction locations."))
    .arg(Arg::with_name("symbolic_coverage_check")
        .long("symbolic_coverage_check")
        .takes_value(false)
        .help("Let abstraction states cover non-abstraction states when their formulas imply it."))
    .arg(Arg::with_name("no_loop_head_abstraction")
        .long("no_loop_head_abstraction")
        .takes_value(false)
        .help("Do not abstract at loop heads."))
    .arg(Arg::with_name("function_entry_abstraction")
        .long("function_entry_abstraction")
        .takes_value(false)
        .help("Abstract at function entries."))
    .arg(Arg::with_name("function_return_abstraction")
        .long("function_return_abstraction")
        .takes_value(false)
        .help("Abstract at the return sites of calls."))
    .arg(Arg::with_name("call_site_abstraction")
        .long("call_site_abstraction")
        .takes_value(false)
        .help("Abstract at locations that are left by a function call."))
    .arg(Arg::with_name("no_target_abstraction")
        .long("no_target_abstraction")
        .takes_value(false)
        .help("Do not abstract at error locations.")
        .long_help("Without abstraction at error locations, an error state is reported even if the abstraction of its block rules it out, unless a satisfiability check prunes it first."))
    .arg(Arg::with_name("solver_range")
        .long("solver_range")
        .takes_value(true)
        .help("The magnitude bound the bounded solver uses for integer variables it cannot bound on its own.")
        .long_help("Queries that find no model within this bound are answered as undefined rather than unsatisfiable. The default is 16."))
}

/// Selects the abstraction computation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbstractionType {
    /// All-SAT enumeration of predicate cubes. Precise but exponential in the number of predicates.
    Boolean,
    /// One implication check per predicate and polarity.
    Cartesian,
}

impl Default for AbstractionType {
    fn default() -> Self {
        AbstractionType::Boolean
    }
}

/// Selects the merge operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MergeType {
    /// Never merge.
    Sep,
    /// Merge non-abstraction states with the same owner and location.
    Join,
}

impl Default for MergeType {
    fn default() -> Self {
        MergeType::Join
    }
}

/// How the block size threshold combines with the structural abstraction triggers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThresholdCombination {
    Or,
    And,
}

impl Default for ThresholdCombination {
    fn default() -> Self {
        ThresholdCombination::Or
    }
}

/// Represents options passed to the predicate analysis.
#[derive(Clone, Debug)]
pub struct Options {
    pub block_size: usize,
    pub sat_check: usize,
    pub abstraction_type: AbstractionType,
    pub merge_type: MergeType,
    pub threshold_combination: ThresholdCombination,
    pub symbolic_coverage_check: bool,
    pub abstract_at_loop_heads: bool,
    pub abstract_at_function_entries: bool,
    pub abstract_at_function_returns: bool,
    pub abstract_at_call_sites: bool,
    pub abstract_at_targets: bool,
    pub solver_range: i128,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            block_size: 0,
            sat_check: 0,
            abstraction_type: AbstractionType::default(),
            merge_type: MergeType::default(),
            threshold_combination: ThresholdCombination::default(),
            symbolic_coverage_check: false,
            abstract_at_loop_heads: true,
            abstract_at_function_entries: false,
            abstract_at_function_returns: false,
            abstract_at_call_sites: false,
            abstract_at_targets: true,
            solver_range: k_limits::DEFAULT_SOLVER_RANGE,
        }
    }
}

impl Options {
    /// Parse options from an argument string. The argument string will be split using unix
    /// shell escaping rules. Any content beyond the leftmost `--` token will be returned
    /// (excluding this token).
    pub fn parse_from_str(&mut self, s: &str) -> CpaResult<Vec<String>> {
        let args = shellwords::split(s).map_err(|e| {
            CpaError::Configuration(format!("Cannot parse argument string: {:?}", e))
        })?;
        self.parse(&args)
    }

    /// Parses options from a list of strings. Any content beyond the leftmost `--` token
    /// will be returned (excluding this token).
    pub fn parse(&mut self, args: &[String]) -> CpaResult<Vec<String>> {
        let mut own_args_end = args.len();
        let mut rest_start = args.len();
        if let Some((p, _)) = args.iter().find_position(|s| s.as_str() == "--") {
            own_args_end = p;
            rest_start = p + 1;
        }
        let matches = make_options_parser()
            .get_matches_from_safe(args[0..own_args_end].iter())
            .map_err(|e| CpaError::Configuration(e.message))?;

        self.block_size = parse_value(&matches, "block_size")?.unwrap_or(self.block_size);
        self.sat_check = parse_value(&matches, "sat_check")?.unwrap_or(self.sat_check);
        if let Some(value) = matches.value_of("abstraction_type") {
            self.abstraction_type = match value {
                "boolean" => AbstractionType::Boolean,
                "cartesian" => AbstractionType::Cartesian,
                _ => assume_unreachable!(),
            };
        }
        if let Some(value) = matches.value_of("merge") {
            self.merge_type = match value {
                "sep" => MergeType::Sep,
                "join" => MergeType::Join,
                _ => assume_unreachable!(),
            };
        }
        if let Some(value) = matches.value_of("threshold_combination") {
            self.threshold_combination = match value {
                "or" => ThresholdCombination::Or,
                "and" => ThresholdCombination::And,
                _ => assume_unreachable!(),
            };
        }
        if matches.is_present("symbolic_coverage_check") {
            self.symbolic_coverage_check = true;
        }
        if matches.is_present("no_loop_head_abstraction") {
            self.abstract_at_loop_heads = false;
        }
        if matches.is_present("function_entry_abstraction") {
            self.abstract_at_function_entries = true;
        }
        if matches.is_present("function_return_abstraction") {
            self.abstract_at_function_returns = true;
        }
        if matches.is_present("call_site_abstraction") {
            self.abstract_at_call_sites = true;
        }
        if matches.is_present("no_target_abstraction") {
            self.abstract_at_targets = false;
        }
        self.solver_range = parse_value(&matches, "solver_range")?.unwrap_or(self.solver_range);
        Ok(args[rest_start..].to_vec())
    }
}

fn parse_value<T: FromStr>(matches: &ArgMatches<'_>, name: &str) -> CpaResult<Option<T>> {
    match matches.value_of(name) {
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|_| CpaError::Configuration(format!("--{} expects an integer", name))),
        None => Ok(None),
    }
}
