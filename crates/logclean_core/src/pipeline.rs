// pipeline.rs: ordered step lists with null short-circuit and fixpoint recursion
use regex::Regex;
use tracing::warn;

use crate::cleaners;
use crate::error::FormatError;
use crate::value::Cleaned;

/// Upper bound on fixpoint passes. Percent-decoding never needs more than a
/// handful; hitting the cap means the inner step oscillates.
pub const MAX_FIXPOINT_ROUNDS: usize = 16;

#[derive(Debug, Clone)]
pub enum Step {
    Nullable,
    Ipv4,
    Int,
    Float,
    Escape,
    MultiLine,
    UrlDecode,
    Lower,
    Limit(usize),
    Regex(Regex),
    /// Re-apply the inner step until its output equals its input.
    Fixpoint(Box<Step>),
}

impl Step {
    pub fn recursive(inner: Step) -> Self {
        Step::Fixpoint(Box::new(inner))
    }

    pub fn apply(&self, v: Cleaned) -> Result<Cleaned, FormatError> {
        match self {
            Step::Nullable => Ok(cleaners::null_sentinel(v)),
            Step::Ipv4 => cleaners::validate_ipv4(v),
            Step::Int => cleaners::coerce_int(v),
            Step::Float => cleaners::coerce_float(v),
            Step::Escape => cleaners::escape(v),
            Step::MultiLine => cleaners::flatten_lines(v),
            Step::UrlDecode => cleaners::url_decode(v),
            Step::Lower => cleaners::lowercase(v),
            Step::Limit(n) => cleaners::limit_length(v, *n),
            Step::Regex(re) => cleaners::match_regex(v, re),
            Step::Fixpoint(inner) => fixpoint(inner, v),
        }
    }
}

fn fixpoint(inner: &Step, mut current: Cleaned) -> Result<Cleaned, FormatError> {
    for _ in 0..MAX_FIXPOINT_ROUNDS {
        let next = inner.apply(current.clone())?;
        if next == current {
            return Ok(next);
        }
        current = next;
    }
    warn!(step = ?inner, rounds = MAX_FIXPOINT_ROUNDS, "fixpoint not reached, keeping last value");
    Ok(current)
}

/// A field's ordered step list. The order is fixed when the pipeline is built.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Feed the value through every step in order. A null (input or any
    /// intermediate result) ends the run and is returned as-is.
    pub fn run(&self, raw: Cleaned) -> Result<Cleaned, FormatError> {
        let mut v = raw;
        for step in &self.steps {
            if v.is_null() {
                break;
            }
            v = step.apply(v)?;
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Cleaned {
        Cleaned::Text(s.to_string())
    }

    #[test]
    fn test_fixpoint_unwraps_double_encoding() {
        let step = Step::recursive(Step::UrlDecode);
        // "a b/c" encoded twice
        assert_eq!(step.apply(t("a%2520b%252Fc")), Ok(t("a b/c")));
        assert_eq!(step.apply(t("plain")), Ok(t("plain")));
        assert_eq!(step.apply(t("%252525")), Ok(t("%")));
    }

    #[test]
    fn test_fixpoint_stops_at_round_cap() {
        // every escape pass doubles the backslashes, so no fixpoint exists
        let step = Step::recursive(Step::Escape);
        let Ok(Cleaned::Text(out)) = step.apply(t("\\")) else {
            panic!("expected text");
        };
        assert_eq!(out.len(), 1 << MAX_FIXPOINT_ROUNDS);
        assert!(out.bytes().all(|b| b == b'\\'));
    }

    #[test]
    fn test_run_applies_in_order() {
        let p = Pipeline::new(vec![Step::UrlDecode, Step::Lower, Step::Limit(3)]);
        assert_eq!(p.run(t("%41BCD")), Ok(t("abc")));

        let reversed = Pipeline::new(vec![Step::Limit(3), Step::UrlDecode]);
        assert_eq!(reversed.run(t("%41BCD")), Ok(t("A")));
    }

    #[test]
    fn test_null_short_circuits() {
        // Ipv4 would fail on "undefined" if it ever ran
        let p = Pipeline::new(vec![Step::Nullable, Step::Ipv4]);
        assert_eq!(p.run(t("undefined")), Ok(Cleaned::Null));
        assert_eq!(p.run(Cleaned::Null), Ok(Cleaned::Null));

        let p = Pipeline::new(vec![Step::Float, Step::Escape]);
        assert_eq!(p.run(t("nan")), Ok(Cleaned::Null));
    }

    #[test]
    fn test_error_propagates() {
        let p = Pipeline::new(vec![Step::Nullable, Step::Int, Step::Escape]);
        assert_eq!(p.run(t("12a")), Err(FormatError::NotAnInteger("12a".into())));
    }
}
