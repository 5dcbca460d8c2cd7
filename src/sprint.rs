//! Sprint resolution: ISO week arithmetic and partition title matching.
//!
//! Sprints are one ISO week long and live as one sheet each; a sheet's
//! title embeds the week number ("спринт 37 (08.09-14.09)"). Previous,
//! current and next sprints are computed from the wall-clock date at
//! request time, never stored.

use chrono::{Datelike, Days, NaiveDate};

use crate::error::{Error, Result};
use crate::store::Partition;

/// ISO-8601 week of a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprintWeek {
    pub week: u32,
    /// ISO week-year. Differs from the calendar year for boundary dates:
    /// 2021-01-01 belongs to week 53 of 2020.
    pub year: i32,
}

/// Compute the ISO-8601 week for a date.
pub fn iso_week(date: NaiveDate) -> SprintWeek {
    let iso = date.iso_week();
    SprintWeek {
        week: iso.week(),
        year: iso.year(),
    }
}

/// Week number of the sprint containing `today`.
pub fn current_sprint(today: NaiveDate) -> u32 {
    iso_week(today).week
}

/// Week number of the sprint one week before `today`.
pub fn previous_sprint(today: NaiveDate) -> u32 {
    iso_week(today - Days::new(7)).week
}

/// Week number of the sprint one week after `today`.
pub fn next_sprint(today: NaiveDate) -> u32 {
    iso_week(today + Days::new(7)).week
}

/// Which sprint a new task goes to, as chosen on the proposal keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprintTarget {
    Current,
    Next,
}

impl SprintTarget {
    /// Wire value carried in the createTask callback token.
    pub fn as_param(self) -> &'static str {
        match self {
            SprintTarget::Current => "toCurrent",
            SprintTarget::Next => "toNext",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "toCurrent" => Some(SprintTarget::Current),
            "toNext" => Some(SprintTarget::Next),
            _ => None,
        }
    }

    /// Week number this target resolves to, relative to `today`.
    pub fn week(self, today: NaiveDate) -> u32 {
        match self {
            SprintTarget::Current => current_sprint(today),
            SprintTarget::Next => next_sprint(today),
        }
    }
}

/// Select the partition whose title names the given sprint week.
///
/// A title matches iff it contains the literal substring `"<marker> <week> "`
/// — the trailing space keeps week 1 from matching weeks 10..19. Zero
/// matches is NotFound; more than one is an error rather than a silent
/// first-match pick.
pub fn find_partition<'a>(
    partitions: &'a [Partition],
    marker: &str,
    week: u32,
) -> Result<&'a Partition> {
    let needle = format!("{marker} {week} ");
    let mut matches = partitions.iter().filter(|p| p.title.contains(&needle));
    let first = match matches.next() {
        Some(partition) => partition,
        None => return Err(Error::PartitionNotFound(needle)),
    };
    let rest: Vec<&Partition> = matches.collect();
    if rest.is_empty() {
        return Ok(first);
    }
    let mut titles = vec![first.title.clone()];
    titles.extend(rest.iter().map(|p| p.title.clone()));
    Err(Error::AmbiguousPartition { needle, titles })
}
