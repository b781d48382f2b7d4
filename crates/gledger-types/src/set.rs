//! Identifier sets: per-SID ordered collections of disjoint intervals.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use crate::{GNO_RANGE_SEPARATOR, Gno, Gtid, Interval, SID_GNO_SEPARATOR, Sid};

/// A set of executed transaction identifiers.
///
/// Intervals are kept canonical at all times: per SID they are sorted by
/// start and no two stored intervals overlap or touch. The persisted ledger
/// is allowed to be non-canonical at rest; this in-memory form never is.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GtidSet {
    intervals: BTreeMap<Sid, Vec<Interval>>,
}

impl GtidSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one identifier.
    pub fn add_gtid(&mut self, gtid: Gtid) {
        self.add_interval(gtid.sid, Interval::point(gtid.gno));
    }

    /// Add an interval, merging it with any overlapping or touching
    /// neighbours so the per-SID list stays canonical.
    pub fn add_interval(&mut self, sid: Sid, interval: Interval) {
        let list = self.intervals.entry(sid).or_default();
        // Find the first entry that could join the new interval.
        let mut idx = list.partition_point(|iv| iv.start() < interval.start());
        // A predecessor can touch the new interval from the left.
        if idx > 0 && list[idx - 1].joinable_with(&interval) {
            idx -= 1;
        }
        let mut merged = interval;
        let mut removed = 0;
        while idx + removed < list.len() && list[idx + removed].joinable_with(&merged) {
            merged = merged.join(&list[idx + removed]);
            removed += 1;
        }
        list.splice(idx..idx + removed, std::iter::once(merged));
    }

    /// Parse and add one `"<sid>:<start>-<end>"` row text.
    ///
    /// The format is strict: exactly one SID/GNO separator, exactly one range
    /// separator, both bounds positive integers with `start <= end`. Any
    /// deviation is rejected.
    pub fn add_text(&mut self, text: &str) -> Result<(), MalformedInterval> {
        let (sid_text, range) = text
            .split_once(SID_GNO_SEPARATOR)
            .ok_or_else(|| MalformedInterval::new(text, "missing sid/gno separator"))?;
        let sid = Sid::from_text(sid_text)
            .map_err(|_| MalformedInterval::new(text, "malformed source id"))?;
        let (start_text, end_text) = range
            .split_once(GNO_RANGE_SEPARATOR)
            .ok_or_else(|| MalformedInterval::new(text, "missing range separator"))?;
        let start = parse_gno(start_text)
            .ok_or_else(|| MalformedInterval::new(text, "invalid interval start"))?;
        let end = parse_gno(end_text)
            .ok_or_else(|| MalformedInterval::new(text, "invalid interval end"))?;
        let interval = Interval::new(start, end)
            .ok_or_else(|| MalformedInterval::new(text, "interval start exceeds end"))?;
        self.add_interval(sid, interval);
        Ok(())
    }

    /// Whether the identifier is covered by this set.
    #[must_use]
    pub fn contains_gtid(&self, gtid: &Gtid) -> bool {
        self.intervals
            .get(&gtid.sid)
            .is_some_and(|list| list.iter().any(|iv| iv.contains(gtid.gno)))
    }

    /// Iterate `(sid, interval)` pairs.
    ///
    /// The sequence is finite and deterministic for a given set: SIDs in
    /// byte order, intervals by ascending start. The iterator borrows the
    /// set and is not restartable.
    #[must_use]
    pub fn intervals(&self) -> Intervals<'_> {
        Intervals {
            outer: self.intervals.iter(),
            current: None,
        }
    }

    /// Total number of identifiers covered.
    #[must_use]
    pub fn gtid_count(&self) -> u64 {
        self.intervals
            .values()
            .flat_map(|list| list.iter())
            .map(Interval::count)
            .sum()
    }

    /// Number of stored intervals across all SIDs.
    #[must_use]
    pub fn interval_count(&self) -> usize {
        self.intervals.values().map(Vec::len).sum()
    }

    /// Whether the set covers nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Drop every identifier.
    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}

fn parse_gno(text: &str) -> Option<Gno> {
    // `u64::from_str` accepts a leading '+'; the row format does not.
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u64>().ok().and_then(Gno::new)
}

impl fmt::Display for GtidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first_sid = true;
        for (sid, list) in &self.intervals {
            if !first_sid {
                f.write_str(",")?;
            }
            first_sid = false;
            write!(f, "{sid}")?;
            for iv in list {
                write!(f, "{SID_GNO_SEPARATOR}{iv}")?;
            }
        }
        Ok(())
    }
}

/// Borrowing iterator over `(sid, interval)` pairs of a [`GtidSet`].
pub struct Intervals<'a> {
    outer: btree_map::Iter<'a, Sid, Vec<Interval>>,
    current: Option<(Sid, std::slice::Iter<'a, Interval>)>,
}

impl Iterator for Intervals<'_> {
    type Item = (Sid, Interval);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((sid, inner)) = &mut self.current {
                if let Some(iv) = inner.next() {
                    return Some((*sid, *iv));
                }
            }
            let (sid, list) = self.outer.next()?;
            self.current = Some((*sid, list.iter()));
        }
    }
}

/// Error returned when a row text cannot be parsed into an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedInterval {
    text: String,
    reason: &'static str,
}

impl MalformedInterval {
    fn new(text: &str, reason: &'static str) -> Self {
        Self {
            text: text.to_owned(),
            reason,
        }
    }

    /// The rejected input.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Short machine-independent cause.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

impl fmt::Display for MalformedInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed interval text '{}': {}",
            self.text, self.reason
        )
    }
}

impl std::error::Error for MalformedInterval {}
