//! Deterministic segment filename formatting and parsing (§4.4, §6).
//!
//! The formatter is kept as a pure function from `(slice_index,
//! wall_clock)` to a path — per the design notes, this indirection lets
//! tests drive it with a fixed clock, and lets the reaper invert it
//! without coupling to the recorder's internals.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;

/// `capture-YYYYMMDD_HHMMSS_<TZ>-<index>.mp4`, with `TZ` the abbreviation
/// of the local-time formatter currently in effect (UTC on this
/// non-embedded rewrite, since there is no local timezone database
/// bundled with the firmware image).
pub fn format_segment_path(dir: &Path, slice_index: u64, wall_clock: DateTime<Utc>) -> PathBuf {
    let stamp = wall_clock.format("%Y%m%d_%H%M%S");
    dir.join(format!("capture-{stamp}_UTC-{slice_index}.mp4"))
}

/// Parsed components of a segment filename, as recovered by the reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSegmentName {
    pub wall_clock: DateTime<Utc>,
    pub slice_index: u64,
}

fn pattern() -> Regex {
    Regex::new(r"^capture-(\d{8})_(\d{6})_([A-Za-z0-9]+)-(\d+)\.mp4$")
        .expect("segment filename pattern is a valid regex")
}

/// Parses a segment filename (not a full path) produced by
/// [`format_segment_path`]. Returns `None` if the name does not match the
/// pattern — such files are skipped by the reaper rather than treated as
/// an error (§4.5).
pub fn parse_segment_name(file_name: &str) -> Option<ParsedSegmentName> {
    let caps = pattern().captures(file_name)?;
    let date = &caps[1];
    let time = &caps[2];
    let slice_index: u64 = caps[4].parse().ok()?;

    let naive = chrono::NaiveDateTime::parse_from_str(
        &format!("{date}{time}"),
        "%Y%m%d%H%M%S",
    )
    .ok()?;
    let wall_clock = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);

    Some(ParsedSegmentName {
        wall_clock,
        slice_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_and_parse_round_trip() {
        let dir = Path::new("/storage/video");
        let clock = Utc.with_ymd_and_hms(2026, 3, 4, 12, 30, 15).unwrap();
        let path = format_segment_path(dir, 7, clock);
        let file_name = path.file_name().unwrap().to_str().unwrap();
        let parsed = parse_segment_name(file_name).unwrap();
        assert_eq!(parsed.slice_index, 7);
        assert_eq!(parsed.wall_clock, clock);
    }

    #[test]
    fn names_are_pairwise_distinct_for_distinct_indices() {
        let dir = Path::new("/storage/video");
        let clock = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let a = format_segment_path(dir, 0, clock);
        let b = format_segment_path(dir, 1, clock);
        assert_ne!(a, b);
    }

    #[test]
    fn unparseable_names_return_none() {
        assert!(parse_segment_name("not-a-capture.mp4").is_none());
        assert!(parse_segment_name("capture-bad_UTC-0.mp4").is_none());
    }
}
