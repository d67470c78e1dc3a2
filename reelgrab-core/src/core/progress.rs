use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

/// Prefix emitted through `--progress-template`.
pub const PROGRESS_PREFIX: &str = "download:";

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[download\]\s+(\d{1,3}(?:\.\d+)?)%").unwrap());
static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\] Downloading (?:item|video) (\d+) of (\d+)").unwrap()
});
static DESTINATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[(?:download|ExtractAudio|VideoConvertor|VideoRemuxer)\] Destination: (.+)$"#)
        .unwrap()
});
static MERGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\[Merger\] Merging formats into "(.+)"$"#).unwrap());
static ALREADY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\] (.+) has already been downloaded").unwrap()
});

/// Percent carried by a single engine output line, if any.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        let value = rest.trim().trim_end_matches('%').trim();
        return value.parse::<f64>().ok().filter(|v| v.is_finite());
    }
    PERCENT_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Final output file announced by the engine, if the line carries one.
pub fn parse_destination_line(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    MERGER_RE
        .captures(line)
        .or_else(|| DESTINATION_RE.captures(line))
        .or_else(|| ALREADY_RE.captures(line))
        .and_then(|c| c.get(1))
        .map(|m| PathBuf::from(m.as_str().trim()))
}

fn parse_item_line(line: &str) -> Option<(u32, u32)> {
    let caps = ITEM_RE.captures(line.trim())?;
    let index = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    if total == 0 || index == 0 || index > total {
        return None;
    }
    Some((index, total))
}

/// Turns a stream of engine lines into whole, non-decreasing percentages.
///
/// Playlist downloads report per-item progress; the tracker folds that into
/// an overall figure using the `item N of M` markers.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: u8,
    item: Option<(u32, u32)>,
    output_path: Option<PathBuf>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one stdout line. Returns the new overall percent when it moved forward.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        if let Some(item) = parse_item_line(line) {
            self.item = Some(item);
            return None;
        }
        if let Some(path) = parse_destination_line(line) {
            self.output_path = Some(path);
            return None;
        }

        let pct = parse_progress_line(line)?.clamp(0.0, 100.0);
        let overall = match self.item {
            Some((index, total)) => {
                ((index - 1) as f64 * 100.0 + pct) / total as f64
            }
            None => pct,
        };
        let whole = overall.floor().clamp(0.0, 100.0) as u8;
        if whole > self.current {
            self.current = whole;
            Some(whole)
        } else {
            None
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output_path.as_ref()
    }
}

pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            last_emit: None,
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_template_lines() {
        assert_eq!(parse_progress_line("download:  42.3%"), Some(42.3));
        assert_eq!(parse_progress_line("download:100.0%"), Some(100.0));
        assert_eq!(parse_progress_line("download:   N/A"), None);
    }

    #[test]
    fn parses_default_engine_lines() {
        assert_eq!(
            parse_progress_line("[download]  12.5% of ~ 10.00MiB at 1.00MiB/s ETA 00:09"),
            Some(12.5)
        );
        assert_eq!(parse_progress_line("[download] Destination: a.mp4"), None);
        assert_eq!(parse_progress_line("[youtube] abc: Downloading webpage"), None);
    }

    #[test]
    fn parses_destinations() {
        assert_eq!(
            parse_destination_line("[download] Destination: /tmp/x/clip [abc].mp4"),
            Some(PathBuf::from("/tmp/x/clip [abc].mp4"))
        );
        assert_eq!(
            parse_destination_line(r#"[Merger] Merging formats into "/tmp/x/a.mp4""#),
            Some(PathBuf::from("/tmp/x/a.mp4"))
        );
        assert_eq!(
            parse_destination_line("[download] /tmp/x/a.mp4 has already been downloaded"),
            Some(PathBuf::from("/tmp/x/a.mp4"))
        );
    }

    #[test]
    fn tracker_never_goes_backwards() {
        let mut t = ProgressTracker::new();
        assert_eq!(t.observe("download: 10.0%"), Some(10));
        assert_eq!(t.observe("download: 55.9%"), Some(55));
        assert_eq!(t.observe("download: 3.0%"), None);
        assert_eq!(t.observe("download: 55.2%"), None);
        assert_eq!(t.observe("download: 250%"), Some(100));
        assert_eq!(t.current(), 100);
    }

    #[test]
    fn tracker_folds_playlist_items() {
        let mut t = ProgressTracker::new();
        t.observe("[download] Downloading item 1 of 4");
        assert_eq!(t.observe("download: 100%"), Some(25));
        t.observe("[download] Downloading item 2 of 4");
        assert_eq!(t.observe("download: 50%"), Some(37));
        t.observe("[download] Downloading item 4 of 4");
        assert_eq!(t.observe("download: 100%"), Some(100));
    }

    #[test]
    fn tracker_remembers_last_destination() {
        let mut t = ProgressTracker::new();
        t.observe("[download] Destination: /a/video.f137.mp4");
        t.observe(r#"[Merger] Merging formats into "/a/video.mp4""#);
        assert_eq!(t.output_path(), Some(&PathBuf::from("/a/video.mp4")));
    }

    #[test]
    fn throttle_lets_first_through() {
        let mut th = ProgressThrottle::new(10_000);
        assert!(th.should_emit());
        assert!(!th.should_emit());
    }
}
