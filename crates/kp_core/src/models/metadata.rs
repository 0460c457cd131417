//! Filename metadata and duration formatting.

/// Tag some karaoke releases carry in their filenames.
const RELEASE_TAG: &str = "(AutoRealKaraoke)";

/// Split a media filename into `(artist, title)`.
///
/// Expects `Artist - Title.ext`; underscores count as spaces. Anything
/// without the separator is attributed to `Unknown Artist`.
pub fn parse_artist_title(file_name: &str) -> (String, String) {
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    let cleaned = stem.replace(RELEASE_TAG, "").replace('_', " ");
    let cleaned = cleaned.trim();

    match cleaned.split_once(" - ") {
        Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
        None => ("Unknown Artist".to_string(), cleaned.to_string()),
    }
}

/// Format milliseconds as `m:ss`, or `--:--` when unknown.
pub fn format_mmss(ms: u64) -> String {
    if ms == 0 {
        return "--:--".to_string();
    }
    let total_secs = ms / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Playing time of `duration_ms` at `tempo_factor` speed.
///
/// Non-positive factors are treated as normal speed.
pub fn effective_duration_ms(duration_ms: u64, tempo_factor: f64) -> u64 {
    let factor = if tempo_factor <= 0.0 { 1.0 } else { tempo_factor };
    (duration_ms as f64 / factor) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_artist_and_title() {
        assert_eq!(
            parse_artist_title("Queen - Bohemian Rhapsody.mp4"),
            ("Queen".to_string(), "Bohemian Rhapsody".to_string())
        );
        assert_eq!(
            parse_artist_title("Bon_Jovi_-_Livin_On_A_Prayer.cdg"),
            ("Bon Jovi".to_string(), "Livin On A Prayer".to_string())
        );
        assert_eq!(
            parse_artist_title("ABBA - Waterloo (AutoRealKaraoke).mkv"),
            ("ABBA".to_string(), "Waterloo".to_string())
        );
    }

    #[test]
    fn unknown_artist_without_separator() {
        assert_eq!(
            parse_artist_title("some_track.mp4"),
            ("Unknown Artist".to_string(), "some track".to_string())
        );
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_mmss(0), "--:--");
        assert_eq!(format_mmss(999), "0:00");
        assert_eq!(format_mmss(61_000), "1:01");
        assert_eq!(format_mmss(3_725_000), "62:05");
    }

    #[test]
    fn effective_duration_applies_tempo() {
        assert_eq!(effective_duration_ms(125_000, 1.25), 100_000);
        assert_eq!(effective_duration_ms(75_000, 0.75), 100_000);
        assert_eq!(effective_duration_ms(60_000, 0.0), 60_000);
        assert_eq!(effective_duration_ms(60_000, -0.5), 60_000);
    }
}
