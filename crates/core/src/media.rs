//! Display and file-type helpers for source videos.

use std::path::Path;

/// Video container extensions the converter accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Check whether `path` has a supported video extension (case-insensitive).
pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
}

/// Best-effort MIME type for a supported extension.
pub fn video_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// Format a byte count as mebibytes with two decimals, e.g. `"12.34 MB"`.
pub fn format_filesize(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Format a duration in seconds as `HH:MM:SS`.
///
/// Fractions are dropped; negative or non-finite input renders as zero.
pub fn format_duration(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_extensions_any_case() {
        assert!(is_supported_video(Path::new("clip.mp4")));
        assert!(is_supported_video(Path::new("/tmp/Holiday.MOV")));
        assert!(is_supported_video(Path::new("a.b.mkv")));
    }

    #[test]
    fn unsupported_or_missing_extension() {
        assert!(!is_supported_video(Path::new("notes.txt")));
        assert!(!is_supported_video(Path::new("video")));
        assert!(!is_supported_video(Path::new(".mp4")));
    }

    #[test]
    fn mime_types() {
        assert_eq!(video_mime_type(Path::new("x.MKV")), "video/x-matroska");
        assert_eq!(video_mime_type(Path::new("x.bin")), "application/octet-stream");
    }

    #[test]
    fn filesize_in_megabytes() {
        assert_eq!(format_filesize(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_filesize(1_500_000), "1.43 MB");
        assert_eq!(format_filesize(0), "0.00 MB");
    }

    #[test]
    fn duration_as_clock() {
        assert_eq!(format_duration(61.5), "00:01:01");
        assert_eq!(format_duration(3723.0), "01:02:03");
        assert_eq!(format_duration(-4.0), "00:00:00");
        assert_eq!(format_duration(f64::NAN), "00:00:00");
    }
}
