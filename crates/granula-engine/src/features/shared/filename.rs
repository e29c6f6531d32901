//! Upload filename sanitisation

/// Characters that are unsafe in stored filenames on common filesystems
const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\', '/'];

/// Replace path separators and reserved characters with `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
