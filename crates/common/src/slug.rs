/// Lowercase ASCII slug: alphanumerics kept, every run of anything else
/// collapsed to a single `-`, leading/trailing dashes trimmed.
///
/// Returns `"skill"` when nothing survives.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            dash = false;
        } else if !dash {
            out.push('-');
            dash = true;
        }
    }

    let out = out.trim_matches('-');
    if out.is_empty() {
        "skill".to_string()
    } else {
        out.to_string()
    }
}
