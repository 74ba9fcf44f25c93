//! Turning arbitrary cache keys into Linux-safe file names.

/// Linux `NAME_MAX`.
const NAME_MAX: usize = 255;

fn is_unsafe(c: char) -> bool {
    c == '\0' || c == '/' || c == '\\' || c.is_control() || c.is_whitespace()
}

/// Makes `key` usable as a single path component.
///
/// Unsafe characters (separators, NUL, control and whitespace) become `_`,
/// runs of `_` collapse, leading/trailing dots and underscores are trimmed
/// and the result is cut to 255 bytes on a char boundary. Distinct keys may
/// map to the same name; callers treat the key as the identity.
pub fn sanitize_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        let c = if is_unsafe(c) { '_' } else { c };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_and_whitespace_replaced() {
        assert_eq!(sanitize_file_name("a/b\\c d.bin"), "a_b_c_d.bin");
        assert_eq!(sanitize_file_name("x\x00y\ty"), "x_y_y");
    }

    #[test]
    fn trims_dots_and_underscores() {
        assert_eq!(sanitize_file_name("../model.bin."), "model.bin");
        assert_eq!(sanitize_file_name("__a__"), "a");
    }

    #[test]
    fn long_names_cut_on_char_boundary() {
        let long = "é".repeat(200);
        let out = sanitize_file_name(&long);
        assert!(out.len() <= NAME_MAX);
        assert!(out.chars().all(|c| c == 'é'));
    }
}
