//! Path and placeholder expansion for tool registrations and config text.

use std::path::PathBuf;

/// Replace `${ENV_VAR}` placeholders using the process environment.
///
/// Unresolvable variables are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => result.push_str(&value),
                    None => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    },
                }
                rest = &after[end + 1..];
            },
            _ => {
                // Malformed or empty: keep the literal text.
                result.push_str("${");
                rest = after;
            },
        }
    }
    result.push_str(rest);
    result
}

/// The user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Expand `${VAR}` placeholders and a leading `~/` (or bare `~`).
pub fn expand_path(raw: &str) -> PathBuf {
    expand_path_with(raw, home_dir(), |name| std::env::var(name).ok())
}

fn expand_path_with(
    raw: &str,
    home: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    let substituted = substitute_env_with(raw.trim(), lookup);
    match (substituted.as_str(), home) {
        ("~", Some(home)) => home,
        (s, Some(home)) if s.starts_with("~/") => home.join(&s[2..]),
        (s, _) => PathBuf::from(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SKILLSYOGA_TEST_VAR" => Some("hello".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("key=${SKILLSYOGA_TEST_VAR}", lookup),
            "key=hello"
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env_with("${SKILLSYOGA_NONEXISTENT_XYZ}/x", lookup),
            "${SKILLSYOGA_NONEXISTENT_XYZ}/x"
        );
    }

    #[test]
    fn malformed_placeholder_is_literal() {
        assert_eq!(substitute_env_with("a ${UNCLOSED", lookup), "a ${UNCLOSED");
        assert_eq!(substitute_env_with("${}", lookup), "${}");
    }

    #[test]
    fn expands_home_prefix() {
        let home = Some(PathBuf::from("/home/ada"));
        assert_eq!(
            expand_path_with("~/.cursor/skills", home.clone(), lookup),
            PathBuf::from("/home/ada/.cursor/skills")
        );
        assert_eq!(expand_path_with("~", home, lookup), PathBuf::from("/home/ada"));
    }

    #[test]
    fn expands_env_then_keeps_absolute() {
        assert_eq!(
            expand_path_with("/opt/${SKILLSYOGA_TEST_VAR}/skills", None, lookup),
            PathBuf::from("/opt/hello/skills")
        );
    }

    #[test]
    fn tilde_without_home_is_literal() {
        assert_eq!(expand_path_with("~/x", None, lookup), PathBuf::from("~/x"));
    }
}
