/// Replace `${ENV_VAR}` and `${ENV_VAR:-fallback}` placeholders in raw config text.
///
/// Unresolvable variables without a fallback are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with a custom lookup, so tests never touch the
/// process environment.
fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: emit the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let body = &after[..end];
        let (name, fallback) = match body.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (body, None),
        };

        match (name.is_empty(), lookup(name), fallback) {
            (false, Some(value), _) => out.push_str(&value),
            (false, None, Some(fallback)) => out.push_str(fallback),
            _ => {
                out.push_str("${");
                out.push_str(body);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "ARCHIVER_TEST_IMAGE" => Some("git-and-zip:edge".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_env_with("worker_image = \"${ARCHIVER_TEST_IMAGE}\"", lookup),
            "worker_image = \"git-and-zip:edge\""
        );
    }

    #[test]
    fn uses_fallback_for_missing_var() {
        assert_eq!(
            substitute_env_with("port = ${ARCHIVER_TEST_PORT:-8080}", lookup),
            "port = 8080"
        );
    }

    #[test]
    fn known_var_beats_fallback() {
        assert_eq!(
            substitute_env_with("${ARCHIVER_TEST_IMAGE:-alpine}", lookup),
            "git-and-zip:edge"
        );
    }

    #[test]
    fn leaves_unknown_var_and_unterminated_placeholders() {
        assert_eq!(
            substitute_env_with("${ARCHIVER_NOPE} ${}", lookup),
            "${ARCHIVER_NOPE} ${}"
        );
        assert_eq!(substitute_env_with("a ${OPEN", lookup), "a ${OPEN");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
