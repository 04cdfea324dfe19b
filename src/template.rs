//! Rendering of file and URL name patterns.
//!
//! Patterns reference release variables as `{{.name}}` (spacing inside the
//! braces is ignored). The older `%s` placeholder is accepted and means
//! `{{.version}}`.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

pub type TemplateVars = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template variable '{name}' in '{pattern}'")]
    UnknownVariable { name: String, pattern: String },
    #[error("unterminated or malformed placeholder in '{pattern}'")]
    Malformed { pattern: String },
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

pub fn render(pattern: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
    let pattern = pattern.replace("%s", "{{.version}}");
    if placeholder().replace_all(&pattern, "").contains("{{") {
        return Err(TemplateError::Malformed { pattern });
    }

    let mut out = String::with_capacity(pattern.len());
    let mut last = 0;
    for caps in placeholder().captures_iter(&pattern) {
        let Some(whole) = caps.get(0) else { continue };
        let name = &caps[1];
        let value = vars.get(name).ok_or_else(|| TemplateError::UnknownVariable {
            name: name.to_string(),
            pattern: pattern.clone(),
        })?;
        out.push_str(&pattern[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&pattern[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("version".to_string(), "v1.2.3".to_string());
        vars.insert("os".to_string(), "linux".to_string());
        vars.insert("arch".to_string(), "amd64".to_string());
        vars
    }

    #[test]
    fn renders_placeholders() {
        assert_eq!(
            render("tool_{{.os}}_{{ .arch }}.tar.gz", &vars()).unwrap(),
            "tool_linux_amd64.tar.gz"
        );
    }

    #[test]
    fn braces_in_values_are_kept_verbatim() {
        let mut vars = vars();
        vars.insert("version".to_string(), "a{{b".to_string());
        assert_eq!(render("tool-{{.version}}", &vars).unwrap(), "tool-a{{b");
        assert!(matches!(
            render("tool-{{.version", &vars),
            Err(TemplateError::Malformed { .. })
        ));
    }

    #[test]
    fn legacy_percent_s_means_version() {
        assert_eq!(
            render("https://example.com/%s/tool-%s", &vars()).unwrap(),
            "https://example.com/v1.2.3/tool-v1.2.3"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(render("tool-linux-amd64", &vars()).unwrap(), "tool-linux-amd64");
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = render("{{.nope}}", &vars()).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownVariable { ref name, .. } if name == "nope"));
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        assert!(matches!(
            render("tool-{{.os", &vars()),
            Err(TemplateError::Malformed { .. })
        ));
    }
}
