//! String template rendering utilities.
//!
//! Templates use `{{name}}` placeholders. Only the keys passed in are
//! substituted; anything else is left verbatim.

pub struct TemplateVars;

impl TemplateVars {
    pub const ENVIRONMENT: &'static str = "environment";
    pub const DIRECTORY: &'static str = "directory";
    pub const BRANCH: &'static str = "branch";
}

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}

pub fn is_present(template: &str, key: &str) -> bool {
    let placeholder = format!("{{{{{}}}}}", key);
    template.contains(&placeholder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_every_occurrence() {
        let rendered = render(
            "cp {{directory}}/a {{directory}}/b",
            &[(TemplateVars::DIRECTORY, "/tmp/x")],
        );
        assert_eq!(rendered, "cp /tmp/x/a /tmp/x/b");
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        let rendered = render("echo {{home}}", &[(TemplateVars::BRANCH, "main")]);
        assert_eq!(rendered, "echo {{home}}");
    }

    #[test]
    fn is_present_detects_placeholder() {
        assert!(is_present("deploy {{environment}}", TemplateVars::ENVIRONMENT));
        assert!(!is_present("deploy", TemplateVars::ENVIRONMENT));
    }
}
