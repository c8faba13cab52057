//! Briefing typed into freshly created agent sessions.
//!
//! Templates name project fields in braces. Recognised placeholders are
//! `{name}`, `{project_type}`, `{path}` and `{session}`; any other brace
//! text is copied through unchanged.

use crate::models::project::Project;

/// Briefing used when the config does not supply one.
pub const DEFAULT_TEMPLATE: &str = "\
AUTONOMOUS DEVELOPMENT ASSIGNMENT

Project: {name}
Type: {project_type}
Path: {path}

Your mission:
1. Analyse the existing project structure in {path}
2. Set up the development environment (install dependencies, create virtual environments as needed)
3. Start the development server
4. Implement features appropriate for a {project_type} project
5. Commit progress every 30 minutes with meaningful messages

Work independently without waiting for instructions and never sit idle.
Begin now: cd {path} && ls -la";

/// Render `template` for `project` running in `session`.
///
/// Substitution is single-pass: placeholder text inside project fields is
/// never expanded again.
#[must_use]
pub fn render(template: &str, project: &Project, session: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let resolved = tail
            .find('}')
            .and_then(|close| value_for(&tail[1..close], project, session).map(|v| (close, v)));
        match resolved {
            Some((close, value)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn value_for<'a>(key: &str, project: &'a Project, session: &'a str) -> Option<&'a str> {
    match key {
        "name" => Some(&project.name),
        "project_type" if project.project_type.is_empty() => Some("unspecified"),
        "project_type" => Some(&project.project_type),
        "path" if project.path.is_empty() => Some("."),
        "path" => Some(&project.path),
        "session" => Some(session),
        _ => None,
    }
}
