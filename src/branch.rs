use crate::jenkins::{BuildAction, BuildParameter};

/// Label used when no action carries usable branch information.
pub const UNKNOWN_BRANCH: &str = "unknown";

const BRANCH_PARAMETER_NAMES: [&str; 2] = ["branch", "git_branch"];
const REF_PREFIXES: [&str; 2] = ["refs/remotes/origin/", "refs/heads/"];

/// Derives the branch a build ran for from its action list.
///
/// The first pass walks every action looking for git revision data or a
/// branch parameter, whichever comes first; only when that finds nothing does
/// a second pass look at git tags. Existing dashboards depend on this order.
pub fn resolve_branch(actions: &[BuildAction]) -> String {
    actions
        .iter()
        .find_map(|action| match action {
            BuildAction::Revision { branches } => branches
                .first()
                .map(|branch| strip_ref_prefixes(branch.name.as_deref().unwrap_or(UNKNOWN_BRANCH))),
            BuildAction::Parameters(parameters) => parameters
                .iter()
                .find(|parameter| is_branch_parameter(parameter))
                .map(parameter_value),
            BuildAction::GitTag { .. } | BuildAction::Other => None,
        })
        .or_else(|| {
            actions.iter().find_map(|action| match action {
                BuildAction::GitTag { tags } => tags
                    .first()
                    .map(|tag| tag.name.as_deref().unwrap_or(UNKNOWN_BRANCH).to_string()),
                _ => None,
            })
        })
        .unwrap_or_else(|| UNKNOWN_BRANCH.to_string())
}

fn strip_ref_prefixes(name: &str) -> String {
    REF_PREFIXES
        .iter()
        .fold(name, |name, prefix| name.strip_prefix(*prefix).unwrap_or(name))
        .to_string()
}

fn is_branch_parameter(parameter: &BuildParameter) -> bool {
    parameter.name.as_deref().is_some_and(|name| {
        BRANCH_PARAMETER_NAMES
            .iter()
            .any(|candidate| name.eq_ignore_ascii_case(candidate))
    })
}

fn parameter_value(parameter: &BuildParameter) -> String {
    match &parameter.value {
        Some(serde_json::Value::String(value)) => value.clone(),
        Some(serde_json::Value::Null) | None => UNKNOWN_BRANCH.to_string(),
        Some(other) => other.to_string(),
    }
}
