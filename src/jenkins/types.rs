use serde::{Deserialize, Deserializer};

const UNKNOWN_STATUS: &str = "UNKNOWN";
const UNNAMED_STAGE: &str = "Unnamed Stage";
const GIT_TAG_ACTION_CLASS: &str = "jenkins.plugins.git.GitTagAction";

/// Job metadata from `/job/<name>/api/json`.
///
/// Only the build pointers are read; Jenkins sends `null` for a pointer when
/// the job has no such build yet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub last_completed_build: Option<BuildRef>,
    pub last_build: Option<BuildRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BuildRef {
    pub number: u64,
}

impl JobInfo {
    pub fn last_completed_number(&self) -> u64 {
        self.last_completed_build.map_or(0, |build| build.number)
    }

    /// Starting watermark for a job: the last completed build, or the last
    /// (possibly running) build when nothing has completed yet.
    pub fn initial_watermark(&self) -> u64 {
        match self.last_completed_number() {
            0 => self.last_build.map_or(0, |build| build.number),
            number => number,
        }
    }
}

/// A single build as returned by the Pipeline Stage View `wfapi/describe` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDescription {
    pub status: Option<String>,
    pub duration_millis: Option<u64>,
    #[serde(default)]
    pub stages: Vec<StageDescription>,
    #[serde(default, deserialize_with = "skip_null_actions")]
    pub actions: Vec<BuildAction>,
}

impl BuildDescription {
    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or(UNKNOWN_STATUS)
    }

    pub fn duration_seconds(&self) -> f64 {
        millis_to_seconds(self.duration_millis)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDescription {
    pub name: Option<String>,
    pub status: Option<String>,
    pub duration_millis: Option<u64>,
}

impl StageDescription {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED_STAGE)
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or(UNKNOWN_STATUS)
    }

    pub fn duration_seconds(&self) -> f64 {
        millis_to_seconds(self.duration_millis)
    }
}

#[allow(clippy::cast_precision_loss)]
fn millis_to_seconds(millis: Option<u64>) -> f64 {
    millis.unwrap_or(0) as f64 / 1000.0
}

/// Metadata block attached to a build.
///
/// Jenkins emits many action classes; only the ones that can carry branch
/// information get their own variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawAction")]
pub enum BuildAction {
    /// Git plugin `BuildData`: the revision that was checked out.
    Revision { branches: Vec<BranchRef> },
    /// Build parameters supplied by the user or the trigger.
    Parameters(Vec<BuildParameter>),
    /// Git plugin `GitTagAction`.
    GitTag { tags: Vec<TagRef> },
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BranchRef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildParameter {
    pub name: Option<String>,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TagRef {
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    #[serde(rename = "_class")]
    class: Option<String>,
    last_built_revision: Option<RawRevision>,
    parameters: Option<Vec<BuildParameter>>,
    /// Only meaningful on `GitTagAction`; other plugins reuse the key with
    /// their own shapes.
    tags: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawRevision {
    branch: Option<Vec<BranchRef>>,
}

impl From<RawAction> for BuildAction {
    fn from(raw: RawAction) -> Self {
        if raw.class.as_deref() == Some(GIT_TAG_ACTION_CLASS) {
            let tags = raw
                .tags
                .and_then(|tags| serde_json::from_value::<Vec<TagRef>>(tags).ok())
                .unwrap_or_default();
            if !tags.is_empty() {
                return Self::GitTag { tags };
            }
        }

        let branches = raw
            .last_built_revision
            .and_then(|revision| revision.branch)
            .unwrap_or_default();
        if !branches.is_empty() {
            return Self::Revision { branches };
        }

        match raw.parameters {
            Some(parameters) => Self::Parameters(parameters),
            None => Self::Other,
        }
    }
}

fn skip_null_actions<'de, D>(deserializer: D) -> Result<Vec<BuildAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let actions: Option<Vec<Option<BuildAction>>> = Option::deserialize(deserializer)?;
    Ok(actions.into_iter().flatten().flatten().collect())
}
