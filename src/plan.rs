use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ColorChoice;
use crate::index::EntryState;

#[derive(Debug, Deserialize)]
pub struct TogglePlan {
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PlanStep {
    Toggle(StepTargets),
    Enable(StepTargets),
    Disable(StepTargets),
}

impl PlanStep {
    pub fn kind(&self) -> &'static str {
        match self {
            PlanStep::Toggle(_) => "toggle",
            PlanStep::Enable(_) => "enable",
            PlanStep::Disable(_) => "disable",
        }
    }

    /// `None` flips every entry; otherwise the state entries should end in.
    pub fn desired_state(&self) -> Option<EntryState> {
        match self {
            PlanStep::Toggle(_) => None,
            PlanStep::Enable(_) => Some(EntryState::Live),
            PlanStep::Disable(_) => Some(EntryState::Commented),
        }
    }

    pub fn targets(&self) -> &StepTargets {
        match self {
            PlanStep::Toggle(targets) | PlanStep::Enable(targets) | PlanStep::Disable(targets) => {
                targets
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StepTargets {
    #[serde(default)]
    pub common: PlanCommon,
    pub sound_names: Vec<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PlanCommon {
    #[serde(default)]
    pub files: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub globs: Option<Vec<String>>,
    pub encoding: Option<String>,
    pub apply: Option<bool>,
    pub auto_apply: Option<bool>,
    pub backup: Option<bool>,
    pub context: Option<usize>,
    #[serde(default)]
    pub color: Option<ColorChoice>,
    pub json: Option<bool>,
    pub undo_log: Option<PathBuf>,
}

pub fn load_plan(path: &Path) -> Result<TogglePlan> {
    let data = fs::read(path).with_context(|| format!("reading plan {}", path.display()))?;
    if path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
    {
        Ok(serde_json::from_slice(&data)?)
    } else {
        Ok(serde_yaml::from_slice(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn yaml_plan_with_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        fs::write(
            &path,
            "steps:\n\
             - command: disable\n\
             \x20 sound_names: [track01, track03]\n\
             \x20 common:\n\
             \x20   apply: true\n\
             \x20   color: never\n\
             - command: toggle\n\
             \x20 sound_names: [late01]\n",
        )
        .unwrap();

        let plan = load_plan(&path).unwrap();
        assert_eq!(plan.steps.len(), 2);
        let first = &plan.steps[0];
        assert_eq!(first.kind(), "disable");
        assert_eq!(first.desired_state(), Some(EntryState::Commented));
        assert_eq!(first.targets().sound_names, ["track01", "track03"]);
        assert_eq!(first.targets().common.apply, Some(true));
        assert_eq!(first.targets().common.color, Some(ColorChoice::Never));
        assert_eq!(plan.steps[1].desired_state(), None);
        assert!(plan.steps[1].targets().common.apply.is_none());
    }

    #[test]
    fn json_plan_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.JSON");
        fs::write(
            &path,
            r#"{"steps":[{"command":"enable","sound_names":["track02"],"common":{"files":["a.xml"]}}]}"#,
        )
        .unwrap();
        let plan = load_plan(&path).unwrap();
        assert_eq!(plan.steps[0].kind(), "enable");
        assert_eq!(
            plan.steps[0].targets().common.files.as_deref(),
            Some(&[PathBuf::from("a.xml")][..])
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.yml");
        fs::write(&path, "steps:\n- command: shuffle\n  sound_names: [x]\n").unwrap();
        assert!(load_plan(&path).is_err());
    }
}
