use serde::{Deserialize, Serialize};

/// How a run is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    /// No trace hook is installed.
    #[default]
    Normal,
    Debug,
}

impl RunMode {
    pub fn is_debug(self) -> bool {
        self == RunMode::Debug
    }
}

/// Controller's answer to a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumeDecision {
    ContinueStepping,
    /// Remove tracing for the rest of the run.
    StopDebugging,
}

impl ResumeDecision {
    /// Map a console or protocol command to a decision.
    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "" | "n" | "next" | "s" | "step" | "stepIn" => Some(ResumeDecision::ContinueStepping),
            "c" | "continue" => Some(ResumeDecision::StopDebugging),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_map_to_decisions() {
        assert_eq!(ResumeDecision::from_command("n"), Some(ResumeDecision::ContinueStepping));
        assert_eq!(ResumeDecision::from_command(""), Some(ResumeDecision::ContinueStepping));
        assert_eq!(ResumeDecision::from_command("stepIn"), Some(ResumeDecision::ContinueStepping));
        assert_eq!(ResumeDecision::from_command("c"), Some(ResumeDecision::StopDebugging));
        assert_eq!(ResumeDecision::from_command("bogus"), None);
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let json = serde_json::to_string(&ResumeDecision::StopDebugging).unwrap();
        assert_eq!(json, "\"stopDebugging\"");
    }
}
