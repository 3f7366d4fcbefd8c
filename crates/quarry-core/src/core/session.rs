//! Session state: thread identity, workflow step, pending interrupt, flags.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::classifier::{InterruptRequest, RunOrigin};
use super::events::{EventSender, SessionEvent};

/// Workflow step as reported by the backend.
///
/// The backend is authoritative; unrecognized step names are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum WorkflowStep {
    #[default]
    Idle,
    Planning,
    AwaitingApproval,
    InformationGathering,
    RefiningResearch,
    ResearchDirectionCheck,
    Analysis,
    FormatSelection,
    ResponseFormatting,
    DirectResponse,
    Completed,
    Unknown(String),
}

impl WorkflowStep {
    pub fn parse(step: &str) -> Self {
        match step.trim() {
            "idle" => WorkflowStep::Idle,
            "planning" => WorkflowStep::Planning,
            "awaiting_approval" => WorkflowStep::AwaitingApproval,
            "information_gathering" => WorkflowStep::InformationGathering,
            "refining_research" => WorkflowStep::RefiningResearch,
            "research_direction_check" => WorkflowStep::ResearchDirectionCheck,
            "analysis" => WorkflowStep::Analysis,
            "format_selection" => WorkflowStep::FormatSelection,
            "response_formatting" => WorkflowStep::ResponseFormatting,
            "direct_response" => WorkflowStep::DirectResponse,
            "completed" => WorkflowStep::Completed,
            other => WorkflowStep::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WorkflowStep::Idle => "idle",
            WorkflowStep::Planning => "planning",
            WorkflowStep::AwaitingApproval => "awaiting_approval",
            WorkflowStep::InformationGathering => "information_gathering",
            WorkflowStep::RefiningResearch => "refining_research",
            WorkflowStep::ResearchDirectionCheck => "research_direction_check",
            WorkflowStep::Analysis => "analysis",
            WorkflowStep::FormatSelection => "format_selection",
            WorkflowStep::ResponseFormatting => "response_formatting",
            WorkflowStep::DirectResponse => "direct_response",
            WorkflowStep::Completed => "completed",
            WorkflowStep::Unknown(step) => step,
        }
    }

    /// Human-readable status text.
    pub fn description(&self) -> &str {
        match self {
            WorkflowStep::Idle => "Ready",
            WorkflowStep::Planning => "Planning research strategy",
            WorkflowStep::AwaitingApproval => "Waiting for research approval",
            WorkflowStep::InformationGathering => "Gathering information",
            WorkflowStep::RefiningResearch | WorkflowStep::ResearchDirectionCheck => {
                "Refining research direction"
            }
            WorkflowStep::Analysis => "Analyzing information",
            WorkflowStep::FormatSelection => "Selecting response format",
            WorkflowStep::ResponseFormatting => "Formatting response",
            WorkflowStep::DirectResponse => "Preparing a direct answer",
            WorkflowStep::Completed => "Research completed",
            WorkflowStep::Unknown(step) => step,
        }
    }

    fn default_stage(&self) -> Option<Stage> {
        match self {
            WorkflowStep::Idle | WorkflowStep::Unknown(_) => None,
            WorkflowStep::Planning | WorkflowStep::AwaitingApproval => Some(Stage::Planning),
            WorkflowStep::InformationGathering
            | WorkflowStep::RefiningResearch
            | WorkflowStep::ResearchDirectionCheck => Some(Stage::InformationGathering),
            WorkflowStep::Analysis | WorkflowStep::FormatSelection => Some(Stage::Analysis),
            WorkflowStep::ResponseFormatting | WorkflowStep::DirectResponse => {
                Some(Stage::ResponseFormatting)
            }
            WorkflowStep::Completed => Some(Stage::Completed),
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for WorkflowStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkflowStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let step = String::deserialize(deserializer)?;
        Ok(WorkflowStep::parse(&step))
    }
}

/// Canonical progress stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    InformationGathering,
    Analysis,
    ResponseFormatting,
    Completed,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Planning,
        Stage::InformationGathering,
        Stage::Analysis,
        Stage::ResponseFormatting,
        Stage::Completed,
    ];

    pub fn parse(stage: &str) -> Option<Self> {
        Stage::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == stage.trim())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::InformationGathering => "information_gathering",
            Stage::Analysis => "analysis",
            Stage::ResponseFormatting => "response_formatting",
            Stage::Completed => "completed",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Stage::Planning => 0,
            Stage::InformationGathering => 1,
            Stage::Analysis => 2,
            Stage::ResponseFormatting => 3,
            Stage::Completed => 4,
        }
    }

    /// `(index + 1) / 5`
    pub fn fraction(self) -> f32 {
        (self.index() + 1) as f32 / Stage::ALL.len() as f32
    }
}

/// Step → stage table with configurable overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressMap {
    overrides: BTreeMap<String, Option<Stage>>,
}

impl ProgressMap {
    /// Builds a map from `step = "stage"` config entries.
    ///
    /// `"none"` maps a step to no stage.
    ///
    /// # Errors
    /// Returns an error if a value is neither a stage name nor `"none"`.
    pub fn from_table(table: &BTreeMap<String, String>) -> Result<Self> {
        let mut map = ProgressMap::default();
        for (step, stage) in table {
            let stage = match stage.trim() {
                "none" => None,
                name => match Stage::parse(name) {
                    Some(stage) => Some(stage),
                    None => bail!(
                        "Unknown progress stage '{name}' for step '{step}' (expected one of: \
                         planning, information_gathering, analysis, response_formatting, \
                         completed, none)"
                    ),
                },
            };
            map.overrides.insert(step.trim().to_string(), stage);
        }
        Ok(map)
    }

    #[must_use]
    pub fn with_override(mut self, step: impl Into<String>, stage: Option<Stage>) -> Self {
        self.overrides.insert(step.into(), stage);
        self
    }

    pub fn stage_for(&self, step: &WorkflowStep) -> Option<Stage> {
        match self.overrides.get(step.as_str()) {
            Some(stage) => *stage,
            None => step.default_stage(),
        }
    }

    /// Progress fraction in `0.0..=1.0`; steps without a stage report 0.
    pub fn progress(&self, step: &WorkflowStep) -> f32 {
        self.stage_for(step).map_or(0.0, Stage::fraction)
    }
}

/// Point-in-time view of a session for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub thread_id: Option<String>,
    pub current_step: WorkflowStep,
    pub step_description: String,
    pub stage: Option<Stage>,
    pub progress: f32,
    pub pending_interrupt: Option<InterruptRequest>,
    pub is_busy: bool,
    pub is_loading: bool,
}

/// The workflow instance.
///
/// Created empty: no thread, step `idle`. Mutated only by the crate's
/// dispatcher and merger; every change is published as
/// [`SessionEvent::StateChanged`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    thread_id: Option<String>,
    current_step: WorkflowStep,
    pending_interrupt: Option<InterruptRequest>,
    is_busy: bool,
    is_loading: bool,
    run_origin: RunOrigin,
    progress: ProgressMap,
    events: EventSender,
}

impl Session {
    pub fn new(progress: ProgressMap, events: EventSender) -> Self {
        Self {
            progress,
            events,
            ..Self::default()
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn current_step(&self) -> &WorkflowStep {
        &self.current_step
    }

    pub fn pending_interrupt(&self) -> Option<&InterruptRequest> {
        self.pending_interrupt.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.is_busy
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn run_origin(&self) -> RunOrigin {
        self.run_origin
    }

    pub fn progress(&self) -> f32 {
        self.progress.progress(&self.current_step)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            thread_id: self.thread_id.clone(),
            current_step: self.current_step.clone(),
            step_description: self.current_step.description().to_string(),
            stage: self.progress.stage_for(&self.current_step),
            progress: self.progress(),
            pending_interrupt: self.pending_interrupt.clone(),
            is_busy: self.is_busy,
            is_loading: self.is_loading,
        }
    }

    /// Replaces step and interrupt wholesale from a server response.
    ///
    /// The thread id is only taken the first time; once set it is fixed.
    pub(crate) fn apply_response(
        &mut self,
        thread_id: Option<String>,
        step: WorkflowStep,
        interrupt: Option<InterruptRequest>,
    ) {
        if self.thread_id.is_none() {
            self.thread_id = thread_id;
        }
        self.current_step = step;
        self.pending_interrupt = interrupt;
        self.publish();
    }

    pub(crate) fn set_run_origin(&mut self, origin: RunOrigin) {
        self.run_origin = origin;
    }

    /// Sets the busy flag; loading follows it.
    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.is_busy = busy;
        self.is_loading = busy;
        self.publish();
    }

    /// Marks the first output as received.
    pub(crate) fn output_started(&mut self) {
        self.is_loading = false;
        self.pending_interrupt = None;
        self.publish();
    }

    fn publish(&self) {
        self.events.emit(SessionEvent::StateChanged {
            snapshot: self.snapshot(),
        });
    }
}
