//! Interrupt classification.
//!
//! The backend pauses with a free-text prompt. The classifier derives what
//! kind of decision is being asked for and which options to offer.

use serde::{Deserialize, Serialize};

/// Research plan options, offered for plan approval and general prompts.
pub const PLAN_OPTIONS: [&str; 4] = ["proceed", "simplified", "focused", "cancel"];

/// Research direction options.
pub const DIRECTION_OPTIONS: [&str; 5] =
    ["technical", "practical", "recent", "comparative", "continue"];

/// Extra direction option offered when the run began with a follow-up.
pub const CONTINUE_CONTEXT_OPTION: &str = "continue_context";

/// Response format options. Choosing one opens the streamed completion.
pub const FORMAT_OPTIONS: [&str; 5] = [
    "comprehensive",
    "executive",
    "structured",
    "conversational",
    "bullet_points",
];

const DIRECTION_MARKERS: [&str; 2] = ["research direction", "explore any specific angle"];
const FORMAT_MARKERS: [&str; 3] = ["choose response format", "presentation style", "executive"];
/// Checked after the plan markers: plan prompts also talk about "comprehensive research".
const LATE_FORMAT_MARKERS: [&str; 1] = ["comprehensive"];
const PLAN_MARKERS: [&str; 4] = [
    "research plan",
    "research query analysis",
    "follow-up question analysis",
    "how you'd like me to proceed",
];

/// Which decision an interrupt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptCategory {
    PlanApproval,
    DirectionRefinement,
    FormatSelection,
    General,
}

impl InterruptCategory {
    pub fn display_name(self) -> &'static str {
        match self {
            InterruptCategory::PlanApproval => "Research Plan",
            InterruptCategory::DirectionRefinement => "Research Direction",
            InterruptCategory::FormatSelection => "Response Format",
            InterruptCategory::General => "Selection",
        }
    }
}

/// Option with a backend-supplied label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledOption {
    pub token: String,
    pub label: String,
}

/// Options offered by an interrupt. Exactly one representation is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum InterruptOptions {
    /// Ordered option tokens, labeled through [`option_display`].
    Tokens(Vec<String>),
    /// Ordered token → label pairs.
    Labeled(Vec<LabeledOption>),
}

impl InterruptOptions {
    pub fn from_tokens(tokens: &[&str]) -> Self {
        InterruptOptions::Tokens(tokens.iter().map(|t| (*t).to_string()).collect())
    }

    /// Option tokens in offer order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        let (tokens, labeled) = match self {
            InterruptOptions::Tokens(tokens) => (tokens.as_slice(), &[][..]),
            InterruptOptions::Labeled(labeled) => (&[][..], labeled.as_slice()),
        };
        tokens
            .iter()
            .map(String::as_str)
            .chain(labeled.iter().map(|option| option.token.as_str()))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens().any(|t| t == token)
    }

    /// Returns the token at a zero-based position.
    pub fn get(&self, position: usize) -> Option<&str> {
        self.tokens().nth(position)
    }

    pub fn len(&self) -> usize {
        match self {
            InterruptOptions::Tokens(tokens) => tokens.len(),
            InterruptOptions::Labeled(labeled) => labeled.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display label for one of the offered tokens.
    pub fn label_for<'a>(&'a self, token: &'a str) -> &'a str {
        if let InterruptOptions::Labeled(labeled) = self
            && let Some(option) = labeled.iter().find(|option| option.token == token)
        {
            return &option.label;
        }
        option_display(token).label
    }
}

/// A pause signal from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub raw_message: String,
    pub category: InterruptCategory,
    pub options: InterruptOptions,
}

/// How the current research run was begun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOrigin {
    #[default]
    Initial,
    FollowUp,
}

/// Derives an [`InterruptRequest`] from a backend prompt.
pub trait InterruptClassifier: Send + Sync {
    fn classify(&self, raw_message: &str, origin: RunOrigin) -> InterruptRequest;
}

/// Keyword classifier: case-insensitive marker matching, first rule wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl InterruptClassifier for KeywordClassifier {
    fn classify(&self, raw_message: &str, origin: RunOrigin) -> InterruptRequest {
        let haystack = raw_message.to_lowercase();
        let has_any = |markers: &[&str]| markers.iter().any(|marker| haystack.contains(marker));

        let (category, options) = if has_any(&DIRECTION_MARKERS) {
            let mut tokens = DIRECTION_OPTIONS.to_vec();
            if origin == RunOrigin::FollowUp {
                tokens.push(CONTINUE_CONTEXT_OPTION);
            }
            (InterruptCategory::DirectionRefinement, tokens)
        } else if has_any(&FORMAT_MARKERS) {
            (InterruptCategory::FormatSelection, FORMAT_OPTIONS.to_vec())
        } else if has_any(&PLAN_MARKERS) {
            (InterruptCategory::PlanApproval, PLAN_OPTIONS.to_vec())
        } else if has_any(&LATE_FORMAT_MARKERS) {
            (InterruptCategory::FormatSelection, FORMAT_OPTIONS.to_vec())
        } else {
            (InterruptCategory::General, PLAN_OPTIONS.to_vec())
        };

        InterruptRequest {
            raw_message: raw_message.to_string(),
            category,
            options: InterruptOptions::from_tokens(&options),
        }
    }
}

/// Returns true when choosing `token` should stream the final answer.
pub fn is_format_choice(token: &str) -> bool {
    FORMAT_OPTIONS.contains(&token.trim())
}

/// Display entry for an option token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDisplay<'a> {
    pub glyph: Option<&'static str>,
    pub label: &'a str,
    pub description: Option<&'static str>,
}

impl OptionDisplay<'_> {
    /// Text recorded in the log when the option is chosen.
    pub fn choice_text(&self) -> &str {
        self.description.unwrap_or(self.label)
    }
}

const OPTION_TABLE: [(&str, &str, &str, &str); 15] = [
    ("proceed", "📋", "Proceed", "Full comprehensive research"),
    ("simplified", "⚡", "Simplified", "Quick overview with key points"),
    ("focused", "🎯", "Focused", "Targeted research on specific aspects"),
    ("cancel", "❌", "Cancel", "Stop the research process"),
    ("technical", "⚙️", "Technical", "Deep dive into technical details"),
    ("practical", "🛠️", "Practical", "Real-world applications and use cases"),
    ("recent", "📈", "Recent", "Latest developments and trends"),
    ("comparative", "⚖️", "Comparative", "Compare different approaches"),
    ("continue", "➡️", "Continue", "General comprehensive analysis"),
    (
        "continue_context",
        "🔗",
        "Continue with Context",
        "Build on previous conversation",
    ),
    (
        "comprehensive",
        "📚",
        "Comprehensive",
        "Detailed analysis with examples and explanations",
    ),
    (
        "executive",
        "👔",
        "Executive",
        "Concise summary with key insights and recommendations",
    ),
    (
        "structured",
        "📊",
        "Structured",
        "Clear headings, sections, and bullet points",
    ),
    (
        "conversational",
        "💬",
        "Conversational",
        "Natural, friendly tone with explanations",
    ),
    (
        "bullet_points",
        "📝",
        "Bullet Points",
        "Quick reference format with organized lists",
    ),
];

/// Looks up the display entry for a token.
///
/// Total: unknown tokens are labeled with the token itself.
pub fn option_display(token: &str) -> OptionDisplay<'_> {
    OPTION_TABLE
        .iter()
        .find(|(known, ..)| *known == token)
        .map_or(
            OptionDisplay {
                glyph: None,
                label: token,
                description: None,
            },
            |&(_, glyph, label, description)| OptionDisplay {
                glyph: Some(glyph),
                label,
                description: Some(description),
            },
        )
}
