use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{AgentId, Colour, geometry::Turn};

/// Largest message size, as measured by [`Content::size`], that is delivered untouched.
pub const MESSAGE_SIZE_LIMIT: usize = 100;

/// Represents actions an agent can decide to take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Move,
    Turn(Turn),
    Clean,
    Drop(Colour),
    Idle,
    /// An empty recipient set broadcasts to every other live agent.
    Speak {
        content: Content,
        recipients: BTreeSet<AgentId>,
    },
}

impl Action {
    pub fn broadcast(content: impl Into<Content>) -> Self {
        Action::Speak {
            content: content.into(),
            recipients: BTreeSet::new(),
        }
    }

    pub fn speak_to(
        content: impl Into<Content>,
        recipients: impl IntoIterator<Item = AgentId>,
    ) -> Self {
        Action::Speak {
            content: content.into(),
            recipients: recipients.into_iter().collect(),
        }
    }

    /// Everything except `Speak` acts on the grid.
    pub fn is_physical(&self) -> bool {
        !matches!(self, Action::Speak { .. })
    }

    fn check_payload(&self) -> Result<(), ActionError> {
        match self {
            Action::Drop(colour) if !colour.is_dirt_colour() => Err(ActionError::MalformedAction(
                format!("cannot drop dirt of colour {:?}", colour),
            )),
            _ => Ok(()),
        }
    }
}

/// Errors raised while validating what a mind decided.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Malformed action: {0}")]
    MalformedAction(String),
    #[error("Invalid action combination: {0}")]
    InvalidActionCombination(String),
}

/// What a mind returns from `decide`: nothing, one action, or a pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision(pub Vec<Action>);

impl Decision {
    pub fn none() -> Self {
        Decision(Vec::new())
    }

    pub fn single(action: Action) -> Self {
        Decision(vec![action])
    }

    pub fn pair(first: Action, second: Action) -> Self {
        Decision(vec![first, second])
    }

    /// Checks the decision's shape and splits it into its physical and speech parts.
    pub fn validate(self) -> Result<ValidDecision, ActionError> {
        if self.0.len() > 2 {
            return Err(ActionError::MalformedAction(format!(
                "a decision holds at most two actions, got {}",
                self.0.len()
            )));
        }

        let mut valid = ValidDecision::default();
        for action in self.0 {
            action.check_payload()?;
            match action {
                Action::Speak {
                    content,
                    recipients,
                } => {
                    if valid.speech.is_some() {
                        return Err(ActionError::InvalidActionCombination(
                            "two speech actions in one tick".to_string(),
                        ));
                    }
                    valid.speech = Some(Speech {
                        content,
                        recipients,
                    });
                }
                physical => {
                    if valid.physical.is_some() {
                        return Err(ActionError::InvalidActionCombination(
                            "two physical actions in one tick".to_string(),
                        ));
                    }
                    valid.physical = Some(physical);
                }
            }
        }
        Ok(valid)
    }
}

impl From<Action> for Decision {
    fn from(action: Action) -> Self {
        Decision::single(action)
    }
}

impl From<Option<Action>> for Decision {
    fn from(action: Option<Action>) -> Self {
        Decision(action.into_iter().collect())
    }
}

impl From<(Action, Action)> for Decision {
    fn from((first, second): (Action, Action)) -> Self {
        Decision::pair(first, second)
    }
}

/// A decision that passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidDecision {
    /// Never `Speak`.
    pub physical: Option<Action>,
    pub speech: Option<Speech>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Speech {
    pub content: Content,
    pub recipients: BTreeSet<AgentId>,
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: AgentId,
    pub content: Content,
}

/// Arbitrarily nested message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Content>),
}

impl Content {
    /// Size used for message bounding.
    ///
    /// `None` counts 0, a scalar counts the characters of its text form, and a sequence counts
    /// its length plus one plus the sizes of its elements.
    pub fn size(&self) -> usize {
        match self {
            Content::None => 0,
            Content::Seq(items) => seq_size(items),
            scalar => scalar.to_string().chars().count(),
        }
    }

    fn repr(&self) -> String {
        match self {
            Content::Str(s) => format!("'{}'", s),
            other => other.to_string(),
        }
    }
}

fn seq_size(items: &[Content]) -> usize {
    items.len() + 1 + items.iter().map(Content::size).sum::<usize>()
}

/// Shortest round-trip text, switching to exponent form below 1e-4 and from 1e16 up.
fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        let text = if value > 0.0 { "inf" } else { "-inf" };
        return text.to_string();
    }
    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };
    if value != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::None => f.write_str("None"),
            Content::Bool(true) => f.write_str("True"),
            Content::Bool(false) => f.write_str("False"),
            Content::Int(n) => write!(f, "{}", n),
            Content::Float(x) => f.write_str(&format_float(*x)),
            Content::Str(s) => f.write_str(s),
            Content::Seq(items) => {
                let parts: Vec<String> = items.iter().map(Content::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Str(value.to_string())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Str(value)
    }
}

impl From<i64> for Content {
    fn from(value: i64) -> Self {
        Content::Int(value)
    }
}

impl From<f64> for Content {
    fn from(value: f64) -> Self {
        Content::Float(value)
    }
}

impl From<bool> for Content {
    fn from(value: bool) -> Self {
        Content::Bool(value)
    }
}

impl<T: Into<Content>> From<Vec<T>> for Content {
    fn from(values: Vec<T>) -> Self {
        Content::Seq(values.into_iter().map(Into::into).collect())
    }
}

/// Shrinks `content` until its size is at most `limit`.
///
/// Returns the bounded content and whether anything was cut. Trailing elements of the outermost
/// sequence go first; a sequence left with one element has that element shrunk in turn; anything
/// else is rendered as text and cut to `limit` characters.
pub fn bound_content(content: Content, limit: usize) -> (Content, bool) {
    if content.size() <= limit {
        return (content, false);
    }
    (shrink(content, limit), true)
}

fn shrink(content: Content, limit: usize) -> Content {
    if content.size() <= limit {
        return content;
    }
    match content {
        Content::Seq(mut items) => {
            while items.len() > 1 && seq_size(&items) > limit {
                items.pop();
            }
            if seq_size(&items) <= limit {
                return Content::Seq(items);
            }
            if limit >= 2 {
                if let Some(only) = items.pop() {
                    return Content::Seq(vec![shrink(only, limit - 2)]);
                }
            }
            truncate_text(&Content::Seq(items), limit)
        }
        other => truncate_text(&other, limit),
    }
}

fn truncate_text(content: &Content, limit: usize) -> Content {
    Content::Str(content.to_string().chars().take(limit).collect())
}
