use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::domain::{ApplicationId, Badge, CardId, Category};

/// Interactive control payloads, decoded once when they arrive from the transport.
///
/// Wire form: `category:<code>`, `confirm:yes|no`, `approve:<id>`, `reject:<id>`,
/// `view:<id>`, `badge:<badge>:<card_id>`, `admin:applications`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectCategory(Category),
    Confirm(bool),
    Approve(ApplicationId),
    Reject(ApplicationId),
    View(ApplicationId),
    ToggleBadge { badge: Badge, card_id: CardId },
    ListApplications,
}

impl Action {
    /// Whether the action is reserved for admins.
    pub const fn is_admin(self) -> bool {
        !matches!(self, Action::SelectCategory(_) | Action::Confirm(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionParseError {
    #[error("empty action identifier")]
    Empty,
    #[error("unknown action '{0}'")]
    UnknownKind(String),
    #[error("unknown category code '{0}'")]
    UnknownCategory(String),
    #[error("unknown badge '{0}'")]
    UnknownBadge(String),
    #[error("malformed action '{0}'")]
    Malformed(String),
}

fn parse_id(raw: &str, whole: &str) -> Result<i64, ActionParseError> {
    raw.parse::<i64>()
        .map_err(|_| ActionParseError::Malformed(whole.to_string()))
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ActionParseError::Empty);
        }

        let mut parts = raw.split(':');
        let kind = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        match (kind, rest.as_slice()) {
            ("category", [code]) => Category::from_code(code)
                .map(Action::SelectCategory)
                .ok_or_else(|| ActionParseError::UnknownCategory((*code).to_string())),
            ("confirm", ["yes"]) => Ok(Action::Confirm(true)),
            ("confirm", ["no"]) => Ok(Action::Confirm(false)),
            ("approve", [id]) => Ok(Action::Approve(ApplicationId(parse_id(id, raw)?))),
            ("reject", [id]) => Ok(Action::Reject(ApplicationId(parse_id(id, raw)?))),
            ("view", [id]) => Ok(Action::View(ApplicationId(parse_id(id, raw)?))),
            ("badge", [badge, id]) => {
                let badge = Badge::from_code(badge)
                    .ok_or_else(|| ActionParseError::UnknownBadge((*badge).to_string()))?;
                Ok(Action::ToggleBadge {
                    badge,
                    card_id: CardId(parse_id(id, raw)?),
                })
            }
            ("admin", ["applications"]) => Ok(Action::ListApplications),
            ("category" | "confirm" | "approve" | "reject" | "view" | "badge" | "admin", _) => {
                Err(ActionParseError::Malformed(raw.to_string()))
            }
            _ => Err(ActionParseError::UnknownKind(kind.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SelectCategory(category) => write!(f, "category:{}", category.code()),
            Action::Confirm(true) => f.write_str("confirm:yes"),
            Action::Confirm(false) => f.write_str("confirm:no"),
            Action::Approve(id) => write!(f, "approve:{id}"),
            Action::Reject(id) => write!(f, "reject:{id}"),
            Action::View(id) => write!(f, "view:{id}"),
            Action::ToggleBadge { badge, card_id } => {
                write!(f, "badge:{}:{card_id}", badge.code())
            }
            Action::ListApplications => f.write_str("admin:applications"),
        }
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Labelled control offered alongside a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub label: String,
    pub action: Action,
}

impl Control {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Message the transport should deliver back to the identity that sent the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<Control>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            controls: Vec::new(),
        }
    }

    pub fn with_controls(text: impl Into<String>, controls: Vec<Control>) -> Self {
        Self {
            text: text.into(),
            controls,
        }
    }
}

pub fn category_controls() -> Vec<Control> {
    Category::ALL
        .into_iter()
        .map(|category| Control::new(category.label(), Action::SelectCategory(category)))
        .collect()
}

pub fn confirm_controls() -> Vec<Control> {
    vec![
        Control::new("Yes", Action::Confirm(true)),
        Control::new("No", Action::Confirm(false)),
    ]
}

pub fn moderation_controls(id: ApplicationId) -> Vec<Control> {
    vec![
        Control::new("Approve", Action::Approve(id)),
        Control::new("Reject", Action::Reject(id)),
        Control::new("View", Action::View(id)),
    ]
}

pub fn badge_controls(card_id: CardId) -> Vec<Control> {
    Badge::ALL
        .into_iter()
        .map(|badge| Control::new(badge.code(), Action::ToggleBadge { badge, card_id }))
        .collect()
}
