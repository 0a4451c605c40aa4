use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messaging identity of a submitter or admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub i64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier wrapper for published catalog cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub i64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference returned by the media store for a persisted avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoRef(pub String);

/// External identity as reported by the transport for the current event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Submitter {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.trim().is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Closed set of catalog sections a submitter may apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Medijki,
    Fame,
    Middle,
    Small,
    Coders,
    Goods,
    Channels,
    Scam,
    Designers,
    Editors,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Medijki,
        Category::Fame,
        Category::Middle,
        Category::Small,
        Category::Coders,
        Category::Goods,
        Category::Channels,
        Category::Scam,
        Category::Designers,
        Category::Editors,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Category::Medijki => "medijki",
            Category::Fame => "fame",
            Category::Middle => "middle",
            Category::Small => "small",
            Category::Coders => "coders",
            Category::Goods => "goods",
            Category::Channels => "channels",
            Category::Scam => "scam",
            Category::Designers => "designers",
            Category::Editors => "editors",
        }
    }

    /// Label shown on the selection control.
    pub const fn label(self) -> &'static str {
        match self {
            Category::Medijki => "Media personalities",
            Category::Fame => "Fame",
            Category::Middle => "Mid-tier",
            Category::Small => "Small",
            Category::Coders => "Coders",
            Category::Goods => "Goods",
            Category::Channels => "Channels",
            Category::Scam => "Scam",
            Category::Designers => "Designers",
            Category::Editors => "Editors",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.code() == code)
    }

    /// Catalog heading: the code with its first letter capitalized.
    pub fn display_name(self) -> String {
        let code = self.code();
        let mut chars = code.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Annotations an admin can attach to a published card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Badge {
    Verified,
    Scam,
    Pinned,
    ScamDb,
}

impl Badge {
    pub const ALL: [Badge; 4] = [Badge::Verified, Badge::Scam, Badge::Pinned, Badge::ScamDb];

    pub const fn code(self) -> &'static str {
        match self {
            Badge::Verified => "verified",
            Badge::Scam => "scam",
            Badge::Pinned => "pinned",
            Badge::ScamDb => "scamdb",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|badge| badge.code() == code)
    }
}

/// Raised when persisted badge text contains a code outside the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown badge code '{0}'")]
pub struct UnknownBadge(pub String);

/// Unordered, duplicate-free badge membership of a card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BadgeSet(BTreeSet<Badge>);

impl BadgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, badge: Badge) -> bool {
        self.0.contains(&badge)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Badge> + '_ {
        self.0.iter().copied()
    }

    /// Flips membership of `badge`, returning `true` when it is now present.
    pub fn toggle(&mut self, badge: Badge) -> bool {
        if self.0.remove(&badge) {
            false
        } else {
            self.0.insert(badge);
            true
        }
    }

    /// Comma separated storage form, e.g. `verified,scamdb`.
    pub fn to_storage(&self) -> String {
        self.iter().map(Badge::code).collect::<Vec<_>>().join(",")
    }

    pub fn from_storage(raw: &str) -> Result<Self, UnknownBadge> {
        raw.split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| Badge::from_code(code).ok_or_else(|| UnknownBadge(code.to_string())))
            .collect()
    }
}

impl FromIterator<Badge> for BadgeSet {
    fn from_iter<I: IntoIterator<Item = Badge>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Moderation lifecycle of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(ApplicationStatus::Pending),
            "approved" => Some(ApplicationStatus::Approved),
            "rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }

    pub const fn is_decided(self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

/// Fields harvested by the intake conversation, ready to be stored as pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub submitter_id: UserId,
    pub submitter_display_name: String,
    pub photo_ref: PhotoRef,
    pub name: String,
    pub handle: String,
    pub category: Category,
    pub channel: Option<String>,
    pub description: String,
}

/// Stored application together with its moderation status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub submitter_id: UserId,
    pub submitter_display_name: String,
    pub photo_ref: PhotoRef,
    pub name: String,
    pub handle: String,
    pub category: Category,
    pub channel: Option<String>,
    pub description: String,
    pub status: ApplicationStatus,
    pub admin_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// Card contents derived from this application on approval.
    pub fn card_draft(&self) -> NewCard {
        NewCard {
            name: self.name.clone(),
            handle: self.handle.clone(),
            category: self.category,
            category_display_name: self.category.display_name(),
            description: self.description.clone(),
            photo_ref: self.photo_ref.clone(),
            links: self.channel.clone(),
        }
    }
}

/// Card contents before the store assigns an id; badges start empty and pinned false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCard {
    pub name: String,
    pub handle: String,
    pub category: Category,
    pub category_display_name: String,
    pub description: String,
    pub photo_ref: PhotoRef,
    pub links: Option<String>,
}

/// Published catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub handle: String,
    pub category: Category,
    pub category_display_name: String,
    pub description: String,
    pub photo_ref: PhotoRef,
    pub likes: u32,
    pub dislikes: u32,
    pub badges: BadgeSet,
    pub links: Option<String>,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn from_draft(id: CardId, draft: NewCard, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            handle: draft.handle,
            category: draft.category,
            category_display_name: draft.category_display_name,
            description: draft.description,
            photo_ref: draft.photo_ref,
            likes: 0,
            dislikes: 0,
            badges: BadgeSet::new(),
            links: draft.links,
            pinned: false,
            created_at,
        }
    }
}

/// Local record of every identity that has talked to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub handle: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_admin: bool,
}

/// Public catalog filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CardQuery {
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default, rename = "q")]
    pub search: Option<String>,
}

impl CardQuery {
    pub fn matches(&self, card: &Card) -> bool {
        if let Some(category) = self.category {
            if card.category != category {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                card.name.to_lowercase().contains(&needle)
                    || card.description.to_lowercase().contains(&needle)
                    || card.handle.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

/// Orders cards for the public listing: pinned first, then newest.
pub fn sort_for_listing(cards: &mut [Card]) {
    cards.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    });
}
