use crate::{
    markup,
    model::{Id, post::Post, user::{User, UserMarker}},
    slug::{InvalidSlugError, Slug},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const GROUP_NAME_MAX_LEN: usize = 255;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct GroupMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct MembershipMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Group {
    pub id: Id<GroupMarker>,
    pub name: GroupName,
    pub slug: Slug,
    pub description: String,
    pub description_html: String,
}

impl Display for Group {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name.get())
    }
}

/// Just enough of a group to link to it.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct GroupRef {
    pub id: Id<GroupMarker>,
    pub name: GroupName,
    pub slug: Slug,
}

impl From<Group> for GroupRef {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            slug: group.slug,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: Group,
    pub member_count: u64,
    pub post_count: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct GroupDetail {
    pub group: Group,
    pub members: Vec<User>,
    pub posts: Vec<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CreateGroup {
    pub name: GroupName,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub struct UpdateGroup {
    pub name: Option<GroupName>,
    pub description: Option<String>,
}

impl CreateGroup {
    pub fn into_fields(self) -> Result<GroupFields, InvalidSlugError> {
        GroupFields::derive(self.name, self.description)
    }
}

impl UpdateGroup {
    /// Overlays the changes onto `current`; the result is derived afresh.
    pub fn apply_to(self, current: &Group) -> Result<GroupFields, InvalidSlugError> {
        GroupFields::derive(
            self.name.unwrap_or_else(|| current.name.clone()),
            self.description
                .unwrap_or_else(|| current.description.clone()),
        )
    }
}

/// Everything that gets written for a group. Only constructible through
/// [`GroupFields::derive`], so the slug and html always match their sources.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct GroupFields {
    name: GroupName,
    slug: Slug,
    description: String,
    description_html: String,
}

impl GroupFields {
    pub fn derive(name: GroupName, description: String) -> Result<Self, InvalidSlugError> {
        let slug = Slug::from_name(name.get())?;
        let description_html = markup::render(&description);

        Ok(Self {
            name,
            slug,
            description,
            description_html,
        })
    }

    #[must_use]
    pub fn name(&self) -> &GroupName {
        &self.name
    }

    #[must_use]
    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn description_html(&self) -> &str {
        &self.description_html
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupName(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group name is invalid: {0:?}")]
pub struct InvalidGroupNameError(String);

impl GroupName {
    /// Surrounding whitespace is dropped.
    pub fn new(name: String) -> Result<Self, InvalidGroupNameError> {
        let trimmed = name.trim();
        let length = trimmed.chars().count();

        if (1..=GROUP_NAME_MAX_LEN).contains(&length) {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(InvalidGroupNameError(name))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for GroupName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        GroupName::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"a group name"))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
pub struct Membership {
    pub id: Id<MembershipMarker>,
    pub group: Id<GroupMarker>,
    pub user: Id<UserMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum JoinOutcome {
    Joined(Membership),
    AlreadyMember,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum LeaveOutcome {
    Left,
    NotMember,
}
