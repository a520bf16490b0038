use crate::{
    markup,
    model::{
        Id,
        group::GroupRef,
        user::User,
    },
    slug::Slug,
    util::unix_millis_serde,
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: User,
    pub group: Option<GroupRef>,
    pub message: PostMessage,
    pub message_html: String,
    /// Time of the last write, not of the first.
    #[serde(with = "unix_millis_serde")]
    pub created_at: UtcDateTime,
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message.get())
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct UserPosts {
    pub user: User,
    pub posts: Vec<Post>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CreatePost {
    pub message: PostMessage,
    #[serde(default)]
    pub group: Option<Slug>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct UpdatePost {
    pub message: PostMessage,
}

/// The message and its rendering, derived together.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostFields {
    message: PostMessage,
    message_html: String,
}

impl PostFields {
    #[must_use]
    pub fn derive(message: PostMessage) -> Self {
        let message_html = markup::render(message.get());
        Self {
            message,
            message_html,
        }
    }

    #[must_use]
    pub fn message(&self) -> &PostMessage {
        &self.message
    }

    #[must_use]
    pub fn message_html(&self) -> &str {
        &self.message_html
    }
}

/// Raw markup as written by the author. Never blank.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct PostMessage(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("A post message must not be blank")]
pub struct InvalidPostMessageError;

impl PostMessage {
    pub fn new(message: String) -> Result<Self, InvalidPostMessageError> {
        if message.trim().is_empty() {
            Err(InvalidPostMessageError)
        } else {
            Ok(Self(message))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for PostMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostMessage::new(inner)
            .map_err(|_| Error::invalid_value(Unexpected::Str("blank"), &"a non-blank message"))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        markup,
        model::post::{CreatePost, PostFields, PostMessage},
    };

    #[test]
    fn messages_must_not_be_blank() {
        assert!(PostMessage::new("Hello world".to_owned()).is_ok());
        assert!(PostMessage::new(String::new()).is_err());
        assert!(PostMessage::new(" \n\t".to_owned()).is_err());
    }

    #[test]
    fn derive_renders_message() {
        let fields = PostFields::derive(PostMessage::new("Hello _world_".to_owned()).unwrap());

        assert_eq!(fields.message().get(), "Hello _world_");
        assert_eq!(fields.message_html(), markup::render("Hello _world_"));
        assert_eq!(fields.message_html(), "<p>Hello <em>world</em></p>\n");
    }

    #[test]
    fn create_post_group_is_optional() {
        let ungrouped: CreatePost = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert_eq!(ungrouped.group, None);

        let grouped: CreatePost =
            serde_json::from_str(r#"{"message": "hi", "group": "book-club"}"#).unwrap();
        assert_eq!(grouped.group.unwrap().get(), "book-club");

        assert!(serde_json::from_str::<CreatePost>(r#"{"message": "  "}"#).is_err());
    }
}
