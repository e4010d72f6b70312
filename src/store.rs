use std::path::{Path, PathBuf};

use rand::{distributions::Alphanumeric, Rng as _};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    error::ContextError,
    letter::{Letter, LetterContent, LetterStyle},
};

/// Length of the identifiers given to new letters.
const LETTER_ID_LENGTH: usize = 20;

/// Who is using the store, if anybody is signed in.
pub trait Identity {
    fn current_user_id(&self) -> Option<String>;
}

/// An identity which never changes, or the absence of one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticIdentity(pub Option<String>);

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        StaticIdentity(Some(user_id.into()))
    }

    pub fn anonymous() -> Self {
        StaticIdentity(None)
    }
}

impl Identity for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

/// The fields of a letter its sender may edit after saving it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterPatch {
    #[serde(default)]
    pub content: Option<LetterContent>,
    #[serde(default)]
    pub style: Option<LetterStyle>,
    /// Replaces the title alone, applied after `content`.
    #[serde(default)]
    pub title: Option<String>,
}

/// The user a letter gets sent to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Where letters are kept between sessions.
pub trait LetterStore {
    fn get(&self, id: &str) -> Option<Letter>;

    /// Saves a new letter, returning the identifier it was given.
    fn put(&mut self, letter: Letter) -> Result<String, ContextError>;

    fn update(&mut self, id: &str, patch: LetterPatch) -> Result<(), ContextError>;

    /// Deletes the letter for everybody when its sender asks, only hides it otherwise.
    fn delete(&mut self, id: &str, user_id: &str, is_sender: bool) -> Result<(), ContextError>;

    /// Every letter, the most recent first.
    fn list_all(&self) -> Vec<Letter>;

    fn mark_as_read(&mut self, id: &str) -> Result<(), ContextError>;

    fn assign_recipient(&mut self, id: &str, recipient: &Recipient) -> Result<(), ContextError>;

    /// The letters `user_id` has sent and not deleted, the most recent first.
    fn list_sent(&self, user_id: &str) -> Vec<Letter> {
        self.list_all()
            .into_iter()
            .filter(|letter| letter.sender_id.as_deref() == Some(user_id) && !letter.deleted)
            .collect()
    }

    /// The letters sent to `user_id` which are neither deleted nor hidden for them,
    /// the most recent first.
    fn list_received(&self, user_id: &str) -> Vec<Letter> {
        self.list_all()
            .into_iter()
            .filter(|letter| {
                letter.recipient_id.as_deref() == Some(user_id)
                    && !letter.deleted
                    && !letter.hidden_for.iter().any(|hidden_for| hidden_for == user_id)
            })
            .collect()
    }
}

/// A registered user, who letters can be addressed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Registration time in seconds since the UNIX epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl UserProfile {
    /// The user as the recipient of a letter.
    pub fn as_recipient(&self) -> Recipient {
        Recipient {
            user_id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Where the profiles of the registered users are kept.
pub trait UserDirectory {
    /// Registers the profile of `user_id`, replacing any previous one.
    fn create_user_profile(
        &mut self,
        user_id: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<(), ContextError>;

    fn get_user_profile(&self, user_id: &str) -> Option<UserProfile>;

    /// The user registered with exactly this email address, if any.
    fn search_user_by_email(&self, email: &str) -> Option<UserProfile>;
}

/// Everything a `JsonLetterStore` writes to its file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreContents {
    #[serde(default)]
    letters: Vec<Letter>,
    #[serde(default)]
    users: Vec<UserProfile>,
}

impl StoreContents {
    fn letter_mut(&mut self, id: &str) -> Result<&mut Letter, ContextError> {
        self.letters
            .iter_mut()
            .find(|letter| letter.id.as_deref() == Some(id))
            .ok_or(ContextError::with_context(format!("Failed to find the letter {:?}", id)))
    }
}

/// Keeps every letter and user in a single JSON file, rewritten after each change.
pub struct JsonLetterStore {
    file_path: PathBuf,
    contents: StoreContents,
    identity: Box<dyn Identity>,
}

impl JsonLetterStore {
    /// Opens the store backed by `file_path`, which is created on the first change if missing.
    pub fn open(file_path: &Path, identity: Box<dyn Identity>) -> Result<Self, ContextError> {
        let contents = if file_path.exists() {
            let file_contents = std::fs::read_to_string(file_path).map_err(|error| {
                ContextError::with_error(format!("Failed to read the letter store {:?}", file_path), &error)
            })?;
            serde_json::from_str(&file_contents).map_err(|error| {
                ContextError::with_error(format!("Failed to parse the letter store {:?}", file_path), &error)
            })?
        } else {
            log::debug!("The letter store {:?} does not exist yet, starting empty", file_path);
            StoreContents::default()
        };

        Ok(JsonLetterStore {
            file_path: file_path.to_path_buf(),
            contents,
            identity,
        })
    }

    /// Applies `change` to a copy of the contents, which only replaces them once written.
    fn transact<T>(
        &mut self,
        change: impl FnOnce(&mut StoreContents) -> Result<T, ContextError>,
    ) -> Result<T, ContextError> {
        let mut contents = self.contents.clone();
        let value = change(&mut contents)?;

        let serialized_contents = serde_json::to_string_pretty(&contents).map_err(|error| {
            ContextError::with_error("Failed to serialize the letter store", &error)
        })?;
        std::fs::write(&self.file_path, serialized_contents).map_err(|error| {
            ContextError::with_error(
                format!("Failed to write the letter store {:?}", self.file_path),
                &error,
            )
        })?;

        self.contents = contents;
        Ok(value)
    }

    /// Applies `change` to the letter `id` and saves the store.
    fn modify(&mut self, id: &str, change: impl FnOnce(&mut Letter)) -> Result<(), ContextError> {
        self.transact(|contents| {
            change(contents.letter_mut(id)?);
            Ok(())
        })
    }
}

impl LetterStore for JsonLetterStore {
    fn get(&self, id: &str) -> Option<Letter> {
        self.contents
            .letters
            .iter()
            .find(|letter| letter.id.as_deref() == Some(id))
            .cloned()
    }

    fn put(&mut self, mut letter: Letter) -> Result<String, ContextError> {
        let id = loop {
            let candidate: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(LETTER_ID_LENGTH)
                .map(char::from)
                .collect();
            if self.get(&candidate).is_none() {
                break candidate;
            }
        };

        letter.id = Some(id.clone());
        letter.sender_id = self.identity.current_user_id();
        letter.created_at = Some(OffsetDateTime::now_utc().unix_timestamp());
        letter.is_read = false;
        self.transact(|contents| {
            contents.letters.push(letter);
            Ok(())
        })?;
        log::info!("Saved the letter {}", id);

        Ok(id)
    }

    fn update(&mut self, id: &str, patch: LetterPatch) -> Result<(), ContextError> {
        self.modify(id, |letter| {
            if let Some(content) = patch.content {
                letter.content = content;
            }
            if let Some(style) = patch.style {
                letter.style = style;
            }
            if let Some(title) = patch.title {
                letter.content.title = Some(title);
            }
        })
    }

    fn delete(&mut self, id: &str, user_id: &str, is_sender: bool) -> Result<(), ContextError> {
        self.modify(id, |letter| {
            if is_sender {
                letter.deleted = true;
            } else if !letter.hidden_for.iter().any(|hidden_for| hidden_for == user_id) {
                letter.hidden_for.push(user_id.to_string());
            }
        })
    }

    fn list_all(&self) -> Vec<Letter> {
        let mut letters = self.contents.letters.clone();
        // Letters without a creation time come last
        letters.sort_by(|first, second| second.created_at.cmp(&first.created_at));
        letters
    }

    fn mark_as_read(&mut self, id: &str) -> Result<(), ContextError> {
        self.modify(id, |letter| letter.is_read = true)
    }

    fn assign_recipient(&mut self, id: &str, recipient: &Recipient) -> Result<(), ContextError> {
        self.modify(id, |letter| {
            letter.recipient_id = Some(recipient.user_id.clone());
            letter.recipient_name = Some(format!("{} {}", recipient.first_name, recipient.last_name));
            letter.recipient_email = Some(recipient.email.clone());
        })
    }
}

impl UserDirectory for JsonLetterStore {
    fn create_user_profile(
        &mut self,
        user_id: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<(), ContextError> {
        let user_profile = UserProfile {
            id: user_id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            created_at: Some(OffsetDateTime::now_utc().unix_timestamp()),
        };
        self.transact(|contents| {
            contents.users.retain(|user| user.id != user_profile.id);
            contents.users.push(user_profile);
            Ok(())
        })?;
        log::info!("Registered the user {}", user_id);

        Ok(())
    }

    fn get_user_profile(&self, user_id: &str) -> Option<UserProfile> {
        self.contents
            .users
            .iter()
            .find(|user| user.id == user_id)
            .cloned()
    }

    fn search_user_by_email(&self, email: &str) -> Option<UserProfile> {
        self.contents
            .users
            .iter()
            .find(|user| user.email == email)
            .cloned()
    }
}
