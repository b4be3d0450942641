//! Document store with session-based authentication.

use std::collections::BTreeMap;
use std::path::Path;

use geojson::{JsonObject, JsonValue};
use serde::Deserialize;

use super::{DataSource, SourceError};
use crate::feature::RawRecord;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("not signed in")]
    NotSignedIn,
    #[error("invalid collection or id: {collection}/{id}")]
    InvalidTarget { collection: String, id: String },
    #[error("record {collection}/{id} does not exist")]
    MissingRecord { collection: String, id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserAccount {
    pub email: String,
    pub password: String,
}

/// Signed-in user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub email: String,
}

/// On-disk seed of a store: accounts plus `collection -> id -> fields`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub users: Vec<UserAccount>,
    pub collections: BTreeMap<String, BTreeMap<String, JsonValue>>,
}

/// Document store held in memory. Reads are open; writes need a session.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Vec<UserAccount>,
    collections: BTreeMap<String, BTreeMap<String, JsonObject>>,
    session: Option<Session>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut store = Self {
            users: snapshot.users,
            ..Default::default()
        };
        for (collection, records) in snapshot.collections {
            let records = records
                .into_iter()
                .filter_map(|(id, value)| match value {
                    JsonValue::Object(fields) => Some((id, fields)),
                    _ => {
                        log::warn!("Ignoring non-object record {}/{}", collection, id);
                        None
                    }
                })
                .collect();
            store.collections.insert(collection, records);
        }
        store
    }

    pub fn from_snapshot_file(filepath: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(filepath)?;
        let snapshot: StoreSnapshot = serde_yaml::from_str(&contents)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, StoreError> {
        let account = self
            .users
            .iter()
            .find(|account| account.email == email && account.password == password)
            .ok_or(StoreError::InvalidCredentials)?;
        let session = Session {
            email: account.email.clone(),
        };
        log::info!("Signed in {}", session.email);
        self.session = Some(session.clone());
        Ok(session)
    }

    pub fn sign_out(&mut self) -> Result<(), StoreError> {
        match self.session.take() {
            Some(session) => {
                log::info!("Signed out {}", session.email);
                Ok(())
            }
            None => Err(StoreError::NotSignedIn),
        }
    }

    pub fn current_user(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Merges `fields` into an existing record.
    pub fn update_record(
        &mut self,
        collection: &str,
        id: &str,
        fields: JsonObject,
    ) -> Result<(), StoreError> {
        self.require_session()?;
        if collection.is_empty() || id.is_empty() {
            return Err(StoreError::InvalidTarget {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        let record = self
            .collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::MissingRecord {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        record.extend(fields);
        log::info!("Updated {}/{}", collection, id);
        Ok(())
    }

    /// Creates a record under a generated id and returns that id.
    pub fn add_record(&mut self, collection: &str, fields: JsonObject) -> Result<String, StoreError> {
        self.require_session()?;
        if collection.is_empty() {
            return Err(StoreError::InvalidTarget {
                collection: collection.to_string(),
                id: String::new(),
            });
        }
        let records = self.collections.entry(collection.to_string()).or_default();
        let id = loop {
            self.next_id += 1;
            let candidate = format!("{}_{}", collection, self.next_id);
            if !records.contains_key(&candidate) {
                break candidate;
            }
        };
        records.insert(id.clone(), fields);
        log::info!("Added new feature to {} with ID: {}", collection, id);
        Ok(id)
    }

    fn require_session(&self) -> Result<&Session, StoreError> {
        self.session.as_ref().ok_or(StoreError::NotSignedIn)
    }
}

impl DataSource for MemoryStore {
    fn fetch_collection(&self, collection: &str) -> Result<Vec<RawRecord>, SourceError> {
        let records = self
            .collections
            .get(collection)
            .ok_or_else(|| SourceError::NotFound(collection.to_string()))?;
        Ok(records
            .iter()
            .map(|(id, fields)| RawRecord::new(id.clone(), fields.clone()))
            .collect())
    }
}
