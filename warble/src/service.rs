//! Warble handlers.
//!
//! Every handler is a short sequence of batch gets followed by puts. Nothing
//! spans those calls, so two handlers touching the same user may interleave
//! (a concurrent follow and profile read can observe one list updated and the
//! other not yet).

use async_trait::async_trait;
use kvstore::{Storage, StorageError};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info};

use crate::{
    api::{
        FollowReply, FollowRequest, ProfileReply, ProfileRequest, ReadReply, ReadRequest,
        RegisterUserReply, RegisterUserRequest, StreamReply, StreamRequest, Timestamp,
        WarbleRecord, WarbleReply, WarbleRequest,
    },
    error::WarbleError,
    hashtag::hashtags,
    keys,
    list::IdList,
    payload::Payload,
};

/// Handlers the Func dispatcher can route events to.
///
/// Each takes the raw request payload plus the storage it should work
/// against, and returns the encoded reply.
#[async_trait]
pub trait Application: Send + Sync {
    async fn register_user(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError>;

    async fn warble_text(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError>;

    async fn follow(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError>;

    async fn read_thread(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError>;

    async fn read_profile(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError>;

    async fn stream(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WarbleService;

impl WarbleService {
    pub fn new() -> Self {
        Self
    }

    /// Creates the empty warble, follower and following lists for `username`.
    ///
    /// A user whose warble list already exists is rejected and nothing is
    /// written.
    pub async fn register(
        &self,
        storage: &dyn Storage,
        username: &str,
    ) -> Result<(), WarbleError> {
        validate_username(username)?;

        let [existing] = fetch(storage, [keys::user_warbles(username)]).await?;
        if existing.is_some() {
            return Err(WarbleError::AlreadyExists(format!("user {username}")));
        }

        // The warble list marks the user as registered; it is written last.
        let empty = IdList::new().encode();
        for key in [
            keys::user_followers(username),
            keys::user_followings(username),
            keys::user_warbles(username),
        ] {
            storage.put(&key, &empty).await?;
        }

        info!(%username, "registered user");
        Ok(())
    }

    /// Records that `username` follows `to_follow`. Both must be registered.
    ///
    /// Following someone twice leaves both lists unchanged.
    pub async fn add_follow(
        &self,
        storage: &dyn Storage,
        username: &str,
        to_follow: &str,
    ) -> Result<(), WarbleError> {
        let followings_key = keys::user_followings(username);
        let followers_key = keys::user_followers(to_follow);
        let [followings, followers] =
            fetch(storage, [followings_key.clone(), followers_key.clone()]).await?;

        let Some(followings) = followings else {
            return Err(WarbleError::NotFound(format!("user {username}")));
        };
        let Some(followers) = followers else {
            return Err(WarbleError::NotFound(format!("user {to_follow}")));
        };

        let mut followings = IdList::decode(&followings);
        if followings.push_unique(to_follow) {
            storage.put(&followings_key, &followings.encode()).await?;
        }
        let mut followers = IdList::decode(&followers);
        if followers.push_unique(username) {
            storage.put(&followers_key, &followers.encode()).await?;
        }

        info!(%username, %to_follow, "follow recorded");
        Ok(())
    }

    pub async fn profile(
        &self,
        storage: &dyn Storage,
        username: &str,
    ) -> Result<ProfileReply, WarbleError> {
        let [followings, followers] = fetch(
            storage,
            [keys::user_followings(username), keys::user_followers(username)],
        )
        .await?;

        match (followings, followers) {
            (Some(followings), Some(followers)) => Ok(ProfileReply {
                followers: IdList::decode(&followers).into_vec(),
                following: IdList::decode(&followings).into_vec(),
            }),
            _ => Err(WarbleError::NotFound(format!("user {username}"))),
        }
    }

    /// Posts a warble, optionally as a reply, and indexes its hashtags.
    ///
    /// Writes the record first, then the user's list, the parent's thread and
    /// finally each hashtag list.
    pub async fn post_warble(
        &self,
        storage: &dyn Storage,
        request: WarbleRequest,
    ) -> Result<WarbleRecord, WarbleError> {
        let WarbleRequest {
            username,
            text,
            parent_id,
        } = request;

        if let Some(parent) = &parent_id {
            check_warble_id(parent)?;
        }

        let user_key = keys::user_warbles(&username);
        let mut id = fresh_id();
        let mut wanted = vec![user_key.clone(), keys::warble(&id)];
        if let Some(parent) = &parent_id {
            wanted.push(keys::warble(parent));
            wanted.push(keys::warble_thread(parent));
        }
        let mut values = fetch_all(storage, &wanted).await?.into_iter();

        let Some(user_warbles) = values.next().flatten() else {
            return Err(WarbleError::NotFound(format!("user {username}")));
        };
        let mut id_taken = values.next().flatten().is_some();
        let parent_thread = match &parent_id {
            Some(parent) => {
                let record = values.next().flatten();
                let thread = values.next().flatten();
                if record.is_none() {
                    return Err(WarbleError::NotFound(format!("warble {parent}")));
                }
                Some((
                    keys::warble_thread(parent),
                    IdList::decode(thread.as_deref().unwrap_or_default()),
                ))
            }
            None => None,
        };

        while id_taken {
            debug!(%id, "warble id collision, drawing another");
            id = fresh_id();
            let [existing] = fetch(storage, [keys::warble(&id)]).await?;
            id_taken = existing.is_some();
        }

        let record = WarbleRecord {
            id: id.clone(),
            username,
            text,
            parent_id,
            timestamp: Timestamp::now(),
        };
        let record_key = keys::warble(&id);
        let encoded = record.encode().map_err(|err| WarbleError::Corrupt {
            key: record_key.clone(),
            reason: err.to_string(),
        })?;
        storage.put(&record_key, &encoded).await?;

        let mut user_warbles = IdList::decode(&user_warbles);
        user_warbles.push(id.as_str());
        storage.put(&user_key, &user_warbles.encode()).await?;

        if let Some((thread_key, mut thread)) = parent_thread {
            thread.push(id.as_str());
            storage.put(&thread_key, &thread.encode()).await?;
        }

        let tag_keys: Vec<String> = hashtags(&record.text)
            .into_iter()
            .map(keys::hashtag)
            .collect();
        if !tag_keys.is_empty() {
            let lists = fetch_all(storage, &tag_keys).await?;
            for (key, list) in tag_keys.iter().zip(lists) {
                let mut list = IdList::decode(list.as_deref().unwrap_or_default());
                list.push(id.as_str());
                storage.put(key, &list.encode()).await?;
            }
        }

        info!(
            id = %record.id,
            username = %record.username,
            reply_to = ?record.parent_id,
            hashtags = tag_keys.len(),
            "warble posted"
        );
        Ok(record)
    }

    /// Returns warble `warble_id` followed by its replies in thread order.
    ///
    /// Thread entries whose record is missing are skipped.
    pub async fn thread(
        &self,
        storage: &dyn Storage,
        warble_id: &str,
    ) -> Result<Vec<WarbleRecord>, WarbleError> {
        check_warble_id(warble_id)?;
        let start_key = keys::warble(warble_id);
        let [start, thread] =
            fetch(storage, [start_key.clone(), keys::warble_thread(warble_id)]).await?;
        let Some(start) = start else {
            return Err(WarbleError::NotFound(format!("warble {warble_id}")));
        };

        let mut warbles = vec![decode_record(&start_key, &start)?];
        let replies = IdList::decode(thread.as_deref().unwrap_or_default());
        warbles.extend(load_records(storage, replies.iter()).await?);
        Ok(warbles)
    }

    /// Returns the warbles tagged `hashtag` posted strictly after `since`.
    ///
    /// Results keep the order ids were appended to the hashtag list; they are
    /// not re-sorted by timestamp.
    pub async fn stream_since(
        &self,
        storage: &dyn Storage,
        hashtag: &str,
        since: Timestamp,
    ) -> Result<Vec<WarbleRecord>, WarbleError> {
        let [ids] = fetch(storage, [keys::hashtag(hashtag)]).await?;
        let Some(ids) = ids else {
            return Err(WarbleError::NotFound(format!("hashtag {hashtag}")));
        };

        let ids = IdList::decode(&ids);
        let warbles = load_records(storage, ids.iter())
            .await?
            .into_iter()
            .filter(|warble| warble.timestamp > since)
            .collect();
        Ok(warbles)
    }
}

#[async_trait]
impl Application for WarbleService {
    async fn register_user(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError> {
        let request: RegisterUserRequest = decode_request(payload)?;
        self.register(storage, &request.username).await?;
        encode_reply(&RegisterUserReply {})
    }

    async fn warble_text(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError> {
        let request: WarbleRequest = decode_request(payload)?;
        let warble = self.post_warble(storage, request).await?;
        encode_reply(&WarbleReply { warble })
    }

    async fn follow(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError> {
        let request: FollowRequest = decode_request(payload)?;
        self.add_follow(storage, &request.username, &request.to_follow)
            .await?;
        encode_reply(&FollowReply {})
    }

    async fn read_thread(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError> {
        let request: ReadRequest = decode_request(payload)?;
        let warbles = self.thread(storage, &request.warble_id).await?;
        encode_reply(&ReadReply { warbles })
    }

    async fn read_profile(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError> {
        let request: ProfileRequest = decode_request(payload)?;
        let reply = self.profile(storage, &request.username).await?;
        encode_reply(&reply)
    }

    async fn stream(
        &self,
        payload: &Payload,
        storage: &dyn Storage,
    ) -> Result<Payload, WarbleError> {
        let request: StreamRequest = decode_request(payload)?;
        let warbles = self
            .stream_since(storage, &request.hashtag, request.since)
            .await?;
        encode_reply(&StreamReply { warbles })
    }
}

fn validate_username(username: &str) -> Result<(), WarbleError> {
    if username.is_empty() {
        return Err(WarbleError::MalformedPayload(
            "username cannot be empty".to_string(),
        ));
    }
    if username.contains(',') {
        return Err(WarbleError::MalformedPayload(format!(
            "username {username:?} cannot contain ','"
        )));
    }
    Ok(())
}

/// Warble ids are decimal `u32`s. Any other string names no warble, and
/// would otherwise reach into another key family (`warble_thread_...`).
fn check_warble_id(id: &str) -> Result<(), WarbleError> {
    match id.parse::<u32>() {
        Ok(_) => Ok(()),
        Err(_) => Err(WarbleError::NotFound(format!("warble {id}"))),
    }
}

fn fresh_id() -> String {
    rand::random::<u32>().to_string()
}

fn decode_request<T: DeserializeOwned>(payload: &Payload) -> Result<T, WarbleError> {
    payload
        .unpack()
        .map_err(|err| WarbleError::MalformedPayload(err.to_string()))
}

fn encode_reply<T: Serialize>(reply: &T) -> Result<Payload, WarbleError> {
    Payload::pack(reply).map_err(|err| WarbleError::MalformedPayload(err.to_string()))
}

fn decode_record(key: &str, raw: &str) -> Result<WarbleRecord, WarbleError> {
    WarbleRecord::decode(raw).map_err(|err| WarbleError::Corrupt {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

/// Batch get that insists on one answer per key.
async fn fetch_all(
    storage: &dyn Storage,
    keys: &[String],
) -> Result<Vec<Option<String>>, WarbleError> {
    let values = storage.get(keys).await?;
    if values.len() != keys.len() {
        return Err(StorageError::Protocol(format!(
            "asked for {} keys, got {} values",
            keys.len(),
            values.len()
        ))
        .into());
    }
    Ok(values)
}

async fn fetch<const N: usize>(
    storage: &dyn Storage,
    keys: [String; N],
) -> Result<[Option<String>; N], WarbleError> {
    let values = fetch_all(storage, &keys).await?;
    values.try_into().map_err(|values: Vec<Option<String>>| {
        StorageError::Protocol(format!("asked for {N} keys, got {} values", values.len())).into()
    })
}

/// Loads the records for `ids`, skipping ids with no stored record.
async fn load_records<'a>(
    storage: &dyn Storage,
    ids: impl Iterator<Item = &'a str>,
) -> Result<Vec<WarbleRecord>, WarbleError> {
    let record_keys: Vec<String> = ids.map(keys::warble).collect();
    if record_keys.is_empty() {
        return Ok(Vec::new());
    }

    let values = fetch_all(storage, &record_keys).await?;
    let mut records = Vec::with_capacity(values.len());
    for (key, value) in record_keys.iter().zip(values) {
        match value {
            Some(raw) => records.push(decode_record(key, &raw)?),
            None => debug!(%key, "skipping listed warble with no record"),
        }
    }
    Ok(records)
}
