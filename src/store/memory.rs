//! In-memory work store with an optional JSON snapshot.
//!
//! When opened with a snapshot path the whole queue is rewritten to that
//! file after every successful save (write to a temporary sibling, then
//! rename), and reloaded on the next start. Without a path the store lives
//! only as long as the process.
//!
//! A snapshot has one writer at a time: `open` takes an exclusive lock on a
//! `<snapshot>.lock` sibling and holds it until the store is dropped. A
//! second store on the same path fails with [`StoreError::Locked`].

use super::WorkStore;
use crate::error::StoreError;
use crate::models::{Post, PostStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self as stdfs, TryLockError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    posts: BTreeMap<u64, Post>,
    by_url: HashMap<String, u64>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    posts: Vec<Post>,
}

impl State {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = State {
            next_id: snapshot.next_id,
            ..State::default()
        };
        for post in snapshot.posts {
            if let Some(id) = post.id {
                state.next_id = state.next_id.max(id + 1);
                state.by_url.insert(post.crawl_url.clone(), id);
                state.posts.insert(id, post);
            }
        }
        state.next_id = state.next_id.max(1);
        state
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            next_id: self.next_id,
            posts: self.posts.values().cloned().collect(),
        }
    }
}

/// Crawl queue held in memory, optionally mirrored to a JSON file.
#[derive(Debug)]
pub struct MemoryWorkStore {
    state: Mutex<State>,
    snapshot: Option<PathBuf>,
    // Released on drop.
    _lock: Option<stdfs::File>,
}

impl Default for MemoryWorkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkStore {
    /// A store that is never written to disk.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
            snapshot: None,
            _lock: None,
        }
    }

    /// Open a store mirrored to `path`, loading the existing snapshot if
    /// there is one.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let lock = lock_snapshot(&path)?;
        let state = match fs::read(&path).await {
            Ok(bytes) => State::from_snapshot(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State {
                next_id: 1,
                ..State::default()
            },
            Err(e) => return Err(e.into()),
        };
        info!(posts = state.posts.len(), "Opened work store");
        Ok(Self {
            state: Mutex::new(state),
            snapshot: Some(path),
            _lock: Some(lock),
        })
    }

    async fn persist(&self, state: &State) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let json = serde_json::to_vec(&state.to_snapshot())?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), posts = state.posts.len(), "Wrote store snapshot");
        Ok(())
    }
}

fn lock_snapshot(path: &Path) -> Result<stdfs::File, StoreError> {
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    let file = stdfs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(PathBuf::from(lock_path))?;
    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(TryLockError::WouldBlock) => Err(StoreError::Locked(path.display().to_string())),
        Err(TryLockError::Error(e)) => Err(e.into()),
    }
}

#[async_trait]
impl WorkStore for MemoryWorkStore {
    async fn find_by_crawl_url(&self, url: &str) -> Result<Option<Post>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_url
            .get(url)
            .and_then(|id| state.posts.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Post>, StoreError> {
        Ok(self.state.lock().await.posts.get(&id).cloned())
    }

    async fn save(&self, mut post: Post) -> Result<Post, StoreError> {
        let mut state = self.state.lock().await;

        match post.id {
            None => {
                if state.by_url.contains_key(&post.crawl_url) {
                    return Err(StoreError::DuplicateCrawlUrl(post.crawl_url));
                }
                let id = state.next_id;
                post.id = Some(id);
                state.next_id += 1;
                state.by_url.insert(post.crawl_url.clone(), id);
                state.posts.insert(id, post.clone());

                if let Err(e) = self.persist(&state).await {
                    state.posts.remove(&id);
                    state.by_url.remove(&post.crawl_url);
                    state.next_id -= 1;
                    return Err(e);
                }
            }
            Some(id) => {
                let previous = state.posts.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
                if previous.crawl_url != post.crawl_url {
                    if state.by_url.contains_key(&post.crawl_url) {
                        return Err(StoreError::DuplicateCrawlUrl(post.crawl_url));
                    }
                    state.by_url.remove(&previous.crawl_url);
                    state.by_url.insert(post.crawl_url.clone(), id);
                }
                state.posts.insert(id, post.clone());

                if let Err(e) = self.persist(&state).await {
                    state.by_url.remove(&post.crawl_url);
                    state.by_url.insert(previous.crawl_url.clone(), id);
                    state.posts.insert(id, previous);
                    return Err(e);
                }
            }
        }

        Ok(post)
    }

    async fn find_by_status(
        &self,
        status: PostStatus,
        limit: usize,
        ascending: bool,
    ) -> Result<Vec<Post>, StoreError> {
        let state = self.state.lock().await;
        let matching = |p: &&Post| p.status == status;
        let posts: Vec<Post> = if ascending {
            state.posts.values().filter(matching).take(limit).cloned().collect()
        } else {
            state.posts.values().rev().filter(matching).take(limit).cloned().collect()
        };
        Ok(posts)
    }

    async fn count_by_status(&self, status: PostStatus) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state.posts.values().filter(|p| p.status == status).count())
    }
}
