//! Durable storage for obstacles and food.
//!
//! The in-memory world is authoritative. Every mutation is mirrored to a
//! [`WorldStore`] through a [`PersistenceWorker`], a background thread fed by
//! a channel, so the tick loop never waits on storage. Write failures are
//! logged and otherwise ignored; only the initial `load_all` is fatal.
//!
//! Two stores ship with the crate:
//! - [`FileStore`]: a versioned bincode snapshot rewritten on each mutation
//! - [`MemoryStore`]: shared in-process maps, for tests and ephemeral runs

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use plaza_logic::collision::{Dimensions, Vec3};
use plaza_logic::furniture::FurnitureKind;

/// Version number for the snapshot file format (increment when format changes)
const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleRecord {
    pub id: String,
    pub position: Vec3,
    pub dimensions: Dimensions,
    pub model: String,
    pub scale: f32,
    pub rotation: f32,
    pub passthrough: bool,
    pub kind: FurnitureKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodRecord {
    pub id: String,
    pub position: Vec3,
    pub dimensions: Dimensions,
    pub scale: f32,
    pub model: String,
}

/// Everything a store holds, as returned by `load_all`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredWorld {
    pub obstacles: Vec<ObstacleRecord>,
    pub food: Vec<FoodRecord>,
}

/// Upsert/delete/load-all keyed by entity id.
pub trait WorldStore: Send {
    fn upsert_obstacle(&mut self, record: &ObstacleRecord) -> Result<(), StoreError>;
    fn delete_obstacle(&mut self, id: &str) -> Result<(), StoreError>;
    fn upsert_food(&mut self, record: &FoodRecord) -> Result<(), StoreError>;
    fn delete_food(&mut self, id: &str) -> Result<(), StoreError>;
    fn load_all(&mut self) -> Result<StoredWorld, StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Bincode(Box<bincode::ErrorKind>),
    VersionMismatch { expected: u32, found: u32 },
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for StoreError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        StoreError::Bincode(e)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Bincode(e) => write!(f, "Serialization error: {}", e),
            StoreError::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Store version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            StoreError::Unavailable(why) => write!(f, "Store unavailable: {}", why),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Default)]
struct Tables {
    obstacles: BTreeMap<String, ObstacleRecord>,
    food: BTreeMap<String, FoodRecord>,
}

impl Tables {
    fn from_stored(stored: StoredWorld) -> Self {
        Self {
            obstacles: stored
                .obstacles
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
            food: stored.food.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    fn to_stored(&self) -> StoredWorld {
        StoredWorld {
            obstacles: self.obstacles.values().cloned().collect(),
            food: self.food.values().cloned().collect(),
        }
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    tables: Tables,
    fail_writes: bool,
    fail_loads: bool,
}

/// In-process store. Clones share the same tables, so a test can keep a
/// handle while the worker thread owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(stored: StoredWorld) -> Self {
        let store = Self::new();
        store.lock().tables = Tables::from_stored(stored);
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make `load_all` fail, as an unreachable store would.
    pub fn set_fail_loads(&self, fail: bool) {
        self.lock().fail_loads = fail;
    }

    pub fn contents(&self) -> StoredWorld {
        self.lock().tables.to_stored()
    }

    fn write(&self, f: impl FnOnce(&mut Tables)) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        f(&mut state.tables);
        Ok(())
    }
}

impl WorldStore for MemoryStore {
    fn upsert_obstacle(&mut self, record: &ObstacleRecord) -> Result<(), StoreError> {
        self.write(|t| {
            t.obstacles.insert(record.id.clone(), record.clone());
        })
    }

    fn delete_obstacle(&mut self, id: &str) -> Result<(), StoreError> {
        self.write(|t| {
            t.obstacles.remove(id);
        })
    }

    fn upsert_food(&mut self, record: &FoodRecord) -> Result<(), StoreError> {
        self.write(|t| {
            t.food.insert(record.id.clone(), record.clone());
        })
    }

    fn delete_food(&mut self, id: &str) -> Result<(), StoreError> {
        self.write(|t| {
            t.food.remove(id);
        })
    }

    fn load_all(&mut self) -> Result<StoredWorld, StoreError> {
        let state = self.lock();
        if state.fail_loads {
            return Err(StoreError::Unavailable("store unreachable".into()));
        }
        Ok(state.tables.to_stored())
    }
}

// ============================================================================
// FILE STORE
// ============================================================================

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    world: StoredWorld,
}

/// Versioned bincode snapshot on disk, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    tables: Tables,
}

impl FileStore {
    /// Open `path`, loading it when it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = if path.exists() {
            Tables::from_stored(read_snapshot(&path)?)
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            Tables::default()
        };
        Ok(Self { path, tables })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            let snapshot = SnapshotFile {
                version: STORE_VERSION,
                world: self.tables.to_stored(),
            };
            bincode::serialize_into(&mut writer, &snapshot)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> Result<StoredWorld, StoreError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let snapshot: SnapshotFile = bincode::deserialize_from(reader)?;
    if snapshot.version != STORE_VERSION {
        return Err(StoreError::VersionMismatch {
            expected: STORE_VERSION,
            found: snapshot.version,
        });
    }
    Ok(snapshot.world)
}

impl WorldStore for FileStore {
    fn upsert_obstacle(&mut self, record: &ObstacleRecord) -> Result<(), StoreError> {
        self.tables
            .obstacles
            .insert(record.id.clone(), record.clone());
        self.persist()
    }

    fn delete_obstacle(&mut self, id: &str) -> Result<(), StoreError> {
        if self.tables.obstacles.remove(id).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn upsert_food(&mut self, record: &FoodRecord) -> Result<(), StoreError> {
        self.tables.food.insert(record.id.clone(), record.clone());
        self.persist()
    }

    fn delete_food(&mut self, id: &str) -> Result<(), StoreError> {
        if self.tables.food.remove(id).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn load_all(&mut self) -> Result<StoredWorld, StoreError> {
        Ok(self.tables.to_stored())
    }
}

// ============================================================================
// BACKGROUND WRITER
// ============================================================================

#[derive(Debug)]
pub enum StoreOp {
    UpsertObstacle(ObstacleRecord),
    DeleteObstacle(String),
    UpsertFood(FoodRecord),
    DeleteFood(String),
    /// Acknowledged once every earlier op has been applied.
    Flush(Sender<()>),
}

impl StoreOp {
    fn label(&self) -> String {
        match self {
            StoreOp::UpsertObstacle(r) => format!("upsert obstacle '{}'", r.id),
            StoreOp::DeleteObstacle(id) => format!("delete obstacle '{}'", id),
            StoreOp::UpsertFood(r) => format!("upsert food '{}'", r.id),
            StoreOp::DeleteFood(id) => format!("delete food '{}'", id),
            StoreOp::Flush(_) => "flush".to_string(),
        }
    }
}

fn apply(store: &mut dyn WorldStore, op: StoreOp) {
    let label = op.label();
    let result = match op {
        StoreOp::UpsertObstacle(r) => store.upsert_obstacle(&r),
        StoreOp::DeleteObstacle(id) => store.delete_obstacle(&id),
        StoreOp::UpsertFood(r) => store.upsert_food(&r),
        StoreOp::DeleteFood(id) => store.delete_food(&id),
        StoreOp::Flush(ack) => {
            let _ = ack.send(());
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("persistence: {} failed: {}", label, e);
    }
}

/// Owns a store on its own thread and applies ops in submission order.
pub struct PersistenceWorker {
    tx: Option<Sender<StoreOp>>,
    handle: Option<JoinHandle<()>>,
}

impl PersistenceWorker {
    pub fn spawn(mut store: Box<dyn WorldStore>) -> Result<Self, StoreError> {
        let (tx, rx) = mpsc::channel::<StoreOp>();
        let handle = std::thread::Builder::new()
            .name("plaza-persistence".into())
            .spawn(move || {
                for op in rx {
                    apply(store.as_mut(), op);
                }
                log::debug!("persistence worker stopped");
            })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue an op. Never blocks.
    pub fn submit(&self, op: StoreOp) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(mpsc::SendError(op)) = tx.send(op) {
            log::error!("persistence: worker gone, dropped {}", op.label());
        }
    }

    /// Block until every op submitted so far has been applied.
    pub fn flush(&self) -> bool {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.submit(StoreOp::Flush(ack_tx));
        ack_rx.recv().is_ok()
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("persistence worker panicked");
            }
        }
    }
}
