//! In-Process Record Store
//! Mission: Serve all three collections from memory with snapshot durability
//!
//! One `tokio::sync::RwLock` covers the whole store. Readers share it; a
//! mutation holds it exclusively while it stages the change on a copy,
//! writes the copy to disk (temp file, fsync, rename) and swaps it in. A
//! failed write leaves memory unchanged, so the served view never runs
//! ahead of the file.
//!
//! Mutations run on their own task. Dropping the caller (timeout, client
//! disconnect) does not interrupt a write between persist and publish.

use crate::models::{Appointment, Doctor, Patient};
use crate::storage::{Collection, Record, RecordFilter, RecordStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// On-disk layout: one array per collection plus the last id issued per collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub doctors: Vec<Doctor>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub sequences: Sequences,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Sequences {
    #[serde(default)]
    pub patients: i64,
    #[serde(default)]
    pub doctors: i64,
    #[serde(default)]
    pub appointments: i64,
}

impl Snapshot {
    /// Raise each sequence to at least the largest stored id (files written
    /// without `sequences`, or edited by hand).
    fn reconcile_sequences(&mut self) {
        fn max_id<R: Record>(rows: &[R]) -> i64 {
            rows.iter().map(Record::id).max().unwrap_or(0)
        }

        self.sequences.patients = self.sequences.patients.max(max_id(&self.patients));
        self.sequences.doctors = self.sequences.doctors.max(max_id(&self.doctors));
        self.sequences.appointments = self
            .sequences
            .appointments
            .max(max_id(&self.appointments));
    }
}

/// Maps a record type onto its collection and id sequence inside a [`Snapshot`].
pub trait SnapshotRecord: Record {
    fn rows(snapshot: &Snapshot) -> &Vec<Self>;
    fn rows_mut(snapshot: &mut Snapshot) -> &mut Vec<Self>;
    fn sequence(snapshot: &mut Snapshot) -> &mut i64;
}

impl SnapshotRecord for Patient {
    fn rows(snapshot: &Snapshot) -> &Vec<Self> {
        &snapshot.patients
    }
    fn rows_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.patients
    }
    fn sequence(snapshot: &mut Snapshot) -> &mut i64 {
        &mut snapshot.sequences.patients
    }
}

impl SnapshotRecord for Doctor {
    fn rows(snapshot: &Snapshot) -> &Vec<Self> {
        &snapshot.doctors
    }
    fn rows_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.doctors
    }
    fn sequence(snapshot: &mut Snapshot) -> &mut i64 {
        &mut snapshot.sequences.doctors
    }
}

impl SnapshotRecord for Appointment {
    fn rows(snapshot: &Snapshot) -> &Vec<Self> {
        &snapshot.appointments
    }
    fn rows_mut(snapshot: &mut Snapshot) -> &mut Vec<Self> {
        &mut snapshot.appointments
    }
    fn sequence(snapshot: &mut Snapshot) -> &mut i64 {
        &mut snapshot.sequences.appointments
    }
}

/// Snapshot-backed store
pub struct MemoryStore {
    path: Option<Arc<PathBuf>>,
    state: Arc<RwLock<Snapshot>>,
}

impl MemoryStore {
    /// Load the snapshot at `path`; a missing file starts an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let mut snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        snapshot.reconcile_sequences();

        info!(
            "📂 Snapshot loaded from {} ({} patients, {} doctors, {} appointments)",
            path.display(),
            snapshot.patients.len(),
            snapshot.doctors.len(),
            snapshot.appointments.len()
        );

        Ok(Self {
            path: Some(Arc::new(path)),
            state: Arc::new(RwLock::new(snapshot)),
        })
    }

    /// Store that never touches the filesystem.
    pub fn ephemeral(mut snapshot: Snapshot) -> Self {
        snapshot.reconcile_sequences();
        Self {
            path: None,
            state: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    /// Apply `change` as one critical section: stage, persist, then publish.
    async fn mutate<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Snapshot) -> Result<T, StoreError> + Send + 'static,
    {
        let state = self.state.clone();
        let path = self.path.clone();

        let task = tokio::spawn(async move {
            let mut current = state.write_owned().await;

            let mut staged = current.clone();
            let outcome = change(&mut staged)?;

            if let Some(path) = &path {
                persist(path, &staged).await?;
            }

            *current = staged;
            Ok(outcome)
        });

        task.await?
    }
}

async fn persist(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await?;

    debug!("Snapshot persisted to {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[async_trait]
impl<R: SnapshotRecord> Collection<R> for MemoryStore {
    async fn list(&self, filter: &R::Filter) -> Result<Vec<R>, StoreError> {
        let state = self.state.read().await;
        let rows = R::rows(&state);

        if filter.is_empty() {
            return Ok(rows.clone());
        }
        Ok(rows.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<R, StoreError> {
        let state = self.state.read().await;
        R::rows(&state)
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found::<R>(id))
    }

    async fn create(&self, mut record: R) -> Result<R, StoreError> {
        self.mutate(move |snapshot| {
            let sequence = R::sequence(snapshot);
            *sequence += 1;
            record.set_id(*sequence);

            R::rows_mut(snapshot).push(record.clone());
            Ok(record)
        })
        .await
    }

    async fn update(&self, id: i64, mut record: R) -> Result<R, StoreError> {
        self.mutate(move |snapshot| {
            let slot = R::rows_mut(snapshot)
                .iter_mut()
                .find(|r| r.id() == id)
                .ok_or_else(|| StoreError::not_found::<R>(id))?;

            record.set_id(id);
            *slot = record.clone();
            Ok(record)
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.mutate(move |snapshot| {
            let rows = R::rows_mut(snapshot);
            let index = rows
                .iter()
                .position(|r| r.id() == id)
                .ok_or_else(|| StoreError::not_found::<R>(id))?;

            rows.remove(index);
            Ok(())
        })
        .await
    }
}

impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentFilter, PatientFilter};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn patient(first: &str, age: i64) -> Patient {
        Patient {
            id: 0,
            first_name: first.to_string(),
            last_name: "Test".to_string(),
            age,
            diagnosis: String::new(),
        }
    }

    async fn create_test_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(dir.path().join("data.json")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let (store, _dir) = create_test_store().await;

        let created: Patient = store.create(patient("Ivan", 40)).await.unwrap();
        assert_eq!(created.id, 1);

        let fetched: Patient = store.get(1).await.unwrap();
        assert_eq!(fetched, created);

        let mut changed = patient("Ivan", 41);
        changed.id = 99; // ignored
        let updated: Patient = store.update(1, changed).await.unwrap();
        assert_eq!(updated.id, 1);
        assert_eq!(updated.age, 41);

        Collection::<Patient>::delete(&store, 1).await.unwrap();
        let missing = Collection::<Patient>::get(&store, 1).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let (store, _dir) = create_test_store().await;

        let err = Collection::<Doctor>::get(&store, 7).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "Doctor", id: 7 }));

        let err = store.update(7, patient("Nobody", 1)).await.unwrap_err();
        assert!(err.is_not_found());

        let err = Collection::<Appointment>::delete(&store, 7).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_ids_never_reused() {
        let (store, _dir) = create_test_store().await;

        let a: Patient = store.create(patient("A", 1)).await.unwrap();
        let b: Patient = store.create(patient("B", 2)).await.unwrap();
        Collection::<Patient>::delete(&store, b.id).await.unwrap();
        let c: Patient = store.create(patient("C", 3)).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(c.id, 3);

        // Sequences are independent per collection
        let doctor: Doctor = store
            .create(Doctor {
                id: 0,
                first_name: "Olena".to_string(),
                last_name: "Shevchenko".to_string(),
                specialization: "Cardiology".to_string(),
                experience: 12,
            })
            .await
            .unwrap();
        assert_eq!(doctor.id, 1);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        {
            let store = MemoryStore::open(&path).await.unwrap();
            let _: Patient = store.create(patient("A", 10)).await.unwrap();
            let _: Patient = store.create(patient("B", 20)).await.unwrap();
            Collection::<Patient>::delete(&store, 2).await.unwrap();
        }

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(raw["patients"].is_array());
        assert!(raw["doctors"].is_array());
        assert!(raw["appointments"].is_array());

        let reopened = MemoryStore::open(&path).await.unwrap();
        let all: Vec<Patient> = reopened.list(&PatientFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);

        // Deleted id 2 is not handed out again after a restart
        let next: Patient = reopened.create(patient("C", 30)).await.unwrap();
        assert_eq!(next.id, 3);
    }

    #[tokio::test]
    async fn test_sequences_derived_from_legacy_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r#"{"patients":[{"id":5,"first_name":"A","last_name":"B","age":3,"diagnosis":""}],
                "doctors":[],"appointments":[]}"#,
        )
        .unwrap();

        let store = MemoryStore::open(&path).await.unwrap();
        let next: Patient = store.create(patient("C", 30)).await.unwrap();
        assert_eq!(next.id, 6);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        // Parent directory does not exist, so every snapshot write fails
        let store = MemoryStore::open(dir.path().join("missing").join("data.json"))
            .await
            .unwrap();

        let err = store.create(patient("A", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        let all: Vec<Patient> = store.list(&PatientFilter::default()).await.unwrap();
        assert!(all.is_empty());
        assert_eq!(store.snapshot().await.sequences.patients, 0);
    }

    #[tokio::test]
    async fn test_list_filters_preserve_insertion_order() {
        let store = MemoryStore::ephemeral(Snapshot::default());
        for (name, age) in [("A", 40), ("B", 30), ("C", 40), ("D", 40)] {
            let _: Patient = store.create(patient(name, age)).await.unwrap();
        }

        let forty: Vec<Patient> = store
            .list(&PatientFilter {
                age: Some(40),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = forty.iter().map(|p| p.first_name.as_str()).collect();
        assert_eq!(names, ["A", "C", "D"]);

        let none: Vec<Appointment> = store
            .list(&AppointmentFilter {
                status: Some("cancelled".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_assign_distinct_ids() {
        let (store, _dir) = create_test_store().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let created: Patient = store.create(patient(&format!("P{i}"), i)).await.unwrap();
                    created.id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 50);

        let all: Vec<Patient> = store.list(&PatientFilter::default()).await.unwrap();
        assert_eq!(all.len(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_creates_keep_disk_and_memory_in_step() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = MemoryStore::open(&path).await.unwrap();
        let attempts = 60;

        for i in 0..attempts {
            let budget = std::time::Duration::from_micros(i as u64 * 5);
            let _ = tokio::time::timeout(budget, store.create(patient(&format!("P{i}"), 30))).await;
        }

        // Every create runs to completion even when its caller gave up.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            let count = store.snapshot().await.patients.len();
            if count == attempts || tokio::time::Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let memory = store.snapshot().await;
        let disk: Snapshot = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(memory.patients.len(), attempts);
        assert_eq!(disk.patients, memory.patients);
        assert_eq!(disk.sequences.patients, attempts as i64);

        let mut ids: Vec<i64> = memory.patients.iter().map(|p| p.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), attempts);
    }
}
