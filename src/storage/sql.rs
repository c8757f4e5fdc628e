//! Relational Record Store
//! Mission: Serve the collections from pooled SQLite with engine-assigned ids
//!
//! Each operation is a single autocommitted statement. Deleting a patient
//! cascades to its appointments; deleting a doctor nulls the reference.
//!
//! Numeric and date filters narrow the query in SQL. Text filters run on
//! the fetched rows through [`RecordFilter::matches`], because SQLite's
//! `lower()` only folds ASCII.

use crate::config::PoolSettings;
use crate::models::{Appointment, AppointmentFilter, Doctor, DoctorFilter, Patient, PatientFilter};
use crate::storage::{Collection, Record, RecordFilter, RecordStore, StoreError};
use async_trait::async_trait;
use sqlx::query_builder::Separated;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: [&str; 3] = [
    r#"
CREATE TABLE IF NOT EXISTS doctors (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name     TEXT NOT NULL,
    last_name      TEXT NOT NULL,
    specialization TEXT NOT NULL,
    experience     INTEGER NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS patients (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name  TEXT NOT NULL,
    age        INTEGER NOT NULL,
    diagnosis  TEXT NOT NULL DEFAULT ''
)"#,
    r#"
CREATE TABLE IF NOT EXISTS appointments (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    doctor_id  INTEGER REFERENCES doctors(id) ON DELETE SET NULL,
    date       TEXT NOT NULL,
    time       TEXT NOT NULL,
    status     TEXT NOT NULL
)"#,
];

/// Pooled SQLite store
#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Connect the pool and make sure the schema exists.
    pub async fn connect(settings: &PoolSettings) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&settings.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .idle_timeout(settings.max_idle)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await?;

        info!(
            "🗄️  Connected to {} (max {} connections)",
            settings.url, settings.max_connections
        );

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!("Schema ready");
        Ok(())
    }
}

/// Foreign-key failures are the caller's fault; everything else is internal.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() {
            return StoreError::InvalidReference(
                "referenced patient or doctor does not exist".to_string(),
            );
        }
    }
    StoreError::Database(err)
}

/// Appends `WHERE`/`AND` as predicates are added.
pub struct Conditions<'q, 'args> {
    builder: &'q mut QueryBuilder<'args, Sqlite>,
    any: bool,
}

impl<'q, 'args> Conditions<'q, 'args> {
    fn new(builder: &'q mut QueryBuilder<'args, Sqlite>) -> Self {
        Self {
            builder,
            any: false,
        }
    }

    fn next(&mut self) -> &mut QueryBuilder<'args, Sqlite> {
        self.builder.push(if self.any { " AND " } else { " WHERE " });
        self.any = true;
        self.builder
    }

    fn compare<T>(&mut self, column: &str, op: &str, value: &Option<T>)
    where
        T: Clone + Send + 'args + sqlx::Encode<'args, Sqlite> + sqlx::Type<Sqlite>,
    {
        if let Some(value) = value {
            self.next()
                .push(format!("{column} {op} "))
                .push_bind(value.clone());
        }
    }
}

/// How a record maps onto its table.
pub trait SqlRecord: Record + for<'r> FromRow<'r, SqliteRow> {
    const TABLE: &'static str;
    /// Mutable columns in bind order (the id is never written).
    const COLUMNS: &'static [&'static str];

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>);

    /// Push the filter's numeric and date predicates.
    fn push_filter(filter: &Self::Filter, conditions: &mut Conditions<'_, '_>);

    fn select() -> String {
        format!("SELECT id, {} FROM {}", Self::COLUMNS.join(", "), Self::TABLE)
    }
}

impl SqlRecord for Patient {
    const TABLE: &'static str = "patients";
    const COLUMNS: &'static [&'static str] = &["first_name", "last_name", "age", "diagnosis"];

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.first_name.clone())
            .push_bind(self.last_name.clone())
            .push_bind(self.age)
            .push_bind(self.diagnosis.clone());
    }

    fn push_filter(filter: &PatientFilter, conditions: &mut Conditions<'_, '_>) {
        conditions.compare("age", "=", &filter.age);
        conditions.compare("age", ">=", &filter.min_age);
        conditions.compare("age", "<=", &filter.max_age);
    }
}

impl SqlRecord for Doctor {
    const TABLE: &'static str = "doctors";
    const COLUMNS: &'static [&'static str] =
        &["first_name", "last_name", "specialization", "experience"];

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.first_name.clone())
            .push_bind(self.last_name.clone())
            .push_bind(self.specialization.clone())
            .push_bind(self.experience);
    }

    fn push_filter(filter: &DoctorFilter, conditions: &mut Conditions<'_, '_>) {
        conditions.compare("experience", "=", &filter.experience);
        conditions.compare("experience", ">=", &filter.min_experience);
    }
}

impl SqlRecord for Appointment {
    const TABLE: &'static str = "appointments";
    const COLUMNS: &'static [&'static str] =
        &["patient_id", "doctor_id", "date", "time", "status"];

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.patient_id)
            .push_bind(self.doctor_id)
            .push_bind(self.date.clone())
            .push_bind(self.time.clone())
            .push_bind(self.status.clone());
    }

    fn push_filter(filter: &AppointmentFilter, conditions: &mut Conditions<'_, '_>) {
        conditions.compare("patient_id", "=", &filter.patient_id);
        conditions.compare("doctor_id", "=", &filter.doctor_id);
        conditions.compare("date", "=", &filter.date);
        conditions.compare("date", ">=", &filter.date_from);
        conditions.compare("date", "<=", &filter.date_to);
    }
}

#[async_trait]
impl<R: SqlRecord> Collection<R> for SqlStore {
    async fn list(&self, filter: &R::Filter) -> Result<Vec<R>, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(R::select());
        R::push_filter(filter, &mut Conditions::new(&mut query));
        query.push(" ORDER BY id");

        let rows = query.build_query_as::<R>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().filter(|r| filter.matches(r)).collect())
    }

    async fn get(&self, id: i64) -> Result<R, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(R::select());
        query.push(" WHERE id = ").push_bind(id);

        query
            .build_query_as::<R>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found::<R>(id))
    }

    async fn create(&self, mut record: R) -> Result<R, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            R::TABLE,
            R::COLUMNS.join(", ")
        ));
        record.push_values(&mut query.separated(", "));
        query.push(") RETURNING id");

        let id = query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        record.set_id(id);
        Ok(record)
    }

    async fn update(&self, id: i64, mut record: R) -> Result<R, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "UPDATE {} SET ({}) = (",
            R::TABLE,
            R::COLUMNS.join(", ")
        ));
        record.push_values(&mut query.separated(", "));
        query.push(") WHERE id = ").push_bind(id);

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found::<R>(id));
        }

        record.set_id(id);
        Ok(record)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", R::TABLE);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found::<R>(id));
        }
        Ok(())
    }
}

impl RecordStore for SqlStore {
    fn backend(&self) -> &'static str {
        "sql"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, Snapshot};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_store() -> (SqlStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let settings = PoolSettings {
            url: format!("sqlite://{}", dir.path().join("test.db").display()),
            max_connections: 4,
            min_connections: 1,
            max_idle: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(5),
        };
        let store = SqlStore::connect(&settings).await.unwrap();
        (store, dir)
    }

    fn patient(first: &str, age: i64, diagnosis: &str) -> Patient {
        Patient {
            id: 0,
            first_name: first.to_string(),
            last_name: "Koval".to_string(),
            age,
            diagnosis: diagnosis.to_string(),
        }
    }

    fn doctor(first: &str) -> Doctor {
        Doctor {
            id: 0,
            first_name: first.to_string(),
            last_name: "Bondar".to_string(),
            specialization: "Neurology".to_string(),
            experience: 8,
        }
    }

    fn appointment(patient_id: i64, doctor_id: Option<i64>) -> Appointment {
        Appointment {
            id: 0,
            patient_id,
            doctor_id,
            date: "2024-06-01".to_string(),
            time: "10:00".to_string(),
            status: "scheduled".to_string(),
        }
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let (store, _dir) = create_test_store().await;

        let created: Patient = store.create(patient("Ivan", 40, "Flu")).await.unwrap();
        assert!(created.id > 0);

        let fetched: Patient = store.get(created.id).await.unwrap();
        assert_eq!(fetched, created);

        let updated: Patient = store
            .update(created.id, patient("Ivan", 41, "Recovered"))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(Collection::<Patient>::get(&store, created.id).await.unwrap().age, 41);

        Collection::<Patient>::delete(&store, created.id).await.unwrap();
        let err = Collection::<Patient>::get(&store, created.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_absent_rows_are_not_found() {
        let (store, _dir) = create_test_store().await;

        assert!(store.update(42, doctor("Nobody")).await.unwrap_err().is_not_found());
        assert!(Collection::<Doctor>::delete(&store, 42).await.unwrap_err().is_not_found());
        assert!(Collection::<Appointment>::get(&store, 42).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_filters_narrow_listing() {
        let (store, _dir) = create_test_store().await;
        for (name, age, diagnosis) in [
            ("Ivan", 40, "Seasonal flu"),
            ("Olga", 35, "Migraine"),
            ("Ivanna", 40, "Asthma"),
        ] {
            let _: Patient = store.create(patient(name, age, diagnosis)).await.unwrap();
        }

        let forty: Vec<Patient> = store
            .list(&PatientFilter {
                age: Some(40),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = forty.iter().map(|p| p.first_name.as_str()).collect();
        assert_eq!(names, ["Ivan", "Ivanna"]);

        let flu: Vec<Patient> = store
            .list(&PatientFilter {
                diagnosis: Some("FLU".to_string()),
                first_name: Some("iv".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(flu.len(), 1);

        let nobody: Vec<Patient> = store
            .list(&PatientFilter {
                min_age: Some(90),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(nobody.is_empty());
    }

    #[tokio::test]
    async fn test_deleting_patient_cascades_to_appointments() {
        let (store, _dir) = create_test_store().await;
        let p: Patient = store.create(patient("Ivan", 40, "")).await.unwrap();
        let d: Doctor = store.create(doctor("Olena")).await.unwrap();
        let a: Appointment = store.create(appointment(p.id, Some(d.id))).await.unwrap();

        Collection::<Patient>::delete(&store, p.id).await.unwrap();

        let err = Collection::<Appointment>::get(&store, a.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_deleting_doctor_nulls_reference() {
        let (store, _dir) = create_test_store().await;
        let p: Patient = store.create(patient("Ivan", 40, "")).await.unwrap();
        let d: Doctor = store.create(doctor("Olena")).await.unwrap();
        let a: Appointment = store.create(appointment(p.id, Some(d.id))).await.unwrap();

        Collection::<Doctor>::delete(&store, d.id).await.unwrap();

        let orphaned: Appointment = store.get(a.id).await.unwrap();
        assert_eq!(orphaned.doctor_id, None);
        assert_eq!(orphaned.patient_id, p.id);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_rejected() {
        let (store, _dir) = create_test_store().await;

        let err = store.create(appointment(999, None)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let (store, _dir) = create_test_store().await;
        let _: Doctor = store.create(doctor("A")).await.unwrap();
        let b: Doctor = store.create(doctor("B")).await.unwrap();
        Collection::<Doctor>::delete(&store, b.id).await.unwrap();

        let c: Doctor = store.create(doctor("C")).await.unwrap();
        assert!(c.id > b.id);
    }

    async fn names<S: Collection<Patient>>(store: &S, filter: PatientFilter) -> Vec<String> {
        store
            .list(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.first_name)
            .collect()
    }

    #[tokio::test]
    async fn test_non_ascii_filters_agree_with_memory_store() {
        let (sql, _dir) = create_test_store().await;
        let memory = MemoryStore::ephemeral(Snapshot::default());

        for (name, age, diagnosis) in [
            ("Олег", 40, "Грип"),
            ("ОЛЕГА", 35, "грип сезонний"),
            ("Ольга", 40, "Мігрень"),
            ("Oleg", 52, "ГРИП"),
        ] {
            let _: Patient = sql.create(patient(name, age, diagnosis)).await.unwrap();
            let _: Patient = memory.create(patient(name, age, diagnosis)).await.unwrap();
        }

        let filters = [
            PatientFilter {
                first_name: Some("олег".to_string()),
                ..Default::default()
            },
            PatientFilter {
                diagnosis: Some("ГРИП".to_string()),
                ..Default::default()
            },
            PatientFilter {
                diagnosis: Some("грип".to_string()),
                age: Some(40),
                ..Default::default()
            },
            PatientFilter {
                last_name: Some("KOVAL".to_string()),
                min_age: Some(36),
                ..Default::default()
            },
        ];
        let oleg = names(&sql, filters[0].clone()).await;
        assert_eq!(oleg, ["Олег", "ОЛЕГА"]);

        for filter in filters {
            let expected = names(&memory, filter.clone()).await;
            assert!(!expected.is_empty());
            assert_eq!(names(&sql, filter).await, expected);
        }

        let p: Patient = sql.create(patient("Ivan", 30, "")).await.unwrap();
        let mp: Patient = memory.create(patient("Ivan", 30, "")).await.unwrap();
        let mut cancelled = appointment(p.id, None);
        cancelled.status = "СКАСОВАНО".to_string();
        let _: Appointment = sql.create(cancelled.clone()).await.unwrap();
        cancelled.patient_id = mp.id;
        let _: Appointment = memory.create(cancelled).await.unwrap();

        let status = AppointmentFilter {
            status: Some("скасовано".to_string()),
            ..Default::default()
        };
        let from_sql: Vec<Appointment> = sql.list(&status).await.unwrap();
        let from_memory: Vec<Appointment> = memory.list(&status).await.unwrap();
        assert_eq!(from_sql.len(), 1);
        assert_eq!(from_memory.len(), 1);
    }
}
