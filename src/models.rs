//! Hospital Record Models
//! Mission: Define patient, doctor and appointment records and how they are queried

use crate::storage::{Record, RecordFilter};
use chrono::{NaiveDate, NaiveTime};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Patient record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Patient {
    #[serde(default)]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    #[serde(default)]
    pub diagnosis: String,
}

/// Doctor record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Doctor {
    #[serde(default)]
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub specialization: String,
    pub experience: i64,
}

/// Appointment between a patient and (optionally) a doctor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    #[serde(default)]
    pub id: i64,
    pub patient_id: i64,
    /// Null once the referenced doctor has been removed (relational backing).
    #[serde(default)]
    pub doctor_id: Option<i64>,
    pub date: String, // YYYY-MM-DD
    pub time: String, // HH:MM or HH:MM:SS
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "scheduled".to_string()
}

/// Query filter for `GET /patients`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub diagnosis: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub age: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_age: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub max_age: Option<i64>,
}

/// Query filter for `GET /doctors`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub specialization: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub experience: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub min_experience: Option<i64>,
}

/// Query filter for `GET /appointments`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub patient_id: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub doctor_id: Option<i64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub date_from: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub date_to: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<String>,
}

/// Treat `?age=` the same as an absent parameter; reject unparsable values.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// Unicode case folding shared by every backing's text filters.
fn fold(text: &str) -> String {
    text.to_lowercase()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    fold(haystack).contains(&fold(needle))
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is required"));
    }
    Ok(())
}

impl Record for Patient {
    type Filter = PatientFilter;
    const LABEL: &'static str = "Patient";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), String> {
        require_text("first_name", &self.first_name)?;
        require_text("last_name", &self.last_name)?;
        if !(0..=150).contains(&self.age) {
            return Err("age must be between 0 and 150".to_string());
        }
        Ok(())
    }
}

impl RecordFilter<Patient> for PatientFilter {
    fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.diagnosis.is_none()
            && self.age.is_none()
            && self.min_age.is_none()
            && self.max_age.is_none()
    }

    fn matches(&self, p: &Patient) -> bool {
        self.first_name
            .as_deref()
            .map_or(true, |v| contains_ignore_case(&p.first_name, v))
            && self
                .last_name
                .as_deref()
                .map_or(true, |v| contains_ignore_case(&p.last_name, v))
            && self
                .diagnosis
                .as_deref()
                .map_or(true, |v| contains_ignore_case(&p.diagnosis, v))
            && self.age.map_or(true, |v| p.age == v)
            && self.min_age.map_or(true, |v| p.age >= v)
            && self.max_age.map_or(true, |v| p.age <= v)
    }
}

impl Record for Doctor {
    type Filter = DoctorFilter;
    const LABEL: &'static str = "Doctor";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), String> {
        require_text("first_name", &self.first_name)?;
        require_text("last_name", &self.last_name)?;
        require_text("specialization", &self.specialization)?;
        if self.experience < 0 {
            return Err("experience cannot be negative".to_string());
        }
        Ok(())
    }
}

impl RecordFilter<Doctor> for DoctorFilter {
    fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.specialization.is_none()
            && self.experience.is_none()
            && self.min_experience.is_none()
    }

    fn matches(&self, d: &Doctor) -> bool {
        self.first_name
            .as_deref()
            .map_or(true, |v| contains_ignore_case(&d.first_name, v))
            && self
                .last_name
                .as_deref()
                .map_or(true, |v| contains_ignore_case(&d.last_name, v))
            && self
                .specialization
                .as_deref()
                .map_or(true, |v| contains_ignore_case(&d.specialization, v))
            && self.experience.map_or(true, |v| d.experience == v)
            && self.min_experience.map_or(true, |v| d.experience >= v)
    }
}

impl Record for Appointment {
    type Filter = AppointmentFilter;
    const LABEL: &'static str = "Appointment";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), String> {
        if self.patient_id <= 0 {
            return Err("patient_id must be a positive id".to_string());
        }
        if matches!(self.doctor_id, Some(id) if id <= 0) {
            return Err("doctor_id must be a positive id".to_string());
        }
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|_| "date must be formatted as YYYY-MM-DD".to_string())?;
        NaiveTime::parse_from_str(&self.time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&self.time, "%H:%M"))
            .map_err(|_| "time must be formatted as HH:MM or HH:MM:SS".to_string())?;
        require_text("status", &self.status)
    }
}

impl RecordFilter<Appointment> for AppointmentFilter {
    fn is_empty(&self) -> bool {
        self.patient_id.is_none()
            && self.doctor_id.is_none()
            && self.date.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.status.is_none()
    }

    // ISO dates compare correctly as strings, so the range checks stay lexical.
    fn matches(&self, a: &Appointment) -> bool {
        self.patient_id.map_or(true, |v| a.patient_id == v)
            && self.doctor_id.map_or(true, |v| a.doctor_id == Some(v))
            && self.date.as_deref().map_or(true, |v| a.date == v)
            && self
                .date_from
                .as_deref()
                .map_or(true, |v| a.date.as_str() >= v)
            && self.date_to.as_deref().map_or(true, |v| a.date.as_str() <= v)
            && self
                .status
                .as_deref()
                .map_or(true, |v| fold(&a.status) == fold(v))
    }
}
