// src/models/hospital.rs

//! Upstream facility records: hospitals, pharmacies and satellite rows.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::lenient;

/// One hospital as stored upstream. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Hospital {
    /// Internal store id, also the pagination sort key
    #[serde(rename = "_id", deserialize_with = "lenient::object_id")]
    pub id: String,

    /// Canonical facility identifier shared by all satellite collections
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub ykiho: Option<String>,

    #[serde(rename = "yadmNm", default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub addr: Option<String>,

    #[serde(rename = "sidoCd", default, deserialize_with = "lenient::opt_string")]
    pub region_code: Option<String>,

    #[serde(rename = "sidoCdNm", default, deserialize_with = "lenient::opt_string")]
    pub region_name: Option<String>,

    #[serde(rename = "clCd", default, deserialize_with = "lenient::opt_string")]
    pub category_code: Option<String>,

    #[serde(rename = "clCdNm", default, deserialize_with = "lenient::opt_string")]
    pub category_name: Option<String>,

    /// Latitude
    #[serde(rename = "YPos", default, deserialize_with = "lenient::opt_f64")]
    pub lat: Option<f64>,

    /// Longitude
    #[serde(rename = "XPos", default, deserialize_with = "lenient::opt_f64")]
    pub lon: Option<f64>,

    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub telno: Option<String>,

    #[serde(rename = "hospUrl", default, deserialize_with = "lenient::opt_string")]
    pub hosp_url: Option<String>,

    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub veteran_hospital: Option<bool>,
}

impl Hospital {
    /// Identifier the index document is keyed by.
    ///
    /// `ykiho` when it has non-blank content, otherwise the internal store
    /// id. Returned exactly as stored. `None` means the record cannot be
    /// indexed.
    pub fn document_id(&self) -> Option<&str> {
        self.satellite_key()
            .or_else(|| Some(self.id.as_str()).filter(|id| !id.trim().is_empty()))
    }

    /// Key used to look up satellite rows, exactly as stored.
    pub fn satellite_key(&self) -> Option<&str> {
        self.ykiho.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Coordinates when both are present and finite.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// A pharmacy, projected to the fields used for distance and display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Pharmacy {
    #[serde(rename = "_id", default, deserialize_with = "lenient::opt_object_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub yadm_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub cl_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub cl_cd_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub sido_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub sido_cd_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub sggu_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub sggu_cd_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub emdong_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub post_no: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub addr: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub telno: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub estb_dd: Option<String>,
    /// Latitude
    #[serde(rename = "Ypos", default, deserialize_with = "lenient::opt_f64")]
    pub lat: Option<f64>,
    /// Longitude
    #[serde(rename = "Xpos", default, deserialize_with = "lenient::opt_f64")]
    pub lon: Option<f64>,
}

impl Pharmacy {
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Satellite collections joined into a hospital document by `ykiho`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SatelliteKind {
    Subjects,
    Equipment,
    FoodTreatment,
    IntensiveCare,
    NursingGrade,
    Personnel,
    Speciality,
}

impl SatelliteKind {
    pub const ALL: [SatelliteKind; 7] = [
        SatelliteKind::Subjects,
        SatelliteKind::Equipment,
        SatelliteKind::FoodTreatment,
        SatelliteKind::IntensiveCare,
        SatelliteKind::NursingGrade,
        SatelliteKind::Personnel,
        SatelliteKind::Speciality,
    ];

    /// Upstream collection name.
    pub fn collection(&self) -> &'static str {
        match self {
            SatelliteKind::Subjects => "hospitalsubjects",
            SatelliteKind::Equipment => "hospital_equipment",
            SatelliteKind::FoodTreatment => "hospital_food_treatment_info",
            SatelliteKind::IntensiveCare => "hospital_intensive_care_info",
            SatelliteKind::NursingGrade => "hospital_nursing_grade",
            SatelliteKind::Personnel => "hospital_personnel_info",
            SatelliteKind::Speciality => "hospital_speciality_info",
        }
    }
}

impl fmt::Display for SatelliteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub dgsbjt_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub dgsbjt_cd_nm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRow {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub type_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub type_cd_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub type_cnt: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FoodTreatmentRow {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub type_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub type_cd_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub gen_meal_add_yn: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub psnl_cnt: Option<i64>,
}

/// Shared shape of the intensive-care and speciality rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TypeRow {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub type_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub type_cd_nm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NursingGradeRow {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub type_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub type_cd_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub nursing_rt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersonnelRow {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pharm_cd: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub pharm_cd_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub pharm_cnt: Option<i64>,
}

/// All satellite rows fetched for one hospital.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Satellites {
    pub subjects: Vec<SubjectRow>,
    pub equipment: Vec<EquipmentRow>,
    pub food_treatment: Vec<FoodTreatmentRow>,
    pub intensive_care: Vec<TypeRow>,
    pub nursing_grade: Vec<NursingGradeRow>,
    pub personnel: Vec<PersonnelRow>,
    pub speciality: Vec<TypeRow>,
}

impl Satellites {
    /// Project raw rows of `kind` into their typed shape.
    ///
    /// Rows that are not JSON objects are skipped.
    pub fn set(&mut self, kind: SatelliteKind, rows: Vec<Value>) {
        match kind {
            SatelliteKind::Subjects => self.subjects = project(rows),
            SatelliteKind::Equipment => self.equipment = project(rows),
            SatelliteKind::FoodTreatment => self.food_treatment = project(rows),
            SatelliteKind::IntensiveCare => self.intensive_care = project(rows),
            SatelliteKind::NursingGrade => self.nursing_grade = project(rows),
            SatelliteKind::Personnel => self.personnel = project(rows),
            SatelliteKind::Speciality => self.speciality = project(rows),
        }
    }
}

fn project<T: DeserializeOwned>(rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .filter(Value::is_object)
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect()
}
