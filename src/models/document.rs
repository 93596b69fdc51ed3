// src/models/document.rs

//! Denormalized hospital document written to the search index.

use serde::{Deserialize, Serialize};

use super::hospital::{
    EquipmentRow, FoodTreatmentRow, Hospital, NursingGradeRow, PersonnelRow, Pharmacy,
    Satellites, SubjectRow, TypeRow,
};
use super::schedule::Schedule;

/// Placeholder for missing display text.
pub const MISSING: &str = "-";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A pharmacy near a hospital with its distance in meters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearbyPharmacy {
    #[serde(flatten)]
    pub pharmacy: Pharmacy,
    pub distance: f64,
}

/// The unit handed to the search index, keyed by `ykiho`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HospitalDocument {
    pub ykiho: String,
    #[serde(rename = "yadmNm")]
    pub name: String,
    pub addr: String,
    pub region: String,
    #[serde(rename = "regionCode")]
    pub region_code: Option<String>,
    pub category: String,
    #[serde(rename = "categoryCode")]
    pub category_code: Option<String>,
    pub location: Option<GeoPoint>,
    #[serde(rename = "hospUrl")]
    pub hosp_url: String,
    pub telno: String,
    pub veteran_hospital: Option<bool>,
    #[serde(rename = "nightCare")]
    pub night_care: bool,
    #[serde(rename = "weekendCare")]
    pub weekend_care: bool,
    pub schedule: Schedule,

    /// Subject names joined with `", "`
    pub subject: String,
    /// Subject names as a list
    pub major: Vec<String>,
    pub subjects: Vec<SubjectRow>,
    pub equipment: Vec<EquipmentRow>,
    pub food_treatment: Vec<FoodTreatmentRow>,
    pub intensive_care: Vec<TypeRow>,
    pub nursing_grade: Vec<NursingGradeRow>,
    pub personnel: Vec<PersonnelRow>,
    pub speciality: Vec<TypeRow>,

    pub nearby_pharmacies: Vec<NearbyPharmacy>,
}

/// Computed care flags derived from the raw schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CareFlags {
    pub night_care: bool,
    pub weekend_care: bool,
}

impl HospitalDocument {
    /// Build a document whole from its parts.
    ///
    /// Returns `None` when the hospital has no usable identifier.
    pub fn assemble(
        hospital: &Hospital,
        satellites: Satellites,
        schedule: Schedule,
        flags: CareFlags,
        nearby_pharmacies: Vec<NearbyPharmacy>,
    ) -> Option<Self> {
        let ykiho = hospital.document_id()?.to_string();

        let names: Vec<String> = satellites
            .subjects
            .iter()
            .filter_map(|s| s.dgsbjt_cd_nm.clone())
            .filter(|name| !name.trim().is_empty())
            .collect();
        let subject = if names.is_empty() {
            MISSING.to_string()
        } else {
            names.join(", ")
        };
        let major = if names.is_empty() {
            vec![MISSING.to_string()]
        } else {
            names
        };

        Some(Self {
            ykiho,
            name: text_or_missing(&hospital.name),
            addr: text_or_missing(&hospital.addr),
            region: text_or_missing(&hospital.region_name),
            region_code: hospital.region_code.clone(),
            category: text_or_missing(&hospital.category_name),
            category_code: hospital.category_code.clone(),
            location: hospital
                .position()
                .map(|(lat, lon)| GeoPoint { lat, lon }),
            hosp_url: text_or_missing(&hospital.hosp_url),
            telno: text_or_missing(&hospital.telno),
            veteran_hospital: hospital.veteran_hospital,
            night_care: flags.night_care,
            weekend_care: flags.weekend_care,
            schedule,
            subject,
            major,
            subjects: satellites.subjects,
            equipment: satellites.equipment,
            food_treatment: satellites.food_treatment,
            intensive_care: satellites.intensive_care,
            nursing_grade: satellites.nursing_grade,
            personnel: satellites.personnel,
            speciality: satellites.speciality,
            nearby_pharmacies,
        })
    }
}

fn text_or_missing(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(MISSING)
        .to_string()
}
