//! MongoDB primary store.
//!
//! Reads hospitals by ascending `_id`, satellite rows and opening hours by
//! `ykiho`, and pharmacies through one projected cursor.
//!
//! ```text
//! {database}/
//! ├── hospitals               # paged by _id
//! ├── hospitaltimes           # one row per ykiho
//! ├── pharmacies              # projected, rows with Ypos/Xpos only
//! └── hospitalsubjects, hospital_equipment, ...   # satellites
//! ```

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Hospital, Pharmacy, RawSchedule, SatelliteKind, StoreConfig};
use crate::storage::FacilityStore;

const HOSPITALS: &str = "hospitals";
const TIMES: &str = "hospitaltimes";
const PHARMACIES: &str = "pharmacies";

/// Cursor batch size for the bulk pharmacy read.
const PHARMACY_BATCH: u32 = 1_000;

/// Pharmacy fields copied into index documents.
const PHARMACY_FIELDS: [&str; 14] = [
    "yadmNm", "clCd", "clCdNm", "sidoCd", "sidoCdNm", "sgguCd", "sgguCdNm", "emdongNm", "postNo",
    "addr", "telno", "estbDd", "Ypos", "Xpos",
];

/// MongoDB-backed primary store.
pub struct MongoStore {
    uri: String,
    database: String,
    connect_timeout: Duration,
    client: RwLock<Option<Client>>,
}

impl MongoStore {
    pub fn new(uri: impl Into<String>, database: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            connect_timeout,
            client: RwLock::new(None),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.uri, &config.database, config.connect_timeout())
    }

    fn db(&self, context: &str) -> Result<Database> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|client| client.database(&self.database))
            .ok_or_else(|| AppError::network(context, "mongo store not connected"))
    }

    fn collection(&self, context: &str, name: &str) -> Result<Collection<Document>> {
        Ok(self.db(context)?.collection(name))
    }
}

/// Filter selecting hospitals strictly after the cursor.
///
/// Keys that parse as an ObjectId compare as ObjectIds, anything else as a
/// string, so both native and imported `_id`s page correctly.
fn after_filter(after: Option<&str>) -> Document {
    match after {
        None => Document::new(),
        Some(key) => match ObjectId::parse_str(key) {
            Ok(oid) => doc! { "_id": { "$gt": oid } },
            Err(_) => doc! { "_id": { "$gt": key } },
        },
    }
}

fn pharmacy_filter() -> Document {
    doc! {
        "Ypos": { "$exists": true },
        "Xpos": { "$exists": true },
    }
}

fn pharmacy_projection() -> Document {
    PHARMACY_FIELDS
        .iter()
        .map(|field| (field.to_string(), Bson::Int32(1)))
        .collect()
}

/// Relaxed extended JSON of a BSON document (`{"$oid": ..}` ids, plain numbers).
fn to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

/// Decode documents, skipping the ones that do not fit `T`.
fn decode_all<T: DeserializeOwned>(context: &str, documents: Vec<Document>) -> Vec<T> {
    let total = documents.len();
    let decoded: Vec<T> = documents
        .into_iter()
        .filter_map(|document| serde_json::from_value(to_json(document)).ok())
        .collect();
    if decoded.len() < total {
        log::warn!("{}: skipped {} undecodable rows", context, total - decoded.len());
    }
    decoded
}

#[async_trait]
impl FacilityStore for MongoStore {
    async fn connect(&self) -> Result<()> {
        let mut options = ClientOptions::parse(&self.uri).await?;
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);
        if options.app_name.is_none() {
            options.app_name = Some("hospital-indexer".to_string());
        }

        let client = Client::with_options(options)?;
        client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await?;

        log::info!("Connected to MongoDB database {}", self.database);
        let previous = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(client);
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn ping(&self) -> Result<()> {
        self.db("ping")?.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let client = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(client) = client {
            client.shutdown().await;
        }
        Ok(())
    }

    async fn count_hospitals(&self) -> Result<u64> {
        Ok(self
            .collection("count", HOSPITALS)?
            .estimated_document_count()
            .await?)
    }

    async fn hospitals_after(&self, after: Option<&str>, limit: usize) -> Result<Vec<Hospital>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let documents: Vec<Document> = self
            .collection("hospitals_after", HOSPITALS)?
            .find(after_filter(after))
            .sort(doc! { "_id": 1 })
            .limit(limit)
            .await?
            .try_collect()
            .await?;
        Ok(decode_all(HOSPITALS, documents))
    }

    async fn satellite(&self, kind: SatelliteKind, ykiho: &str) -> Result<Vec<Value>> {
        let documents: Vec<Document> = self
            .collection("satellite", kind.collection())?
            .find(doc! { "ykiho": ykiho })
            .await?
            .try_collect()
            .await?;
        Ok(documents.into_iter().map(to_json).collect())
    }

    async fn schedule(&self, ykiho: &str) -> Result<Option<RawSchedule>> {
        let document = self
            .collection("schedule", TIMES)?
            .find_one(doc! { "ykiho": ykiho })
            .projection(doc! { "_id": 0, "ykiho": 0 })
            .await?;
        Ok(document.and_then(|document| match to_json(document) {
            Value::Object(map) => Some(map),
            _ => None,
        }))
    }

    async fn pharmacies_with_position(&self) -> Result<Vec<Pharmacy>> {
        let documents: Vec<Document> = self
            .collection("pharmacies", PHARMACIES)?
            .find(pharmacy_filter())
            .projection(pharmacy_projection())
            .batch_size(PHARMACY_BATCH)
            .await?
            .try_collect()
            .await?;
        let pharmacies: Vec<Pharmacy> = decode_all(PHARMACIES, documents);
        Ok(pharmacies
            .into_iter()
            .filter(|p| p.position().is_some())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_after_filter() {
        assert!(after_filter(None).is_empty());

        let oid = "65a1f0c2e4b0a1b2c3d4e5f6";
        let filter = after_filter(Some(oid));
        let gt = filter.get_document("_id").unwrap().get("$gt").unwrap();
        assert_eq!(gt, &Bson::ObjectId(ObjectId::parse_str(oid).unwrap()));

        let filter = after_filter(Some("hospital-0042"));
        let gt = filter.get_document("_id").unwrap().get("$gt").unwrap();
        assert_eq!(gt, &Bson::String("hospital-0042".into()));
    }

    #[test]
    fn test_pharmacy_query_shape() {
        let projection = pharmacy_projection();
        assert_eq!(projection.len(), 14);
        assert_eq!(projection.get_i32("Ypos").unwrap(), 1);
        assert!(!projection.contains_key("_id"));

        let filter = pharmacy_filter();
        assert!(filter.get_document("Ypos").unwrap().get_bool("$exists").unwrap());
        assert!(filter.get_document("Xpos").unwrap().get_bool("$exists").unwrap());
    }

    #[test]
    fn test_hospital_document_decodes() {
        let oid = ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        let hospitals: Vec<Hospital> = decode_all(
            HOSPITALS,
            vec![
                doc! {
                    "_id": oid,
                    "ykiho": "JDQ4",
                    "yadmNm": "서울대학교병원",
                    "clCd": 1_i32,
                    "YPos": 37.5796,
                    "XPos": 126.9990,
                },
                doc! { "ykiho": "no-id" },
            ],
        );

        assert_eq!(hospitals.len(), 1);
        assert_eq!(hospitals[0].id, "65a1f0c2e4b0a1b2c3d4e5f6");
        assert_eq!(hospitals[0].satellite_key(), Some("JDQ4"));
        assert_eq!(hospitals[0].category_code.as_deref(), Some("1"));
        assert_eq!(hospitals[0].position(), Some((37.5796, 126.9990)));
    }

    #[test]
    fn test_pharmacy_document_decodes() {
        let pharmacies: Vec<Pharmacy> = decode_all(
            PHARMACIES,
            vec![doc! {
                "yadmNm": "중앙약국",
                "Ypos": "37.5",
                "Xpos": 127.0,
                "telno": "02-000-0000",
            }],
        );

        assert_eq!(pharmacies.len(), 1);
        assert_eq!(pharmacies[0].position(), Some((37.5, 127.0)));
    }

    #[tokio::test]
    async fn test_reads_before_connect_are_network_errors() {
        let store = MongoStore::new("mongodb://127.0.0.1:27017", "horoscope_db", Duration::from_secs(1));

        assert!(!store.is_connected());
        let err = store.hospitals_after(None, 10).await.unwrap_err();
        assert!(err.is_network());
        assert!(store.disconnect().await.is_ok());
    }
}
