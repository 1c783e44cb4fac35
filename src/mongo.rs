use crate::record::{JobId, JobPriority, JobRecord};
use crate::store::{JobStore, StoreError};
use anyhow::Context;
use async_trait::async_trait;
use bson::{doc, Binary};
use chrono::{DateTime, TimeZone, Utc};
use mongodb::options::{ClientOptions, ConnectionString, FindOptions, Tls, TlsOptions};
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::instrument;

const COLLECTION: &str = "estafette_jobs";

/// [`JobStore`] backed by a MongoDB collection.
///
/// `fetch_due` does not claim the records it returns, so run a single
/// scheduler instance against a given database.
#[derive(Clone)]
pub struct MongoJobStore {
    database: Database,
}

impl MongoJobStore {
    pub async fn new(uri: &str, cert_file: Option<String>) -> Result<Self, mongodb::error::Error> {
        let client = Self::new_client(uri, cert_file).await?;
        let database = client
            .default_database()
            .unwrap_or(client.database("estafette"));

        Ok(Self { database })
    }

    async fn new_client(
        uri: &str,
        cert_path: Option<String>,
    ) -> Result<Client, mongodb::error::Error> {
        match cert_path {
            Some(cert_path) => {
                let conn_str = ConnectionString::parse(uri)?;
                let mut options = ClientOptions::parse_connection_string(conn_str).await?;
                let mut tls_options = TlsOptions::default();
                tls_options.ca_file_path = Some(cert_path.into());
                tls_options.allow_invalid_hostnames = Some(true);
                options.tls = Some(Tls::Enabled(tls_options));
                let client = Client::with_options(options)?;
                Ok(client)
            }
            None => {
                let client = mongodb::Client::with_uri_str(uri).await?;
                Ok(client)
            }
        }
    }

    fn collection(&self) -> Collection<JobDocument> {
        self.database.collection(COLLECTION)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JobDocument {
    jid: String,
    job_type: String,
    state: Binary,
    priority: i64,
    try_count: i64,
    enqueued_at: bson::DateTime,
    next_try_time: bson::DateTime,
    last_try_time: Option<bson::DateTime>,
    is_abandoned: bool,
}

impl JobDocument {
    fn from_record(record: &JobRecord) -> Self {
        Self {
            jid: record.id.to_string(),
            job_type: record.job_type.clone(),
            state: Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: record.state.clone(),
            },
            priority: record.priority.as_i64(),
            try_count: i64::from(record.try_count),
            enqueued_at: to_bson_date(record.enqueued_at),
            next_try_time: to_bson_date(record.next_try_time),
            last_try_time: record.last_try_time.map(to_bson_date),
            is_abandoned: record.is_abandoned,
        }
    }

    fn into_record(self) -> Result<JobRecord, StoreError> {
        let id = JobId::from_str(&self.jid).context("invalid job id in store")?;

        Ok(JobRecord {
            id,
            job_type: self.job_type,
            state: self.state.bytes,
            priority: JobPriority::from_i64(self.priority),
            try_count: self.try_count.max(0) as u32,
            enqueued_at: from_bson_date(self.enqueued_at)?,
            next_try_time: from_bson_date(self.next_try_time)?,
            last_try_time: self.last_try_time.map(from_bson_date).transpose()?,
            is_abandoned: self.is_abandoned,
        })
    }
}

fn to_bson_date(value: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(value.timestamp_millis())
}

fn from_bson_date(value: bson::DateTime) -> Result<DateTime<Utc>, StoreError> {
    let date = Utc
        .timestamp_millis_opt(value.timestamp_millis())
        .single()
        .context("timestamp out of range in store")?;
    Ok(date)
}

#[async_trait]
impl JobStore for MongoJobStore {
    #[instrument(skip_all, err, fields(job_id = %record.id, job_type = %record.job_type))]
    async fn insert(&self, record: JobRecord) -> Result<(), StoreError> {
        self.collection()
            .insert_one(JobDocument::from_record(&record), None)
            .await
            .context("failed to add job to the store")?;

        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn fetch_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let filter_doc = doc! {
            "is_abandoned": false,
            "next_try_time": { "$lte": to_bson_date(now) },
        };

        let sort_doc = doc! {
            "priority": -1,
            "next_try_time": 1,
        };

        let find_options = FindOptions::builder()
            .sort(sort_doc)
            .limit(limit as i64)
            .build();

        let mut cursor = self
            .collection()
            .find(filter_doc, find_options)
            .await
            .context("failed to query due jobs")?;

        let mut due = Vec::new();
        while cursor.advance().await.context("failed to read due jobs")? {
            let document: JobDocument = cursor
                .deserialize_current()
                .context("failed to decode job document")?;
            due.push(document.into_record()?);
        }

        Ok(due)
    }

    #[instrument(skip_all, err, fields(job_id = %record.id))]
    async fn update(&self, record: JobRecord) -> Result<(), StoreError> {
        let update_doc = doc! {
            "$set": {
                "try_count": i64::from(record.try_count),
                "next_try_time": to_bson_date(record.next_try_time),
                "last_try_time": record.last_try_time.map(to_bson_date),
                "is_abandoned": record.is_abandoned,
            }
        };

        let result = self
            .collection()
            .update_one(doc! { "jid": record.id.to_string() }, update_doc, None)
            .await
            .context("failed to update job")?;

        if result.matched_count == 0 {
            Err(StoreError::JobNotFound(record.id))
        } else {
            Ok(())
        }
    }

    #[instrument(skip_all, err, fields(job_id = %id))]
    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        let result = self
            .collection()
            .delete_one(doc! { "jid": id.to_string() }, None)
            .await
            .context("failed to remove job from the store")?;

        if result.deleted_count == 0 {
            Err(StoreError::JobNotFound(id))
        } else {
            Ok(())
        }
    }
}
