//! Service request queries.

use super::{decode_ts, encode_ts, RequestStore, SimStore};
use crate::{
    error::{SimError, SimResult},
    model::{Provenance, RequestStatus, ServiceRequest},
    types::{ServicePointId, Timestamp},
};
use rusqlite::{params, params_from_iter, types::Value};

const REQUEST_COLUMNS: &str = "request_id, sequence, category, status, created_at,
    called_at, completed_at, skipped_at, service_point_id, provenance";

/// Partial update for one request. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub called_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub skipped_at: Option<Timestamp>,
    pub service_point_id: Option<ServicePointId>,
}

impl RequestPatch {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Realtime notification pushed after each committed request write.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestChange {
    Inserted { count: usize },
    Updated { request_id: String, status: Option<RequestStatus> },
    Deleted { provenance: Provenance, count: usize },
}

/// Raw column values, converted outside the rusqlite row callback so
/// malformed rows surface as `UnexpectedShape` rather than a panic.
struct RawRequest {
    request_id: String,
    sequence: i64,
    category: String,
    status: String,
    created_at: i64,
    called_at: Option<i64>,
    completed_at: Option<i64>,
    skipped_at: Option<i64>,
    service_point_id: Option<String>,
    provenance: String,
}

impl RawRequest {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            request_id: row.get(0)?,
            sequence: row.get(1)?,
            category: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            called_at: row.get(5)?,
            completed_at: row.get(6)?,
            skipped_at: row.get(7)?,
            service_point_id: row.get(8)?,
            provenance: row.get(9)?,
        })
    }

    fn into_request(self) -> SimResult<ServiceRequest> {
        let status = RequestStatus::parse(&self.status).ok_or_else(|| {
            SimError::UnexpectedShape(format!(
                "request {} has unknown status '{}'",
                self.request_id, self.status
            ))
        })?;
        let provenance = Provenance::parse(&self.provenance).ok_or_else(|| {
            SimError::UnexpectedShape(format!(
                "request {} has unknown provenance '{}'",
                self.request_id, self.provenance
            ))
        })?;
        let sequence = u32::try_from(self.sequence).map_err(|_| {
            SimError::UnexpectedShape(format!(
                "request {} has sequence {}",
                self.request_id, self.sequence
            ))
        })?;
        Ok(ServiceRequest {
            id: self.request_id,
            sequence,
            category: self.category,
            status,
            created_at: decode_ts(self.created_at)?,
            called_at: self.called_at.map(decode_ts).transpose()?,
            completed_at: self.completed_at.map(decode_ts).transpose()?,
            skipped_at: self.skipped_at.map(decode_ts).transpose()?,
            service_point_id: self.service_point_id,
            provenance,
        })
    }
}

fn request_values(r: &ServiceRequest) -> [Value; 10] {
    let opt_ts = |t: Option<Timestamp>| t.map_or(Value::Null, |t| Value::Integer(encode_ts(t)));
    [
        Value::Text(r.id.clone()),
        Value::Integer(i64::from(r.sequence)),
        Value::Text(r.category.clone()),
        Value::Text(r.status.as_str().to_string()),
        Value::Integer(encode_ts(r.created_at)),
        opt_ts(r.called_at),
        opt_ts(r.completed_at),
        opt_ts(r.skipped_at),
        r.service_point_id.clone().map_or(Value::Null, Value::Text),
        Value::Text(r.provenance.as_str().to_string()),
    ]
}

impl RequestStore for SimStore {
    fn insert_requests(&self, requests: &[ServiceRequest], batch_size: usize) -> SimResult<usize> {
        if batch_size == 0 {
            return Err(SimError::Validation("batch size must be > 0".into()));
        }
        if requests.is_empty() {
            return Ok(0);
        }

        // One transaction around every batch: a failure in batch k rolls
        // back batches 0..k when `tx` is dropped without commit.
        let tx = self.conn.unchecked_transaction()?;
        for (batch_no, batch) in requests.chunks(batch_size).enumerate() {
            let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"; batch.len()].join(", ");
            let sql = format!("INSERT INTO service_request ({REQUEST_COLUMNS}) VALUES {placeholders}");
            let values: Vec<Value> = batch.iter().flat_map(request_values).collect();
            tx.execute(&sql, params_from_iter(values.iter()))?;
            log::debug!("insert batch {batch_no}: {} requests", batch.len());
        }
        tx.commit()?;

        self.notify(RequestChange::Inserted { count: requests.len() });
        Ok(requests.len())
    }

    fn select_requests(
        &self,
        provenance: Provenance,
        status: Option<RequestStatus>,
    ) -> SimResult<Vec<ServiceRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM service_request
             WHERE provenance = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map(
                params![provenance.as_str(), status.map(|s| s.as_str())],
                RawRequest::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRequest::into_request).collect()
    }

    fn update_request(&self, request_id: &str, patch: &RequestPatch) -> SimResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(t) = patch.called_at {
            sets.push("called_at = ?");
            values.push(Value::Integer(encode_ts(t)));
        }
        if let Some(t) = patch.completed_at {
            sets.push("completed_at = ?");
            values.push(Value::Integer(encode_ts(t)));
        }
        if let Some(t) = patch.skipped_at {
            sets.push("skipped_at = ?");
            values.push(Value::Integer(encode_ts(t)));
        }
        if let Some(sp) = &patch.service_point_id {
            sets.push("service_point_id = ?");
            values.push(Value::Text(sp.clone()));
        }
        values.push(Value::Text(request_id.to_string()));

        let sql = format!(
            "UPDATE service_request SET {} WHERE request_id = ?",
            sets.join(", ")
        );
        let changed = self.conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed != 1 {
            return Err(SimError::UnexpectedShape(format!(
                "update of request {request_id} touched {changed} rows"
            )));
        }

        self.notify(RequestChange::Updated {
            request_id: request_id.to_string(),
            status: patch.status,
        });
        Ok(())
    }

    fn delete_requests(&self, provenance: Provenance) -> SimResult<usize> {
        let count = self.conn.execute(
            "DELETE FROM service_request WHERE provenance = ?1",
            params![provenance.as_str()],
        )?;
        self.notify(RequestChange::Deleted { provenance, count });
        Ok(count)
    }

    fn count_requests(
        &self,
        provenance: Provenance,
        status: Option<RequestStatus>,
    ) -> SimResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM service_request
             WHERE provenance = ?1 AND (?2 IS NULL OR status = ?2)",
            params![provenance.as_str(), status.map(|s| s.as_str())],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
