//! Redis Streams implementation of `JobStream`, reached through a
//! `ConnectionManager` that transparently reconnects.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimOptions, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::StreamError;
use crate::model::StreamEntry;
use crate::stream::{Delivery, JobStream};

pub struct RedisJobStream {
    conn: ConnectionManager,
    stream_key: String,
    dead_key: String,
    group: String,
}

impl RedisJobStream {
    pub async fn connect(redis_url: &str, stream_key: &str, group: &str) -> Result<Self, StreamError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            stream_key: stream_key.to_string(),
            dead_key: format!("{stream_key}:dead"),
            group: group.to_string(),
        })
    }

    fn fields_for(entry: &StreamEntry) -> Result<Vec<(&'static str, String)>, StreamError> {
        Ok(vec![
            ("job_id", entry.job_id.to_string()),
            ("narrative", entry.narrative.clone()),
            ("duration", entry.duration.to_string()),
            ("generator", entry.generator.clone()),
            ("model", entry.model.clone().unwrap_or_default()),
            ("options", serde_json::to_string(&entry.options)?),
            ("request_id", entry.request_id.clone()),
            ("retry_count", entry.retry_count.to_string()),
        ])
    }

    fn entry_from_fields(fields: &HashMap<String, String>) -> Result<StreamEntry, StreamError> {
        let get = |k: &str| {
            fields
                .get(k)
                .cloned()
                .ok_or_else(|| StreamError::MalformedEntry(k.to_string()))
        };

        let job_id = get("job_id")?;
        let job_id = Uuid::parse_str(&job_id).map_err(|_| StreamError::MalformedEntry("job_id".into()))?;
        let duration: i32 = get("duration")?
            .parse()
            .map_err(|_| StreamError::MalformedEntry("duration".into()))?;
        let retry_count: u32 = fields
            .get("retry_count")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let model = fields.get("model").filter(|m| !m.is_empty()).cloned();
        let options_raw = get("options")?;
        let options = serde_json::from_str(&options_raw)?;

        Ok(StreamEntry {
            job_id,
            narrative: get("narrative")?,
            duration,
            generator: get("generator")?,
            model,
            options,
            request_id: get("request_id")?,
            retry_count,
        })
    }

    fn deliveries_from_reply(reply: StreamReadReply, key: &str) -> Result<Vec<Delivery>, StreamError> {
        let mut out = Vec::new();
        for stream_key in reply.keys {
            if stream_key.key != key {
                continue;
            }
            for id in stream_key.ids {
                let fields: HashMap<String, String> = id
                    .map
                    .iter()
                    .filter_map(|(k, v)| {
                        redis::from_redis_value::<String>(v).ok().map(|s| (k.clone(), s))
                    })
                    .collect();
                let entry = Self::entry_from_fields(&fields)?;
                out.push(Delivery { entry_id: id.id, entry });
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl JobStream for RedisJobStream {
    async fn append(&self, entry: &StreamEntry) -> Result<String, StreamError> {
        let mut conn = self.conn.clone();
        let fields = Self::fields_for(entry)?;
        let id: String = conn.xadd(&self.stream_key, "*", &fields).await?;
        Ok(id)
    }

    async fn append_dead_letter(
        &self,
        job_id: Uuid,
        error: &str,
        attempts: i32,
        request_id: &str,
    ) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let fields = [
            ("job_id", job_id.to_string()),
            ("error", error.to_string()),
            ("attempts", attempts.to_string()),
            ("request_id", request_id.to_string()),
        ];
        let _: String = conn.xadd(&self.dead_key, "*", &fields).await?;
        Ok(())
    }

    async fn ensure_group(&self) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        // MKSTREAM so the group can be created before any entry exists.
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(&self.stream_key, &self.group, "0")
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_new(
        &self,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<Delivery>, StreamError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(&self.group, consumer)
            .count(count)
            .block(block_ms);
        let reply: StreamReadReply = conn
            .xread_options(&[self.stream_key.as_str()], &[">"], &opts)
            .await?;
        Self::deliveries_from_reply(reply, &self.stream_key)
    }

    async fn read_pending(&self, consumer: &str, count: usize) -> Result<Vec<Delivery>, StreamError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default().group(&self.group, consumer).count(count);
        let reply: StreamReadReply = conn
            .xread_options(&[self.stream_key.as_str()], &["0"], &opts)
            .await?;
        Self::deliveries_from_reply(reply, &self.stream_key)
    }

    async fn ack(&self, entry_id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(&self.stream_key, &self.group, &[entry_id]).await?;
        Ok(())
    }

    async fn claim_abandoned(
        &self,
        consumer: &str,
        min_idle_ms: i64,
        count: usize,
    ) -> Result<Vec<Delivery>, StreamError> {
        let mut conn = self.conn.clone();
        let opts = StreamAutoClaimOptions::default().count(count);
        let (_cursor, entries, _deleted): (String, Vec<redis::streams::StreamId>, Vec<String>) = conn
            .xautoclaim_options(&self.stream_key, &self.group, consumer, min_idle_ms, "0", opts)
            .await?;

        let mut out = Vec::with_capacity(entries.len());
        for id in entries {
            let fields: HashMap<String, String> = id
                .map
                .iter()
                .filter_map(|(k, v)| redis::from_redis_value::<String>(v).ok().map(|s| (k.clone(), s)))
                .collect();
            let entry = Self::entry_from_fields(&fields)?;
            out.push(Delivery { entry_id: id.id, entry });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_entry() -> StreamEntry {
        StreamEntry {
            job_id: Uuid::new_v4(),
            narrative: "a lo-fi beat about rain".to_string(),
            duration: 30,
            generator: "jen1".to_string(),
            model: Some("v2".to_string()),
            options: json!({"tempo": 90}),
            request_id: "req-1".to_string(),
            retry_count: 0,
        }
    }

    #[test]
    fn fields_roundtrip_through_entry_from_fields() {
        let entry = sample_entry();
        let fields: HashMap<String, String> = RedisJobStream::fields_for(&entry)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let parsed = RedisJobStream::entry_from_fields(&fields).unwrap();
        assert_eq!(parsed.job_id, entry.job_id);
        assert_eq!(parsed.narrative, entry.narrative);
        assert_eq!(parsed.duration, entry.duration);
        assert_eq!(parsed.model, entry.model);
        assert_eq!(parsed.retry_count, entry.retry_count);
    }

    #[test]
    fn missing_job_id_is_malformed() {
        let fields = HashMap::new();
        assert!(matches!(
            RedisJobStream::entry_from_fields(&fields),
            Err(StreamError::MalformedEntry(_))
        ));
    }
}
