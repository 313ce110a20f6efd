//! Optional artifact persistence: uploads generator output to S3 under
//! `{generator}/artifacts/job-{jobId}.{ext}` and derives the public
//! `artifactUrl`. Upload failure is logged, never blocks job completion
//! (SPEC_FULL.md §4.4 failure taxonomy).

use aws_sdk_s3::primitives::ByteStream;
use uuid::Uuid;

pub struct ArtifactStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl ArtifactStore {
    pub async fn new(bucket: String, region: String) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region))
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket,
        }
    }

    fn key_for(generator: &str, job_id: Uuid, ext: &str) -> String {
        format!("{generator}/artifacts/job-{job_id}.{ext}")
    }

    pub async fn put_artifact(
        &self,
        generator: &str,
        job_id: Uuid,
        ext: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<String> {
        let key = Self::key_for(generator, job_id, ext);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .send()
            .await?;
        Ok(format!("https://{}.s3.amazonaws.com/{}", self.bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_matches_documented_layout() {
        let job_id = Uuid::nil();
        let key = ArtifactStore::key_for("jen1", job_id, "wav");
        assert_eq!(key, format!("jen1/artifacts/job-{job_id}.wav"));
    }
}
