use aws_config::BehaviorVersion;
use aws_config::ConfigLoader;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;

use crate::errors::AppError;

pub async fn create_s3_client() -> S3Client {
    let aws_config = ConfigLoader::default()
        .region(std::env::var("AWS_REGION").ok().map(Region::new))
        .behavior_version(BehaviorVersion::latest())
        .load()
        .await;

    S3Client::new(&aws_config)
}

pub async fn upload_object(
    client: &S3Client,
    bucket: &str,
    key: &str,
    content_type: &str,
    body: Vec<u8>,
) -> Result<String, AppError> {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type(content_type)
        .body(body.into())
        .send()
        .await
        .map_err(|err| {
            log::error!("S3 upload of {} failed: {:?}", key, err);
            AppError::AWSError("Failed to upload file".to_string())
        })?;

    Ok(format!("https://{}.s3.amazonaws.com/{}", bucket, key))
}
