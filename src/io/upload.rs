//! CSV extraction from upload request bodies
//!
//! Accepts `multipart/form-data` with a `file` field (browser form upload)
//! or the raw CSV as the request body.

use crate::domain::error::UploadError;
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::convert::Infallible;
use tracing::debug;

/// Form field carrying the CSV file
pub const FILE_FIELD: &str = "file";

/// Collect a request body, failing once it grows past `limit` bytes
pub async fn read_limited<B>(body: B, limit: usize) -> Result<Bytes, UploadError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(UploadError::TooLarge { limit })
        }
        Err(e) => Err(UploadError::Body(e.to_string())),
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type.trim_start().to_ascii_lowercase().starts_with("multipart/form-data")
}

/// Pull the CSV bytes out of a collected body
pub async fn extract_csv(content_type: Option<&str>, body: Bytes) -> Result<Bytes, UploadError> {
    let Some(content_type) = content_type.filter(|ct| is_multipart(ct)) else {
        if body.is_empty() {
            return Err(UploadError::MissingFile);
        }
        return Ok(body);
    };

    let boundary = multer::parse_boundary(content_type)?;
    let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            let file_name = field.file_name().unwrap_or("upload.csv").to_string();
            let data = field.bytes().await?;
            debug!(file_name = %file_name, bytes = %data.len(), "upload_file_field");
            if data.is_empty() {
                return Err(UploadError::MissingFile);
            }
            return Ok(data);
        }
    }
    Err(UploadError::MissingFile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    const BOUNDARY: &str = "X-BOUNDARY";

    fn multipart_body(field: &str, content: &str) -> Bytes {
        Bytes::from(format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"events.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        ))
    }

    fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    #[tokio::test]
    async fn test_multipart_file_field() {
        let csv = "DATA;MOTORISTA;QUANTIDADE\n01/01/2024;A;3";
        let data = extract_csv(Some(&content_type()), multipart_body("file", csv)).await.unwrap();
        assert_eq!(data, Bytes::from(csv));
    }

    #[tokio::test]
    async fn test_multipart_without_file_field() {
        let err = extract_csv(Some(&content_type()), multipart_body("other", "x")).await.unwrap_err();
        assert!(matches!(err, UploadError::MissingFile));
    }

    #[tokio::test]
    async fn test_multipart_without_boundary() {
        let err = extract_csv(Some("multipart/form-data"), Bytes::from("x")).await.unwrap_err();
        assert!(matches!(err, UploadError::Multipart(_)));
    }

    #[tokio::test]
    async fn test_raw_body() {
        let data = extract_csv(Some("text/csv"), Bytes::from("a;b\n")).await.unwrap();
        assert_eq!(data, Bytes::from("a;b\n"));
        let err = extract_csv(None, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, UploadError::MissingFile));
    }

    #[tokio::test]
    async fn test_read_limited() {
        let body = Full::new(Bytes::from(vec![b'x'; 64]));
        assert_eq!(read_limited(body, 128).await.unwrap().len(), 64);

        let body = Full::new(Bytes::from(vec![b'x'; 64]));
        let err = read_limited(body, 16).await.unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { limit: 16 }));
    }
}
