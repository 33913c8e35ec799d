//! Streaming `multipart/form-data` parsing
//!
//! Only the part named `file` is kept. Its bytes go straight from the request
//! body into an [`UploadSpool`]; other parts are skipped.

use super::{ReceivedFile, UploadError, UploadSpool};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::BodyStream;
use hyper::body::Body;

/// Form field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

/// Read the `file` part of a multipart request body into a spool.
///
/// `spool_limit` caps how many bytes are written to disk; the full received
/// size is still reported on the returned spool.
#[tracing::instrument(
    name = "upload.receive",
    skip_all,
    fields(filename = tracing::field::Empty, bytes = tracing::field::Empty)
)]
pub async fn receive_file<B>(
    content_type: Option<&str>,
    body: B,
    spool_limit: u64,
) -> Result<ReceivedFile, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
{
    let boundary = content_type
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or(UploadError::NotMultipart)?;

    let stream = BodyStream::new(body)
        .try_filter_map(|frame| futures::future::ready(Ok(frame.into_data().ok())));
    let mut multipart = multer::Multipart::new(stream, boundary);

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            tracing::debug!(field = ?field.name(), "Skipping form field");
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or(UploadError::MissingFilename)?;
        let content_type = field.content_type().map(ToString::to_string);

        let span = tracing::Span::current();
        span.record("filename", filename.as_str());

        let mut spool = UploadSpool::new(spool_limit).await?;
        while let Some(chunk) = field.chunk().await? {
            spool.write_chunk(&chunk).await?;
        }

        span.record("bytes", spool.len());
        tracing::debug!(
            content_type = ?content_type,
            truncated = spool.is_truncated(),
            "Received file part"
        );

        return Ok(ReceivedFile {
            filename,
            content_type,
            spool,
        });
    }

    Err(UploadError::MissingField(FILE_FIELD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use http_body_util::Full;

    const BOUNDARY: &str = "X-TEST-BOUNDARY";

    fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    fn form(parts: &[(&str, Option<&str>, Option<&str>, &[u8])]) -> Full<Bytes> {
        let mut body = Vec::new();
        for (name, filename, part_type, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, f
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n", name).as_bytes(),
                ),
            }
            if let Some(t) = part_type {
                body.extend_from_slice(format!("Content-Type: {}\r\n", t).as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        Full::new(Bytes::from(body))
    }

    #[tokio::test]
    async fn test_receives_file_part() {
        let body = form(&[
            ("note", None, None, &b"ignored"[..]),
            ("file", Some("a.txt"), Some("text/plain"), &b"0123456789"[..]),
        ]);

        let received = receive_file(Some(&content_type()), body, 1024).await.unwrap();
        assert_eq!(received.filename, "a.txt");
        assert_eq!(received.content_type.as_deref(), Some("text/plain"));
        assert_eq!(received.size(), 10);

        let chunks: Vec<Bytes> = received
            .spool
            .into_stream()
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"0123456789");
    }

    #[tokio::test]
    async fn test_oversized_part_reports_full_size() {
        let data = vec![b'x'; 1500];
        let body = form(&[("file", Some("big.bin"), None, &data[..])]);

        let received = receive_file(Some(&content_type()), body, 1000).await.unwrap();
        assert_eq!(received.size(), 1500);
        assert!(received.spool.is_truncated());
        assert!(received.content_type.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let body = form(&[("other", Some("a.txt"), None, &b"data"[..])]);
        let err = receive_file(Some(&content_type()), body, 1024)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, UploadError::MissingField("file")));
    }

    #[tokio::test]
    async fn test_missing_filename() {
        let body = form(&[("file", None, None, &b"data"[..])]);
        let err = receive_file(Some(&content_type()), body, 1024)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, UploadError::MissingFilename));
    }

    #[tokio::test]
    async fn test_rejects_non_multipart() {
        let body = Full::new(Bytes::from_static(b"{}"));
        let err = receive_file(Some("application/json"), body, 1024)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, UploadError::NotMultipart));

        let body = Full::new(Bytes::from_static(b"{}"));
        let err = receive_file(None, body, 1024).await.err().unwrap();
        assert!(matches!(err, UploadError::NotMultipart));
    }
}
