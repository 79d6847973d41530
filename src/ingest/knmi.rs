/// KNMI Open Data API Client
///
/// Resolves dataset file URLs to temporary download locations and streams
/// the referenced warning documents to local storage.
///
/// API Documentation: https://developer.dataplatform.knmi.nl/open-data-api
/// Warnings dataset: waarschuwingen_nederland_48h

use crate::config::DataPlatformConfig;
use crate::model::KnmiError;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Read buffer used while streaming a document to disk.
const CHUNK_SIZE: usize = 8192;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response of the `.../files/{filename}/url` endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUrlResponse {
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub size: Option<String>,
    pub temporary_download_url: String,
}

/// Response of the `.../files` listing endpoint
#[derive(Debug, Deserialize)]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<ListedFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedFile {
    pub filename: String,
    pub size: Option<u64>,
    pub created: Option<String>,
    pub last_modified: Option<String>,
}

// ============================================================================
// API Client
// ============================================================================

pub struct OpenDataApi {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl OpenDataApi {
    pub fn new(config: &DataPlatformConfig) -> Result<Self, KnmiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, &config.base_url, &config.api_key))
    }

    pub fn with_client(client: reqwest::blocking::Client, base_url: &str, api_key: &str) -> Self {
        OpenDataApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Resolve a dataset file URL to its temporary direct-download location
    pub fn get_file_url(&self, file_url: &str) -> Result<String, KnmiError> {
        let response = self
            .client
            .get(file_url)
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(KnmiError::Http {
                status: response.status().as_u16(),
                url: file_url.to_string(),
            });
        }

        let body: FileUrlResponse = response.json()?;
        Ok(body.temporary_download_url)
    }

    /// Stream a temporary download location to `path`
    ///
    /// The bytes go to a sibling `.part` file first and are renamed over
    /// `path` once complete, so readers never observe a partial document.
    /// Returns the number of bytes written.
    pub fn download_to(&self, download_url: &str, path: &Path) -> Result<u64, KnmiError> {
        let mut response = self.client.get(download_url).send()?;

        if !response.status().is_success() {
            return Err(KnmiError::Http {
                status: response.status().as_u16(),
                url: download_url.to_string(),
            });
        }

        let part = part_path(path);
        let written = match write_part(&mut response, &part) {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&part);
                return Err(err);
            }
        };

        fs::rename(&part, path).map_err(|source| {
            let _ = fs::remove_file(&part);
            KnmiError::Write {
                path: path.display().to_string(),
                source,
            }
        })?;

        Ok(written)
    }

    /// Dataset file URL of the most recently created file
    pub fn latest_file_url(&self, dataset: &str, version: &str) -> Result<String, KnmiError> {
        let list_url = format!("{}/datasets/{}/versions/{}/files", self.base_url, dataset, version);

        let response = self
            .client
            .get(&list_url)
            .header("Authorization", &self.api_key)
            .query(&[("maxKeys", "1"), ("orderBy", "created"), ("sorting", "desc")])
            .send()?;

        if !response.status().is_success() {
            return Err(KnmiError::Http {
                status: response.status().as_u16(),
                url: list_url,
            });
        }

        let listing: FileListResponse = response.json()?;
        let latest = listing
            .files
            .into_iter()
            .next()
            .ok_or_else(|| KnmiError::NoFiles(dataset.to_string()))?;

        Ok(self.file_url(dataset, version, &latest.filename))
    }

    /// Dataset file URL in the same form notifications announce it
    pub fn file_url(&self, dataset: &str, version: &str, filename: &str) -> String {
        format!(
            "{}/datasets/{}/versions/{}/files/{}/url",
            self.base_url, dataset, version, filename
        )
    }
}

/// Copies `body` into a freshly created `part` file and syncs it.
fn write_part(body: &mut impl Read, part: &Path) -> Result<u64, KnmiError> {
    let write_err = |source| KnmiError::Write {
        path: part.display().to_string(),
        source,
    };

    let mut file = File::create(part).map_err(write_err)?;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = body.read(&mut buf).map_err(KnmiError::Stream)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        written += n as u64;
    }
    file.sync_all().map_err(write_err)?;
    Ok(written)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_url_response_parses_camel_case() {
        let body = r#"{"contentType":"application/xml","lastModified":"2024-02-12T07:47:00+00:00",
                       "size":"51234","temporaryDownloadUrl":"https://s3.example/knmi.xml?sig=1"}"#;
        let parsed: FileUrlResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.temporary_download_url, "https://s3.example/knmi.xml?sig=1");
    }

    #[test]
    fn test_file_list_response_tolerates_missing_files() {
        let parsed: FileListResponse = serde_json::from_str(r#"{"isTruncated":false}"#).unwrap();
        assert!(parsed.files.is_empty());
    }

    #[test]
    fn test_file_url_matches_notification_form() {
        let api = OpenDataApi::with_client(
            reqwest::blocking::Client::new(),
            "https://api.dataplatform.knmi.nl/open-data/v1/",
            "key",
        );
        assert_eq!(
            api.file_url("waarschuwingen_nederland_48h", "1.0", "knmi_waarschuwingen_202402120747.xml"),
            "https://api.dataplatform.knmi.nl/open-data/v1/datasets/waarschuwingen_nederland_48h/versions/1.0/files/knmi_waarschuwingen_202402120747.xml/url"
        );
    }

    /// Yields some bytes, then fails like a dropped connection.
    struct BrokenBody {
        sent: bool,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
            }
            self.sent = true;
            buf[..6].copy_from_slice(b"<repor");
            Ok(6)
        }
    }

    #[test]
    fn test_interrupted_stream_leaves_no_part_file() {
        let server = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut conn, _) = server.accept().unwrap();
            let mut request = [0u8; 1024];
            let _ = conn.read(&mut request);
            // Promise more bytes than are sent, then hang up.
            let _ = conn.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n<report>");
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("WeatherAlertToDomoticz.xml");
        let api = OpenDataApi::with_client(reqwest::blocking::Client::new(), "http://unused", "key");

        let err = api.download_to(&format!("http://{}/download", addr), &path).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, KnmiError::Stream(_) | KnmiError::Request(_)), "got {:?}", err);
        assert!(!part_path(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_write_part_error_is_a_stream_error() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("doc.xml.part");
        let err = write_part(&mut BrokenBody { sent: false }, &part).unwrap_err();
        assert!(matches!(err, KnmiError::Stream(_)));
    }

    #[test]
    fn test_part_path_is_a_sibling() {
        assert_eq!(
            part_path(Path::new("/data/WeatherAlertToDomoticz.xml")),
            PathBuf::from("/data/WeatherAlertToDomoticz.xml.part")
        );
    }
}
