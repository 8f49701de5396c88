use async_trait::async_trait;
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use super::utils::{retry_with_backoff, AttemptError, RetryPolicy};
use crate::core::{CancelFlag, EngineConfig, EngineError, Result, Warning, Warnings};

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*charset\s*=\s*["']?\s*([A-Za-z0-9_.:\-]+)"#).unwrap()
});
static XML_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^\s*<\?xml[^>]*encoding\s*=\s*["']([A-Za-z0-9_.\-]+)["']"#).unwrap()
});
static SCHEMA_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(?:[a-z0-9_\-]+:)?schemaRef\b[^>]*?xlink:href\s*=\s*["']([^"']+)["']"#)
        .unwrap()
});

/// Bytes scanned for an in-document charset declaration.
const SNIFF_BYTES: usize = 4096;

const ACCEPT: &str = "text/html, application/xhtml+xml, application/xml;q=0.9, */*;q=0.8";

/// Where a filing (or one of its companion files) lives.
#[derive(Clone, Debug, PartialEq)]
pub enum FilingSource {
    Url(Url),
    Path(PathBuf),
}

impl FromStr for FilingSource {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EngineError::Config("filing source cannot be empty".to_string()));
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = Url::parse(trimmed)
                .map_err(|e| EngineError::Config(format!("invalid URL '{}': {}", trimmed, e)))?;
            Ok(FilingSource::Url(url))
        } else {
            Ok(FilingSource::Path(PathBuf::from(trimmed)))
        }
    }
}

impl fmt::Display for FilingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilingSource::Url(url) => write!(f, "{}", url),
            FilingSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FilingSource {
    /// Resolve `href` relative to this source.
    pub fn join(&self, href: &str) -> Option<FilingSource> {
        if let Ok(url) = Url::parse(href) {
            if matches!(url.scheme(), "http" | "https") {
                return Some(FilingSource::Url(url));
            }
        }
        match self {
            FilingSource::Url(base) => base.join(href).ok().map(FilingSource::Url),
            FilingSource::Path(path) => {
                let dir = path.parent().unwrap_or_else(|| Path::new(""));
                Some(FilingSource::Path(dir.join(href)))
            }
        }
    }

    /// Last path segment without its extension.
    pub fn stem(&self) -> Option<String> {
        let name = match self {
            FilingSource::Url(url) => url.path_segments()?.last()?.to_string(),
            FilingSource::Path(path) => path.file_name()?.to_str()?.to_string(),
        };
        let stem = Path::new(&name).file_stem()?.to_str()?.to_string();
        (!stem.is_empty()).then_some(stem)
    }
}

/// Bytes plus the server's declared content type, if any.
#[derive(Clone, Debug)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// A single HTTP GET. Retries are layered on top by the loader.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> std::result::Result<Fetched, AttemptError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<Fetched, AttemptError> {
        let response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header(reqwest::header::ACCEPT_ENCODING, "gzip")
            .send()
            .await?;

        log::debug!("Response status: {}", response.status());
        if !response.status().is_success() {
            return Err(AttemptError::from_status(response.status()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        log::debug!("Received {} bytes from {}", bytes.len(), url);

        Ok(Fetched {
            bytes,
            content_type,
        })
    }
}

/// Caller-supplied locations that replace companion discovery.
#[derive(Clone, Debug, Default)]
pub struct CompanionOverrides {
    pub schema: Option<FilingSource>,
    pub presentation: Option<FilingSource>,
    pub labels: Option<FilingSource>,
}

/// Decoded filing text and whatever companion files could be found.
#[derive(Debug)]
pub struct FilingBundle {
    pub location: FilingSource,
    pub document: String,
    pub schema: Option<String>,
    pub presentation: Option<String>,
    pub labels: Option<String>,
    pub warnings: Warnings,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Companion {
    Schema,
    Presentation,
    Labels,
}

impl Companion {
    fn file_name(&self, stem: &str) -> String {
        match self {
            Companion::Schema => format!("{}.xsd", stem),
            Companion::Presentation => format!("{}_pre.xml", stem),
            Companion::Labels => format!("{}_lab.xml", stem),
        }
    }
}

pub struct DocumentLoader {
    fetcher: Arc<dyn Fetcher>,
    retry: RetryPolicy,
    cancel: CancelFlag,
}

impl DocumentLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, retry: RetryPolicy, cancel: CancelFlag) -> Self {
        Self {
            fetcher,
            retry,
            cancel,
        }
    }

    pub fn from_config(config: &EngineConfig, cancel: CancelFlag) -> Result<Self> {
        let fetcher = HttpFetcher::new(config)?;
        Ok(Self::new(
            Arc::new(fetcher),
            RetryPolicy::from_config(config),
            cancel,
        ))
    }

    /// Load the filing and its companions.
    ///
    /// Only the main document is required. A companion that was discovered but
    /// cannot be loaded becomes a `MissingLinkbase` warning, while an explicit
    /// override that cannot be loaded fails the run.
    pub async fn load(
        &self,
        source: &FilingSource,
        overrides: &CompanionOverrides,
    ) -> Result<FilingBundle> {
        log::info!("Loading filing from {}", source);
        let document = self.load_text(source).await?;

        let mut warnings = Warnings::new();
        let stem = SCHEMA_REF
            .captures(&document)
            .and_then(|c| c.get(1))
            .and_then(|m| source.join(m.as_str().trim()))
            .and_then(|schema| schema.stem())
            .or_else(|| source.stem());

        let schema = self
            .companion(source, stem.as_deref(), Companion::Schema, &overrides.schema, &mut warnings)
            .await?;
        let presentation = self
            .companion(
                source,
                stem.as_deref(),
                Companion::Presentation,
                &overrides.presentation,
                &mut warnings,
            )
            .await?;
        let labels = self
            .companion(source, stem.as_deref(), Companion::Labels, &overrides.labels, &mut warnings)
            .await?;

        Ok(FilingBundle {
            location: source.clone(),
            document,
            schema,
            presentation,
            labels,
            warnings,
        })
    }

    async fn companion(
        &self,
        source: &FilingSource,
        stem: Option<&str>,
        which: Companion,
        explicit: &Option<FilingSource>,
        warnings: &mut Warnings,
    ) -> Result<Option<String>> {
        if let Some(location) = explicit {
            return self.load_text(location).await.map(Some);
        }

        let Some(location) = stem.and_then(|stem| source.join(&which.file_name(stem))) else {
            log::debug!("No location to look for {:?} next to {}", which, source);
            return Ok(None);
        };

        match self.load_text(&location).await {
            Ok(text) => {
                log::info!("Loaded {:?} from {}", which, location);
                Ok(Some(text))
            }
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(e) => {
                warnings.push(Warning::MissingLinkbase {
                    location: location.to_string(),
                    reason: e.to_string(),
                });
                Ok(None)
            }
        }
    }

    async fn load_text(&self, source: &FilingSource) -> Result<String> {
        self.cancel.check()?;
        match source {
            FilingSource::Path(path) => {
                let bytes = tokio::fs::read(path).await?;
                Ok(decode_document(&bytes, None))
            }
            FilingSource::Url(url) => {
                let fetched = retry_with_backoff(url.as_str(), self.retry, &self.cancel, || {
                    self.fetcher.fetch(url)
                })
                .await?;
                Ok(decode_document(
                    &fetched.bytes,
                    fetched.content_type.as_deref(),
                ))
            }
        }
    }
}

/// Decode raw bytes to text.
///
/// The charset comes from the `Content-Type` header when present, then a
/// byte order mark, then a `<meta charset>` or XML declaration, and finally
/// statistical detection.
pub fn decode_document(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_from_content_type)
        .or_else(|| Encoding::for_bom(bytes).map(|(enc, _)| enc))
        .or_else(|| declared_charset(bytes))
        .unwrap_or_else(|| detect_charset(bytes));

    log::debug!("Decoding {} bytes as {}", bytes.len(), encoding.name());
    // `decode` strips a matching BOM itself.
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::debug!("Replaced malformed {} sequences", encoding.name());
    }
    text.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    let mime: mime::Mime = content_type.parse().ok()?;
    let charset = mime.get_param(mime::CHARSET)?;
    Encoding::for_label(charset.as_str().as_bytes())
}

fn declared_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_BYTES)]);
    XML_ENCODING
        .captures(&head)
        .or_else(|| META_CHARSET.captures(&head))
        .and_then(|c| c.get(1))
        .and_then(|m| Encoding::for_label(m.as_str().as_bytes()))
}

fn detect_charset(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return encoding_rs::UTF_8;
    }
    let (charset, confidence, _) = chardet::detect(bytes);
    log::debug!("Detected charset {} (confidence {:.2})", charset, confidence);
    Encoding::for_label(chardet::charset2encoding(&charset).as_bytes())
        .unwrap_or(encoding_rs::WINDOWS_1252)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned responses and records every requested URL.
    struct StubFetcher {
        pages: HashMap<String, std::result::Result<Fetched, AttemptError>>,
        requested: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn new(pages: Vec<(&str, std::result::Result<&str, AttemptError>)>) -> Self {
            let pages = pages
                .into_iter()
                .map(|(url, page)| {
                    let page = page.map(|body| Fetched {
                        bytes: body.as_bytes().to_vec(),
                        content_type: Some("text/html; charset=utf-8".to_string()),
                    });
                    (url.to_string(), page)
                })
                .collect();
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> std::result::Result<Fetched, AttemptError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url.as_str())
                .cloned()
                .unwrap_or_else(|| Err(AttemptError::Terminal("HTTP 404".to_string())))
        }
    }

    fn loader(fetcher: Arc<StubFetcher>, cancel: CancelFlag) -> DocumentLoader {
        DocumentLoader::new(
            fetcher,
            RetryPolicy {
                retries: 1,
                base_delay: Duration::from_millis(1),
            },
            cancel,
        )
    }

    const DOC: &str = r#"<html><body><ix:header><ix:references>
        <link:schemaRef xlink:type="simple" xlink:href="acme-20250630.xsd"/>
        </ix:references></ix:header></body></html>"#;

    #[test]
    fn test_source_parsing() {
        assert!(matches!(
            "https://www.sec.gov/a.htm".parse::<FilingSource>().unwrap(),
            FilingSource::Url(_)
        ));
        assert_eq!(
            "filings/a.htm".parse::<FilingSource>().unwrap(),
            FilingSource::Path(PathBuf::from("filings/a.htm"))
        );
        assert!("  ".parse::<FilingSource>().is_err());
    }

    #[test]
    fn test_join_and_stem() {
        let url: FilingSource = "https://www.sec.gov/Archives/1/acme-20250630.htm".parse().unwrap();
        assert_eq!(
            url.join("acme-20250630_pre.xml").unwrap().to_string(),
            "https://www.sec.gov/Archives/1/acme-20250630_pre.xml"
        );
        assert_eq!(url.stem().as_deref(), Some("acme-20250630"));

        let path: FilingSource = "data/acme.htm".parse().unwrap();
        assert_eq!(
            path.join("acme.xsd"),
            Some(FilingSource::Path(PathBuf::from("data/acme.xsd")))
        );
    }

    #[test]
    fn test_decode_respects_declared_charsets() {
        // "Café" in windows-1252.
        let latin = b"<html><head><meta charset=\"windows-1252\"></head>Caf\xe9</html>";
        assert!(decode_document(latin, None).contains("Café"));
        assert!(decode_document(b"Caf\xe9", Some("text/html; charset=ISO-8859-1")).contains("Café"));

        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>\xe9</a>";
        assert!(decode_document(xml, None).contains("<a>é</a>"));

        let bom = [&[0xEF, 0xBB, 0xBF][..], "Ünïcode".as_bytes()].concat();
        assert_eq!(decode_document(&bom, None), "Ünïcode");
    }

    #[tokio::test]
    async fn test_companions_follow_schema_ref() {
        let base = "https://www.sec.gov/Archives/1";
        let fetcher = Arc::new(StubFetcher::new(vec![
            ("https://www.sec.gov/Archives/1/doc.htm", Ok(DOC)),
            ("https://www.sec.gov/Archives/1/acme-20250630.xsd", Ok("<schema/>")),
            ("https://www.sec.gov/Archives/1/acme-20250630_pre.xml", Ok("<linkbase/>")),
        ]));
        let source: FilingSource = format!("{}/doc.htm", base).parse().unwrap();
        let bundle = loader(fetcher.clone(), CancelFlag::new())
            .load(&source, &CompanionOverrides::default())
            .await
            .unwrap();

        assert_eq!(bundle.schema.as_deref(), Some("<schema/>"));
        assert_eq!(bundle.presentation.as_deref(), Some("<linkbase/>"));
        assert!(bundle.labels.is_none());
        let warnings = bundle.warnings.into_vec();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            &warnings[0],
            Warning::MissingLinkbase { location, .. } if location.ends_with("acme-20250630_lab.xml")
        ));
    }

    #[tokio::test]
    async fn test_document_failure_is_fatal() {
        let fetcher = Arc::new(StubFetcher::new(vec![(
            "https://example.com/doc.htm",
            Err(AttemptError::Retryable("HTTP 503".to_string())),
        )]));
        let source: FilingSource = "https://example.com/doc.htm".parse().unwrap();
        let err = loader(fetcher.clone(), CancelFlag::new())
            .load(&source, &CompanionOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::FetchFailure { attempts: 2, .. }));
        assert_eq!(fetcher.requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_loader_fetches_nothing() {
        let fetcher = Arc::new(StubFetcher::new(vec![("https://example.com/doc.htm", Ok(DOC))]));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let source: FilingSource = "https://example.com/doc.htm".parse().unwrap();
        let err = loader(fetcher.clone(), cancel)
            .load(&source, &CompanionOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(fetcher.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_files_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("acme.htm");
        std::fs::write(&doc, DOC).unwrap();
        std::fs::write(dir.path().join("acme-20250630.xsd"), "<schema/>").unwrap();
        let labels = dir.path().join("custom_labels.xml");
        std::fs::write(&labels, "<labels/>").unwrap();

        let overrides = CompanionOverrides {
            labels: Some(FilingSource::Path(labels)),
            ..Default::default()
        };
        let fetcher = Arc::new(StubFetcher::new(vec![]));
        let bundle = loader(fetcher, CancelFlag::new())
            .load(&FilingSource::Path(doc), &overrides)
            .await
            .unwrap();
        assert_eq!(bundle.schema.as_deref(), Some("<schema/>"));
        assert_eq!(bundle.labels.as_deref(), Some("<labels/>"));
        assert!(bundle.presentation.is_none());
        assert_eq!(bundle.warnings.len(), 1);

        let missing = CompanionOverrides {
            schema: Some(FilingSource::Path(dir.path().join("nope.xsd"))),
            ..Default::default()
        };
        let fetcher = Arc::new(StubFetcher::new(vec![]));
        assert!(loader(fetcher, CancelFlag::new())
            .load(&FilingSource::Path(dir.path().join("acme.htm")), &missing)
            .await
            .is_err());
    }
}
