use common::config::AwsConfig;
use common::{Error, Result};
use dashmap::DashMap;
use datafusion::execution::context::SessionContext;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use std::sync::Arc;
use url::{ParseError, Url};

/// A root inside an object store: the store itself, its base URL and the key
/// prefix every table or input path is resolved under.
#[derive(Clone, Debug)]
pub struct StorageLocation {
    pub url: Url,
    pub store: Arc<dyn ObjectStore>,
    pub prefix: Path,
}

impl StorageLocation {
    /// Resolves a `/`-separated relative path under the prefix.
    pub fn join(&self, relative: impl AsRef<str>) -> Path {
        relative
            .as_ref()
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.prefix.clone(), |path, part| path.child(part))
    }

    /// Path of `path` relative to the prefix, or `None` if it lies outside it.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let parts: Vec<String> = path
            .prefix_match(&self.prefix)?
            .map(|part| part.as_ref().to_string())
            .collect();
        Some(parts.join("/"))
    }

    /// Full URL of `path`, as understood by the DataFusion runtime.
    pub fn url_for(&self, path: &Path) -> String {
        format!("{}{}", self.url, path)
    }
}

#[derive(Clone)]
pub struct StoreManager {
    aws: Option<AwsConfig>,
    store_cache: Arc<DashMap<String, Arc<dyn ObjectStore>>>,
}

impl StoreManager {
    pub fn new(aws: Option<AwsConfig>) -> Self {
        Self {
            aws,
            store_cache: Arc::new(DashMap::new()),
        }
    }

    /// Accepts a bare local path, a `file://` URL or an `s3://bucket/prefix` URL.
    pub fn resolve(&self, location: &str) -> Result<StorageLocation> {
        match Url::parse(location) {
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::InvalidInput(format!("Invalid file URL '{}'", location)))?;
                self.local(&path)
            }
            Ok(url) if matches!(url.scheme(), "s3" | "s3a") => self.s3(&url),
            Ok(url) => Err(Error::InvalidInput(format!(
                "Unsupported storage scheme '{}' in '{}'",
                url.scheme(),
                location
            ))),
            Err(ParseError::RelativeUrlWithoutBase) => self.local(std::path::Path::new(location)),
            Err(e) => Err(e.into()),
        }
    }

    /// Makes the location's store reachable from DataFusion reads and writes.
    pub fn register_object_store(&self, ctx: &SessionContext, location: &StorageLocation) {
        ctx.runtime_env()
            .register_object_store(&location.url, location.store.clone());
    }

    fn local(&self, path: &std::path::Path) -> Result<StorageLocation> {
        let absolute = std::path::absolute(path)?;
        let prefix = Path::from_absolute_path(&absolute).map_err(|e| {
            Error::InvalidInput(format!("Invalid local path '{}': {}", absolute.display(), e))
        })?;

        let store = self
            .store_cache
            .entry("file://".to_string())
            .or_insert_with(|| Arc::new(LocalFileSystem::new()) as Arc<dyn ObjectStore>)
            .clone();

        Ok(StorageLocation {
            url: Url::parse("file:///")?,
            store,
            prefix,
        })
    }

    fn s3(&self, url: &Url) -> Result<StorageLocation> {
        let bucket = url
            .host_str()
            .ok_or_else(|| Error::InvalidInput(format!("Missing bucket in '{}'", url)))?;
        let store = self.get_object_store(bucket)?;
        let base = Url::parse(&format!("{}://{}/", url.scheme(), bucket))?;

        let prefix = url
            .path()
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(Path::default(), |path, part| path.child(part));

        Ok(StorageLocation {
            url: base,
            store,
            prefix,
        })
    }

    pub fn get_object_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        if let Some(store) = self.store_cache.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(aws) = &self.aws {
            builder = builder
                .with_access_key_id(&aws.access_key)
                .with_secret_access_key(&aws.secret_key)
                .with_region(&aws.region)
                .with_allow_http(aws.allow_http);
            if let Some(endpoint) = &aws.endpoint {
                builder = builder.with_endpoint(endpoint);
            }
        }

        let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
        self.store_cache.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}
