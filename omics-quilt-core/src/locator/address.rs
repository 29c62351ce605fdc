use crate::{QuiltError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const SCHEME_SEPARATOR: &str = "://";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    File,
    ObjectStore,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::File => "file",
            Scheme::ObjectStore => "s3",
        }
    }
}

/// Storage-agnostic address of a single resource.
///
/// A `file` address keeps the local path in `key` and has an empty container.
/// An object-store address names its bucket in `container`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceAddress {
    scheme: Scheme,
    container: String,
    key: String,
    substitution_context: Map<String, Value>,
}

impl ResourceAddress {
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(Scheme::File, "", path)
    }

    pub fn object(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(Scheme::ObjectStore, container, key)
    }

    fn new(scheme: Scheme, container: impl Into<String>, key: impl Into<String>) -> Self {
        let container = container.into();
        let scheme = if container.is_empty() {
            Scheme::File
        } else {
            scheme
        };

        Self {
            scheme,
            container,
            key: key.into(),
            substitution_context: Map::new(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let Some((scheme, rest)) = uri.split_once(SCHEME_SEPARATOR) else {
            return Ok(Self::file(uri));
        };

        if scheme.is_empty() || scheme == "file" {
            return Ok(Self::file(rest));
        }

        if scheme.starts_with('/') || scheme.starts_with('.') {
            return Ok(Self::file(uri));
        }

        if scheme == "s3" {
            let (container, key) = rest.split_once('/').unwrap_or((rest, ""));
            return Ok(Self::object(container, strip_relative_prefix(key)));
        }

        Err(QuiltError::UnsupportedScheme(scheme.to_string()))
    }

    pub fn with_substitution_context(mut self, context: Map<String, Value>) -> Self {
        self.substitution_context = context;
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn substitution_context(&self) -> &Map<String, Value> {
        &self.substitution_context
    }

    pub fn is_file(&self) -> bool {
        self.scheme == Scheme::File
    }

    pub fn to_uri(&self) -> String {
        match self.scheme {
            Scheme::ObjectStore => format!("s3://{}/{}", self.container, self.key),
            Scheme::File => self.key.clone(),
        }
    }

    /// Last segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or_default()
    }

    /// Text after the last `.` of the file name; empty when it has none.
    pub fn extension(&self) -> &str {
        self.file_name()
            .rsplit_once('.')
            .map(|(_, extension)| extension)
            .unwrap_or_default()
    }

    pub fn with_extension(&self, extension: &str) -> Self {
        let stem_len = match self.file_name().rsplit_once('.') {
            Some((stem, _)) => self.key.len() - self.file_name().len() + stem.len(),
            None => self.key.len(),
        };
        self.with_key(format!("{}.{}", &self.key[..stem_len], extension))
    }

    pub fn parent(&self) -> Self {
        let key = match self.key.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
        self.with_key(key)
    }

    pub fn join(&self, segment: &str) -> Self {
        let base = self.key.trim_end_matches('/');
        let segment = segment.trim_start_matches('/');
        let key = if base.is_empty() && !self.is_file() {
            segment.to_string()
        } else if base.is_empty() && self.key.starts_with('/') {
            format!("/{}", segment)
        } else if base.is_empty() {
            segment.to_string()
        } else {
            format!("{}/{}", base, segment)
        };
        self.with_key(key)
    }

    /// Sibling whose key is this key followed by `suffix`.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        self.with_key(format!("{}{}", self.key, suffix))
    }

    pub(crate) fn with_key(&self, key: String) -> Self {
        Self {
            scheme: self.scheme,
            container: self.container.clone(),
            key,
            substitution_context: self.substitution_context.clone(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

fn strip_relative_prefix(key: &str) -> &str {
    let dots = key.len() - key.trim_start_matches('.').len();
    if dots > 0 && key[dots..].starts_with('/') {
        &key[dots + 1..]
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_store_uri() {
        let address = ResourceAddress::parse("s3://bucket/fastq/us-west-2/us-west-2.json").unwrap();
        assert_eq!(address.scheme(), Scheme::ObjectStore);
        assert_eq!(address.container(), "bucket");
        assert_eq!(address.key(), "fastq/us-west-2/us-west-2.json");
        assert_eq!(address.extension(), "json");
    }

    #[test]
    fn test_parse_strips_relative_prefix_from_object_key() {
        let address = ResourceAddress::parse("s3://bucket/./runs/input.json").unwrap();
        assert_eq!(address.key(), "runs/input.json");
        assert_eq!(address.to_uri(), "s3://bucket/runs/input.json");

        let address = ResourceAddress::parse("s3://bucket/../runs/input.json").unwrap();
        assert_eq!(address.key(), "runs/input.json");
    }

    #[test]
    fn test_parse_file_forms() {
        for uri in ["./workflows/fastq/aws_region.json", "/tmp/manifest.yaml", "manifest.json"] {
            let address = ResourceAddress::parse(uri).unwrap();
            assert!(address.is_file());
            assert_eq!(address.container(), "");
            assert_eq!(address.to_uri(), uri);
        }

        let address = ResourceAddress::parse("file:///tmp/manifest.json").unwrap();
        assert!(address.is_file());
        assert_eq!(address.key(), "/tmp/manifest.json");
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        let error = ResourceAddress::parse("gs://bucket/key.json").unwrap_err();
        assert!(matches!(error, QuiltError::UnsupportedScheme(scheme) if scheme == "gs"));
    }

    #[test]
    fn test_round_trip() {
        for uri in [
            "s3://bucket/a/b/c.json",
            "s3://bucket/a.yaml",
            "/var/data/manifest.json",
            "relative/dir/file.yml",
        ] {
            assert_eq!(ResourceAddress::parse(uri).unwrap().to_uri(), uri);
        }
    }

    #[test]
    fn test_empty_container_is_always_file() {
        let address = ResourceAddress::object("", "key.json");
        assert_eq!(address.scheme(), Scheme::File);
    }

    #[test]
    fn test_derived_paths() {
        let address = ResourceAddress::parse("s3://bucket/fastq/us-west-2/sample.json").unwrap();
        assert_eq!(address.parent().key(), "fastq/us-west-2");
        assert_eq!(address.with_extension("yaml").key(), "fastq/us-west-2/sample.yaml");
        assert_eq!(address.parent().join("run").key(), "fastq/us-west-2/run");
        assert_eq!(address.with_suffix(".bak").key(), "fastq/us-west-2/sample.json.bak");

        let root = ResourceAddress::parse("s3://bucket").unwrap();
        assert_eq!(root.join("NA12878.json").to_uri(), "s3://bucket/NA12878.json");

        let versioned = ResourceAddress::parse("s3://bucket/dir.v2/manifest").unwrap();
        assert_eq!(versioned.file_name(), "manifest");
        assert_eq!(versioned.extension(), "");
        assert_eq!(versioned.with_extension("json").key(), "dir.v2/manifest.json");
        assert_eq!(ResourceAddress::file("README").extension(), "");

        let local = ResourceAddress::parse("./").unwrap();
        assert_eq!(local.join("NA12878.json").key(), "./NA12878.json");
    }
}
