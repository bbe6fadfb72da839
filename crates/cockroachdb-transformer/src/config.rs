//! Resolution of the user supplied cluster configuration.
//!
//! The configuration document is decoded permissively: only `metadata.name` and `spec.replicas`
//! are read, any other key is ignored. The replica count is then resolved with the following
//! precedence:
//!
//! 1. `spec.replicas` from the document, if present.
//! 2. The default replica count (usually the `REPLICAS` environment variable), if non-empty.
//! 3. [`FALLBACK_REPLICAS`].
//!
//! No bounds are enforced on the replica count, zero and negative values are passed through.
use std::num::ParseIntError;

use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};
use strum::Display;

/// The replica count used when neither the document nor the environment provide one.
pub const FALLBACK_REPLICAS: i64 = 1;

/// Appended to the cluster name to form the `app` label of every generated object, see
/// [`ResolvedConfig::app_label`].
pub const APP_LABEL_SUFFIX: &str = "-cockroachdb";

/// Appended to the cluster name to form the name of the client facing Service.
pub const PUBLIC_SERVICE_SUFFIX: &str = "-public";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the configuration document is empty"))]
    EmptyDocument,

    #[snafu(display("failed to parse the configuration document"))]
    ParseDocument { source: serde_yaml::Error },

    #[snafu(display("failed to parse default replica count {value:?} as integer"))]
    InvalidDefaultReplicas {
        source: ParseIntError,
        value: String,
    },
}

/// The configuration document as written by the user.
///
/// Every field is optional, unknown fields are ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct InputDocument {
    pub metadata: Option<InputMetadata>,
    pub spec: Option<InputSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct InputMetadata {
    /// Name of the Services and the StatefulSet.
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct InputSpec {
    /// Number of StatefulSet replicas.
    pub replicas: Option<i64>,
}

impl InputDocument {
    /// Decodes the first YAML document of `document`, any following documents are ignored.
    ///
    /// An explicit `null` document is treated like a document without any fields. Input without
    /// any document, e.g. only whitespace or comments, is an error.
    pub fn from_yaml_str(document: &str) -> Result<Self> {
        let first = serde_yaml::Deserializer::from_str(document)
            .next()
            .context(EmptyDocumentSnafu)?;

        let document = Option::<Self>::deserialize(first).context(ParseDocumentSnafu)?;
        Ok(document.unwrap_or_default())
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.as_ref()?.name.as_deref()
    }

    pub fn replicas(&self) -> Option<i64> {
        self.spec.as_ref()?.replicas
    }
}

/// Where the resolved replica count came from.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum ReplicaSource {
    Document,
    DefaultReplicas,
    Fallback,
}

/// Picks the replica count according to the precedence documented on this module.
///
/// `default_replicas` is only parsed when `explicit` is [`None`], so an invalid default is not
/// an error as long as the document sets `spec.replicas`.
pub fn resolve_replicas(
    explicit: Option<i64>,
    default_replicas: Option<&str>,
) -> Result<(i64, ReplicaSource)> {
    if let Some(replicas) = explicit {
        return Ok((replicas, ReplicaSource::Document));
    }

    match default_replicas.filter(|value| !value.is_empty()) {
        Some(value) => {
            let replicas = value
                .parse()
                .context(InvalidDefaultReplicasSnafu { value })?;
            Ok((replicas, ReplicaSource::DefaultReplicas))
        }
        None => Ok((FALLBACK_REPLICAS, ReplicaSource::Fallback)),
    }
}

/// The fully resolved values the manifests are rendered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConfig {
    name: String,
    replicas: i64,
}

impl ResolvedConfig {
    pub fn new(name: impl Into<String>, replicas: i64) -> Self {
        Self {
            name: name.into(),
            replicas,
        }
    }

    /// Decodes `document` and resolves it against `default_replicas`.
    pub fn resolve(document: &str, default_replicas: Option<&str>) -> Result<Self> {
        let input = InputDocument::from_yaml_str(document)?;
        Self::from_input(&input, default_replicas)
    }

    pub fn from_input(input: &InputDocument, default_replicas: Option<&str>) -> Result<Self> {
        let (replicas, source) = resolve_replicas(input.replicas(), default_replicas)?;
        let name = input.name().unwrap_or_default();

        if name.is_empty() {
            tracing::warn!("configuration has no metadata.name, rendering objects with empty names");
        }

        tracing::debug!(name, replicas, %source, "resolved cluster configuration");
        Ok(Self::new(name, replicas))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn replicas(&self) -> i64 {
        self.replicas
    }

    /// The value of the `app` label, e.g. `mydb-cockroachdb`.
    pub fn app_label(&self) -> String {
        format!("{name}{APP_LABEL_SUFFIX}", name = self.name)
    }

    /// The name of the client facing Service, e.g. `mydb-public`.
    pub fn public_service_name(&self) -> String {
        format!("{name}{PUBLIC_SERVICE_SUFFIX}", name = self.name)
    }
}
