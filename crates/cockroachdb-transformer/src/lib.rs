//! A kpt style transformer which appends the objects of a CockroachDB cluster to a stream of
//! Kubernetes manifests.
//!
//! The cluster is described by a small configuration document:
//!
//! ```yaml
//! metadata:
//!   name: mydb
//! spec:
//!   replicas: 3
//! ```
//!
//! [`run`] resolves that document (see [`config`]) and then relays the upstream documents
//! followed by the generated Services, PodDisruptionBudget and StatefulSet (see [`compose`]).
//!
//! ```
//! use cockroachdb_transformer::{cli::TransformerOptions, run};
//!
//! let options = TransformerOptions {
//!     api_config: "metadata:\n  name: mydb\n".to_owned(),
//!     default_replicas: Some("3".to_owned()),
//! };
//!
//! let mut output = Vec::new();
//! run(&options, &b"A\n"[..], &mut output).unwrap();
//! assert!(output.starts_with(b"A\n\n---\n"));
//! ```
use std::io::{Read, Write};

use snafu::{ResultExt, Snafu};

use crate::{cli::TransformerOptions, config::ResolvedConfig};

pub mod cli;
pub mod compose;
pub mod config;
pub mod logging;
pub mod template;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to resolve cluster configuration"))]
    ResolveConfig { source: config::Error },

    #[snafu(display("failed to compose output stream"))]
    ComposeStream { source: compose::Error },
}

/// Resolves the configuration in `options` and writes `upstream` plus the generated manifests to
/// `output`.
///
/// The configuration is resolved before `upstream` is touched, a configuration error therefore
/// leaves both streams untouched.
pub fn run<R, W>(options: &TransformerOptions, upstream: R, output: W) -> Result<ResolvedConfig>
where
    R: Read,
    W: Write,
{
    let config = ResolvedConfig::resolve(&options.api_config, options.default_replicas.as_deref())
        .context(ResolveConfigSnafu)?;

    compose::compose(upstream, output, &config).context(ComposeStreamSnafu)?;

    tracing::info!(
        name = config.name(),
        replicas = config.replicas(),
        "generated cockroachdb manifests"
    );
    Ok(config)
}
