//! Appends the generated manifests to an upstream multi-document YAML stream.
//!
//! The upstream stream is relayed byte for byte and always completely before anything is
//! generated, so objects defined upstream stay in front of the objects referencing them.
use std::io::{self, Read, Write};

use snafu::{ResultExt, Snafu};

use crate::{config::ResolvedConfig, template};

/// Written between the upstream documents and the generated ones.
///
/// The leading newline terminates an upstream stream which doesn't end with one.
pub const DOCUMENT_SEPARATOR: &[u8] = b"\n---\n";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to relay upstream documents"))]
    CopyUpstream { source: io::Error },

    #[snafu(display("failed to write YAML document separator"))]
    WriteSeparator { source: io::Error },

    #[snafu(display("failed to render manifest template"))]
    RenderTemplate { source: template::Error },

    #[snafu(display("failed to write generated manifests"))]
    WriteManifests { source: io::Error },

    #[snafu(display("failed to flush output"))]
    FlushOutput { source: io::Error },
}

/// Copies `upstream` to `output`, followed by [`DOCUMENT_SEPARATOR`] and the manifests rendered
/// for `config`.
///
/// Returns the number of upstream bytes relayed. Nothing is rendered if relaying fails.
pub fn compose<R, W>(mut upstream: R, mut output: W, config: &ResolvedConfig) -> Result<u64>
where
    R: Read,
    W: Write,
{
    let relayed = io::copy(&mut upstream, &mut output).context(CopyUpstreamSnafu)?;
    tracing::debug!(bytes = relayed, "relayed upstream documents");

    output
        .write_all(DOCUMENT_SEPARATOR)
        .context(WriteSeparatorSnafu)?;

    let manifests = template::render_manifests(config).context(RenderTemplateSnafu)?;
    output
        .write_all(manifests.as_bytes())
        .context(WriteManifestsSnafu)?;

    output.flush().context(FlushOutputSnafu)?;
    Ok(relayed)
}
