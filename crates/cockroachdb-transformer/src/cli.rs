//! Command line and environment options.
//!
//! Every option can be supplied as a flag or through the environment variable the transformer
//! has always been configured with, which is how pipeline runners usually inject them.
use clap::Parser;

/// Environment variable holding the log filter, see [`crate::logging::initialize_logging`].
pub const LOG_ENV_VAR: &str = "COCKROACHDB_TRANSFORMER_LOG";

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(
    name = "cockroachdb-transformer",
    version,
    about = "Appends the manifests of a CockroachDB cluster to the YAML documents read from stdin"
)]
pub struct TransformerOptions {
    /// The cluster configuration document.
    ///
    /// Only `metadata.name` and `spec.replicas` are read, all other fields are ignored.
    #[arg(long, env = "API_CONFIG", value_name = "YAML", allow_hyphen_values = true)]
    pub api_config: String,

    /// The replica count used if the configuration document doesn't set `spec.replicas`.
    ///
    /// Must be a decimal integer. Defaults to 1 if unset or empty.
    #[arg(long, env = "REPLICAS", value_name = "COUNT", allow_hyphen_values = true)]
    pub default_replicas: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        TransformerOptions::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let options = TransformerOptions::try_parse_from([
            "cockroachdb-transformer",
            "--api-config",
            "---\nmetadata:\n  name: mydb\n",
            "--default-replicas",
            "-1",
        ])
        .unwrap();

        assert_eq!(options, TransformerOptions {
            api_config: "---\nmetadata:\n  name: mydb\n".to_owned(),
            default_replicas: Some("-1".to_owned()),
        });
    }

    #[test]
    fn keeps_default_replicas_unparsed() {
        let options = TransformerOptions::try_parse_from([
            "cockroachdb-transformer",
            "--api-config=metadata: {name: mydb}",
            "--default-replicas=abc",
        ])
        .unwrap();

        assert_eq!(options.default_replicas.as_deref(), Some("abc"));
    }
}
