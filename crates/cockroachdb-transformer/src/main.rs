use std::io::{BufWriter, stdin, stdout};

use clap::Parser;
use cockroachdb_transformer::{
    cli::{LOG_ENV_VAR, TransformerOptions},
    logging,
};
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "cockroachdb-transformer";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitLogging { source: logging::Error },

    #[snafu(display("failed to transform manifests"))]
    Transform {
        source: cockroachdb_transformer::Error,
    },
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let options = TransformerOptions::parse();
    logging::initialize_logging(LOG_ENV_VAR, APP_NAME).context(InitLoggingSnafu)?;

    let output = BufWriter::new(stdout().lock());
    cockroachdb_transformer::run(&options, stdin().lock(), output).context(TransformSnafu)?;

    Ok(())
}
