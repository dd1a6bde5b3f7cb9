//! Writes the service's OpenAPI document to stdout, or to a file when
//! invoked with `--output <path>`.

use std::{env, fs, path::PathBuf, process};

use anyhow::{bail, Context, Result};
use utoipa::OpenApi;
use vertical_garden_service::api::handlers::ApiDoc;

fn main() {
    if let Err(e) = run() {
        eprintln!("generate_openapi: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let json = ApiDoc::openapi()
        .to_pretty_json()
        .context("serialising the OpenAPI document")?;

    let mut args = env::args().skip(1);
    let output = match args.next() {
        Some(flag) if flag == "--output" => {
            let path = args.next().context("--output requires a path")?;
            Some(PathBuf::from(path))
        }
        Some(other) => bail!("unrecognized argument {other:?}"),
        None => None,
    };

    match output {
        Some(path) => {
            fs::write(&path, &json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Wrote OpenAPI document to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
