//! Input helpers: read from a file or stdin.

use std::path::Path;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncReadExt, BufReader};

/// Read the whole input as text.
pub async fn read_to_string(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("reading stdin")?;
            Ok(text)
        }
    }
}

/// Open the input for line-by-line reading.
pub async fn open_lines(file: Option<&Path>) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin>> {
    let reader: Box<dyn AsyncBufRead + Unpin> = match file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    Ok(reader)
}
