//! Action script parsing.
//!
//! A script is JSON lines: one `{"action": ..., "args": ...}` object per
//! line. Blank lines and lines starting with `#` are skipped.

use statebridge_types::ActionRequest;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::CliError;

/// Read every action request from `reader`.
pub async fn read_requests<R>(reader: R) -> Result<Vec<ActionRequest>, CliError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut requests = Vec::new();
    let mut line_number: usize = 0;

    while let Some(line) = lines.next_line().await? {
        line_number = line_number.saturating_add(1);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let request = serde_json::from_str(trimmed).map_err(|source| CliError::Script {
            line: line_number,
            source,
        })?;
        requests.push(request);
    }

    Ok(requests)
}
