//! JSON-lines ingestion of tagged engine messages

use crate::service::{EngineServices, Handled};
use anyhow::{Context, Result};
use league_core::EngineMessage;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LineError {
    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Tally of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub lines: usize,
    pub malformed: usize,
    pub scored: usize,
    pub claims: usize,
    pub rules: usize,
    pub standings: usize,
    pub refused: usize,
    pub ignored: usize,
}

impl IngestSummary {
    fn record(&mut self, handled: &Handled) {
        match handled {
            Handled::Scored { .. } => self.scored += 1,
            Handled::ClaimQueued(_) => self.claims += 1,
            Handled::RulesPublished { .. } => self.rules += 1,
            Handled::StandingsRecorded { .. } => self.standings += 1,
            Handled::Refused => self.refused += 1,
            Handled::Ignored => self.ignored += 1,
        }
    }
}

/// Parse one non-empty line
pub fn parse_line(line: usize, text: &str) -> Result<EngineMessage, LineError> {
    serde_json::from_str(text).map_err(|source| LineError::Malformed { line, source })
}

pub async fn ingest_file(services: &EngineServices, path: &Path) -> Result<IngestSummary> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {:?}", path))?;
    let summary = ingest_reader(services, BufReader::new(file)).await?;
    info!(
        "Ingested {:?}: {} lines, {} stat events, {} claims, {} rule sets, {} refused, {} malformed",
        path, summary.lines, summary.scored, summary.claims, summary.rules, summary.refused, summary.malformed
    );
    Ok(summary)
}

/// Messages are handled in file order; malformed lines are skipped
pub async fn ingest_reader<R>(services: &EngineServices, reader: R) -> Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();
    let mut number = 0;

    while let Some(text) = lines.next_line().await.context("Failed to read input")? {
        number += 1;
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        summary.lines += 1;

        match parse_line(number, text) {
            Ok(message) => {
                let handled = services.handle(message).await?;
                summary.record(&handled);
            }
            Err(e) => {
                warn!("Skipping malformed message: {}", e);
                summary.malformed += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_reports_position() {
        let message = parse_line(
            1,
            r#"{"type":"claim_submission","leagueId":1,"teamId":2,"targetPlayerId":3,"bidAmount":4,"submittedAt":"2025-09-17T08:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(message, EngineMessage::ClaimSubmission(ref c) if c.drop_player_id.is_none()));

        let err = parse_line(7, r#"{"type":"stat_event","gameId":1}"#).unwrap_err();
        assert!(err.to_string().starts_with("line 7:"));
    }
}
