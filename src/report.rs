//! Session reporting: sanitized delegate messages, a human summary, and the
//! machine-readable JSON report.
use crate::blame::BlameOutcome;
use crate::controller::{SessionOutcome, StopReason};
use crate::label::Verdict;
use anyhow::{Context, Result};
use std::io::Write;

/// Strip author e-mail addresses from a delegate message and, with a base
/// URL, turn `changeset:` lines into links.
pub fn sanitize_changeset_message(message: &str, url_base: Option<&str>) -> String {
    message
        .split('\n')
        .map(|line| {
            if line.contains('<') && line.contains('@') && line.contains('>') {
                let mut words: Vec<&str> = line.split(' ').collect();
                words.pop();
                return words.join(" ");
            }
            match (url_base, line.strip_prefix("changeset:")) {
                (Some(base), Some(rest)) => {
                    let hash = rest.rsplit(':').next().unwrap_or(rest).trim();
                    format!("changeset:   {base}{hash}")
                }
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Log the outcome the way an operator reads it at the end of a run.
pub fn log_summary(outcome: &SessionOutcome) {
    tracing::info!(
        range = %outcome.original_range,
        narrowed_to = %outcome.final_range,
        iterations = outcome.iterations,
        skips = outcome.skips,
        good = outcome.labels.count(Verdict::Good),
        bad = outcome.labels.count(Verdict::Bad),
        skipped = outcome.labels.count(Verdict::Skip),
        "bisection finished"
    );
    match &outcome.stop {
        StopReason::Blamed { verdict, rev } => {
            tracing::info!(rev = %rev, verdict = %verdict, "the first {verdict} revision was found");
        }
        StopReason::Ambiguous {
            verdict,
            candidates,
        } => {
            tracing::info!(
                verdict = %verdict,
                candidates = candidates.len(),
                "skipped revisions hide the first {verdict} revision"
            );
            for rev in candidates {
                tracing::info!(rev = %rev, "candidate");
            }
        }
        StopReason::SkipOverflow { skips } => {
            tracing::warn!(
                skips,
                "too many revisions were skipped; a linear scan of the remaining range is cheaper"
            );
        }
    }

    let Some(blame) = &outcome.blame else {
        return;
    };
    for line in blame.explanation() {
        match blame.outcome {
            BlameOutcome::Trustworthy => tracing::info!("{line}"),
            BlameOutcome::Contradicted | BlameOutcome::Incomplete => tracing::warn!("{line}"),
        }
    }
    if let Some(advice) = blame.recommendation() {
        tracing::info!("{advice}");
    }
}

pub fn write_json(outcome: &SessionOutcome, mut out: impl Write) -> Result<()> {
    let text = serde_json::to_string_pretty(outcome).context("serialize session report")?;
    writeln!(out, "{text}").context("write session report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::BlameReport;
    use crate::label::{Label, LabelHistory};
    use crate::revision::{BisectionRange, RevisionId};

    const MESSAGE: &str = "The first bad revision is:\n\
changeset:   52121:573c5fa45cc4\n\
user:        Jane Dev <jane@example.com>\n\
date:        Tue Mar 03 10:00:00 2020 +0000\n\
summary:     Bug 123 - Break the parser";

    #[test]
    fn sanitize_drops_email_addresses() {
        let clean = sanitize_changeset_message(MESSAGE, None);
        assert!(clean.contains("user:        Jane Dev\n"));
        assert!(!clean.contains("jane@example.com"));
        assert!(clean.contains("changeset:   52121:573c5fa45cc4"));
        assert!(clean.contains("summary:     Bug 123 - Break the parser"));
    }

    #[test]
    fn sanitize_links_changesets_with_url_base() {
        let clean =
            sanitize_changeset_message(MESSAGE, Some("https://hg.example.org/central/rev/"));
        assert!(clean.contains("changeset:   https://hg.example.org/central/rev/573c5fa45cc4"));
    }

    fn outcome() -> SessionOutcome {
        let good = RevisionId::new("aaaaaaaaaaaa");
        let bad = RevisionId::new("bbbbbbbbbbbb");
        let mut labels = LabelHistory::new();
        labels.record(&good, Label::good("Exit code 0"));
        labels.record(&bad, Label::bad("Negative exit code -11"));
        SessionOutcome {
            original_range: BisectionRange::new(good.clone(), bad.clone()),
            final_range: BisectionRange::new(good.clone(), bad.clone()),
            stop: StopReason::Blamed {
                verdict: Verdict::Bad,
                rev: bad.clone(),
            },
            blame: Some(BlameReport {
                blamed_rev: bad.clone(),
                blamed_verdict: Verdict::Bad,
                parents: vec![good, RevisionId::new("cccccccccccc")],
                outcome: BlameOutcome::Trustworthy,
                common_ancestor: None,
                common_ancestor_label: None,
            }),
            labels,
            iterations: 2,
            skips: 0,
        }
    }

    #[test]
    fn json_report_carries_stop_reason_and_labels() {
        let mut buffer = Vec::new();
        write_json(&outcome(), &mut buffer).expect("write");
        let value: serde_json::Value = serde_json::from_slice(&buffer).expect("json");
        assert_eq!(value["stop"]["kind"], "blamed");
        assert_eq!(value["stop"]["rev"], "bbbbbbbbbbbb");
        assert_eq!(value["blame"]["outcome"], "trustworthy");
        assert_eq!(value["labels"]["aaaaaaaaaaaa"]["verdict"], "good");
        assert_eq!(value["final_range"]["end"], "bbbbbbbbbbbb");
    }
}
