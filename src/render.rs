use std::fmt::Write;

use crate::app::{Snapshot, UploadState};
use crate::upload::PiiMatches;

/// Resolve the opaque download reference against the service origin.
pub fn resolve_download_url(origin: &str, reference: &str) -> String {
    match reqwest::Url::parse(origin).and_then(|base| base.join(reference)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{}{reference}", origin.trim_end_matches('/')),
    }
}

fn write_pii(out: &mut String, pii: &PiiMatches) {
    if pii.is_empty() {
        out.push_str("  (none)\n");
        return;
    }
    for (category, values) in pii {
        let _ = writeln!(out, "  {category}:");
        for value in values {
            let _ = writeln!(out, "    {value}");
        }
    }
}

/// Text panel for one snapshot.
pub fn render(snapshot: &Snapshot, origin: &str) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "── channel: {} │ level: {} │ {}",
        snapshot.connection,
        snapshot.level,
        if snapshot.busy { "Processing..." } else { "ready" }
    );
    if let Some(error) = &snapshot.error_message {
        let _ = writeln!(out, "Error: {error}");
    }
    if let Some(alert) = &snapshot.alert_notice {
        let _ = writeln!(out, "Alert: {alert}");
    }

    match &snapshot.upload {
        UploadState::Idle => {}
        UploadState::Pending => out.push_str("Upload: pending\n"),
        UploadState::Failed(reason) => {
            let _ = writeln!(out, "Upload failed: {reason}");
        }
        UploadState::Succeeded(result) => {
            let _ = writeln!(out, "Original Text:\n{}", result.original_text.trim_end());
            let _ = writeln!(out, "Redacted Text:\n{}", result.redacted_text.trim_end());
            out.push_str("Detected PII:\n");
            write_pii(&mut out, &result.detected_pii);
            if let Some(reference) = &result.redacted_file_url {
                let _ = writeln!(out, "Download: {}", resolve_download_url(origin, reference));
            }
        }
    }

    if snapshot.session_active {
        out.push_str("Live transcription: on");
        if let Some(status) = &snapshot.remote_status {
            let _ = write!(out, " ({status})");
        }
        out.push('\n');
        if !snapshot.transcript.is_empty() {
            let _ = writeln!(out, "Transcribed Text:\n{}", snapshot.transcript);
        }
        if !snapshot.transcription_log.is_empty() {
            out.push_str("Detected PII in Transcription:\n");
            for logged in &snapshot.transcription_log {
                let _ = writeln!(
                    out,
                    "  [{}] {}: {}",
                    logged.received_at.format("%H:%M:%S"),
                    logged.alert.pii_type,
                    logged.alert.value
                );
            }
        }
    } else {
        out.push_str("Live transcription: off\n");
    }

    out
}
