use tracing::info;

use super::VoiceNotifier;
use crate::pipeline::RunSummary;

/// Logs announcements instead of speaking them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogVoice;

impl VoiceNotifier for LogVoice {
    fn announce(&self, text: &str) {
        info!(target: "satwatch::voice", "{text}");
    }
}

/// Drops announcements.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentVoice;

impl VoiceNotifier for SilentVoice {
    fn announce(&self, _text: &str) {}
}

/// Opening line of a run announcement.
pub fn alert_text(summary: &RunSummary) -> String {
    if summary.anomaly_count > 0 {
        format!(
            "Nightly run complete. {} anomalies detected out of {} packets.",
            summary.anomaly_count, summary.total_packets
        )
    } else {
        format!(
            "Nightly run complete. No anomalies detected in {} packets.",
            summary.total_packets
        )
    }
}

/// Announce a committed run: the alert, then the briefing itself.
pub fn announce_run(voice: &dyn VoiceNotifier, summary: &RunSummary, briefing: &str) {
    voice.announce(&alert_text(summary));
    voice.announce("Here is the mission briefing.");
    voice.announce(briefing);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SummaryStats;
    use crate::pipeline::run_state::ArtifactPaths;
    use chrono::{FixedOffset, TimeZone};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl VoiceNotifier for Recorder {
        fn announce(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    fn summary(anomaly_count: usize) -> RunSummary {
        let stats = SummaryStats {
            features: Default::default(),
            total_packets: 500,
            anomaly_count,
            baseline_rows: 500 - anomaly_count,
        };
        let ts = FixedOffset::east_opt(19_800)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 14, 2, 0, 5)
            .unwrap();
        let path = PathBuf::from("x");
        RunSummary::new(
            Uuid::nil(),
            ts,
            stats,
            ArtifactPaths {
                bin_file: path.clone(),
                csv_file: path.clone(),
                model_file: path.clone(),
                report_file: path,
            },
        )
    }

    #[test]
    fn test_announcement_reads_briefing() {
        let voice = Recorder::default();
        announce_run(&voice, &summary(4), "- Processed 500 telemetry packets.");
        let said = voice.0.into_inner().unwrap();
        assert_eq!(
            said,
            [
                "Nightly run complete. 4 anomalies detected out of 500 packets.",
                "Here is the mission briefing.",
                "- Processed 500 telemetry packets.",
            ]
        );
    }

    #[test]
    fn test_quiet_night_wording() {
        assert_eq!(
            alert_text(&summary(0)),
            "Nightly run complete. No anomalies detected in 500 packets."
        );
    }
}
