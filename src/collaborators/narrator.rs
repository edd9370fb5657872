use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use super::Narrator;
use crate::analysis::{FeatureSummary, QueryContext, SummaryStats, TopAnomaly};
use crate::config::NarratorConfig;
use crate::pipeline::RunSummary;

/// Deterministic narration assembled from the run numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineNarrator;

/// Largest absolute body rate across the three gyro axes.
fn rate_bound(f: &FeatureSummary) -> f64 {
    [f.gyro_x, f.gyro_y, f.gyro_z]
        .iter()
        .map(|g| g.min.abs().max(g.max.abs()))
        .fold(0.0, f64::max)
}

/// Feature names an operator question touches, by keyword.
fn topics(question: &str) -> Vec<&'static str> {
    const KEYWORDS: [(&str, &[&str]); 5] = [
        ("battery_v", &["battery", "power", "voltage", "battery_v"]),
        ("panel_i", &["panel", "current", "solar", "power", "panel_i"]),
        ("temp_c", &["temp", "thermal", "heat", "temp_c"]),
        ("gyro", &["gyro", "attitude", "rate", "spin", "rotation"]),
        ("mode", &["mode", "safe", "maneuver"]),
    ];
    let q = question.to_lowercase();
    let mut names = Vec::new();
    for (feature, words) in KEYWORDS {
        if words.iter().any(|w| q.contains(w)) {
            if feature == "gyro" {
                names.extend(["gyro_x", "gyro_y", "gyro_z"]);
            } else {
                names.push(feature);
            }
        }
    }
    names
}

impl OfflineNarrator {
    pub fn briefing_text(summary: &RunSummary) -> String {
        let f = &summary.stats.features;
        let mut lines = vec![
            format!("- Processed {} telemetry packets.", summary.total_packets),
            format!(
                "- Flagged {} anomalies ({:.1}% of the batch).",
                summary.anomaly_count, summary.anomaly_rate_percent
            ),
            format!(
                "- Baseline battery {:.2} V (min {:.2}, max {:.2}); panel current {:.2} A.",
                f.battery_v.mean, f.battery_v.min, f.battery_v.max, f.panel_i.mean
            ),
            format!(
                "- Baseline temperature {:.1} C (std {:.1}); body rates within {:.3} deg/s.",
                f.temp_c.mean,
                f.temp_c.std,
                rate_bound(f)
            ),
        ];
        if summary.anomaly_count == 0 {
            lines.push("- No packet stood out from the rest of the batch.".to_string());
        } else {
            lines.push(
                "- Review flagged packets for power, thermal and attitude excursions.".to_string(),
            );
        }
        lines.join("\n")
    }

    pub fn actions_text(summary: &RunSummary) -> String {
        let f = &summary.stats.features;
        let mut lines = vec![
            "Key Findings:".to_string(),
            format!(
                "- {} of {} packets flagged ({:.1}%).",
                summary.anomaly_count, summary.total_packets, summary.anomaly_rate_percent
            ),
            format!(
                "- Baseline battery {:.2}-{:.2} V, panel current mean {:.2} A.",
                f.battery_v.min, f.battery_v.max, f.panel_i.mean
            ),
            format!(
                "- Baseline temperature {:.1}-{:.1} C.",
                f.temp_c.min, f.temp_c.max
            ),
            format!("- Baseline body rates within {:.3} deg/s.", rate_bound(f)),
            String::new(),
            "Recommended Checks / Actions:".to_string(),
        ];
        if summary.anomaly_count == 0 {
            lines.extend([
                "- No follow-up required for this batch.".to_string(),
                "- Compare the next run's baseline ranges against these.".to_string(),
                "- Spot-check a few packets in the exported CSV.".to_string(),
            ]);
        } else {
            lines.extend([
                "- Filter the exported CSV on is_anomaly and review flagged packets in time order."
                    .to_string(),
                "- Check flagged battery_v and panel_i values for power drops and SAFE entries."
                    .to_string(),
                "- Compare flagged temp_c values against thermal limits.".to_string(),
                "- Check flagged gyro rates and MANEUVER entries against attitude control logs."
                    .to_string(),
            ]);
        }
        lines.join("\n")
    }

    /// Answers from the context numbers alone: the lines for the features
    /// the question mentions, or all of them.
    pub fn answer_text(question: &str, context: &QueryContext) -> String {
        let wanted = topics(question);
        let mut lines = vec![format!(
            "- {} packets, {} flagged as anomalous.",
            context.total_packets, context.anomaly_count
        )];
        lines.extend(
            context
                .feature_lines()
                .into_iter()
                .filter(|(name, _)| wanted.is_empty() || wanted.contains(name))
                .map(|(_, line)| format!("- {line}")),
        );
        lines.push(
            "- For detail, filter the exported CSV on is_anomaly and plot the fields above."
                .to_string(),
        );
        lines.join("\n")
    }

    pub fn explanation_text(top: &TopAnomaly, stats: &SummaryStats) -> String {
        let p = &top.packet;
        let f = &stats.features;
        let deviation = |value: f32, mean: f64, std: f64| -> String {
            if std > 0.0 {
                format!("{:+.1} sigma", (value as f64 - mean) / std)
            } else {
                "n/a".to_string()
            }
        };
        [
            format!(
                "- Packet {} (t={}) scored {:.3} in mode {}.",
                top.index, p.timestamp, top.anomaly_score, p.mode
            ),
            format!(
                "- battery_v {:.2} V ({}), panel_i {:.2} A ({}).",
                p.battery_v,
                deviation(p.battery_v, f.battery_v.mean, f.battery_v.std),
                p.panel_i,
                deviation(p.panel_i, f.panel_i.mean, f.panel_i.std)
            ),
            format!(
                "- temp_c {:.1} C ({}).",
                p.temp_c,
                deviation(p.temp_c, f.temp_c.mean, f.temp_c.std)
            ),
            format!(
                "- gyro x/y/z {:.3}/{:.3}/{:.3} deg/s.",
                p.gyro_x, p.gyro_y, p.gyro_z
            ),
        ]
        .join("\n")
    }
}

#[async_trait::async_trait]
impl Narrator for OfflineNarrator {
    async fn briefing(&self, summary: &RunSummary) -> Result<String> {
        Ok(Self::briefing_text(summary))
    }

    async fn actions(&self, summary: &RunSummary, _briefing: &str) -> Result<String> {
        Ok(Self::actions_text(summary))
    }

    async fn explain_anomaly(&self, top: &TopAnomaly, stats: &SummaryStats) -> Result<String> {
        Ok(Self::explanation_text(top, stats))
    }

    async fn answer(&self, question: &str, context: &QueryContext) -> Result<String> {
        Ok(Self::answer_text(question, context))
    }
}

/// Narration through an OpenAI-compatible chat completions endpoint.
pub struct OpenAiNarrator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

const BRIEFING_SYSTEM: &str = "You are a mission operations engineer for a CubeSat. \
Summarize nightly telemetry anomaly detection runs in clear, concise language.";

const ACTIONS_SYSTEM: &str = "You are a senior satellite operations engineer helping to create a \
nightly report. Extract key findings and recommend concrete checks or follow-up actions.";

const ANSWER_SYSTEM: &str = "You are assisting with telemetry analysis for a CubeSat. \
You will receive a table schema, a statistics summary and a question. Answer from that information.";

const EXPLAIN_SYSTEM: &str = "You are a satellite telemetry analyst. \
Explain why a single housekeeping packet looks anomalous compared to the baseline.";

impl OpenAiNarrator {
    pub fn from_config(config: &NarratorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} is not set", config.api_key_env))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    async fn chat(&self, system: &str, user: String) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        let resp: Value = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("narrator request failed")?
            .error_for_status()
            .context("narrator returned an error status")?
            .json()
            .await
            .context("narrator response was not JSON")?;

        resp["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .context("narrator response had no message content")
    }
}

#[async_trait::async_trait]
impl Narrator for OpenAiNarrator {
    async fn briefing(&self, summary: &RunSummary) -> Result<String> {
        let user = format!(
            "Here is the summary of the nightly run as JSON:\n{}\n\n\
             Write a mission briefing in 4-7 bullet points, each starting with '- '. \
             Cover packets processed, anomalies found, which subsystems look problematic \
             (power, thermal, attitude) and trends worth investigating. Be factual.",
            serde_json::to_string(summary)?
        );
        self.chat(BRIEFING_SYSTEM, user).await
    }

    async fn explain_anomaly(&self, top: &TopAnomaly, stats: &SummaryStats) -> Result<String> {
        let user = format!(
            "Anomalous packet:\n{}\n\nBaseline statistics:\n{}\n\n\
             Give 3-5 short bullet points starting with '- ' explaining what stands out.",
            serde_json::to_string(top)?,
            serde_json::to_string(stats)?
        );
        self.chat(EXPLAIN_SYSTEM, user).await
    }

    async fn actions(&self, summary: &RunSummary, briefing: &str) -> Result<String> {
        let user = format!(
            "Nightly run summary as JSON:\n{}\n\nMission briefing already written:\n{}\n\n\
             Produce two plain-text sections: 'Key Findings:' followed by 3-6 bullets starting \
             with '- ', then 'Recommended Checks / Actions:' followed by 3-6 bullets starting \
             with '- '. Keep bullets short and specific. No other headings.",
            serde_json::to_string(summary)?,
            briefing
        );
        self.chat(ACTIONS_SYSTEM, user).await
    }

    async fn answer(&self, question: &str, context: &QueryContext) -> Result<String> {
        let user = format!(
            "Table schema:\n{}\n\nContext summary:\n{}\n\nQuestion:\n{}\n\n\
             Answer concisely and, if useful, suggest plots or filters that would help.",
            serde_json::to_string(&context.schema)?,
            context.text(),
            question
        );
        self.chat(ANSWER_SYSTEM, user).await
    }
}
