//! Interfaces to the collaborators around the core: narrative generation,
//! report rendering and voice announcements.
//!
//! The core hands them finished numbers only. Narration is a slow, fallible
//! call made after the run summary is final; its text is never parsed.

pub mod narrator;
pub mod report;
pub mod voice;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::analysis::{QueryContext, SummaryStats, TopAnomaly};
use crate::config::{NarratorBackend, NarratorConfig};
use crate::pipeline::RunSummary;

pub use narrator::{OfflineNarrator, OpenAiNarrator};
pub use report::TextReportWriter;
pub use voice::{announce_run, LogVoice, SilentVoice};

/// Produces free text from run numbers.
#[async_trait::async_trait]
pub trait Narrator: Send + Sync {
    /// Short mission briefing for a completed run.
    async fn briefing(&self, summary: &RunSummary) -> Result<String>;

    /// "Key Findings" and "Recommended Checks / Actions" sections for a
    /// run, given its briefing.
    async fn actions(&self, summary: &RunSummary, briefing: &str) -> Result<String>;

    /// Plain-language explanation of one flagged packet.
    async fn explain_anomaly(&self, top: &TopAnomaly, stats: &SummaryStats) -> Result<String>;

    /// Answer an operator's free-text question about the current dataset.
    async fn answer(&self, question: &str, context: &QueryContext) -> Result<String>;
}

/// The narrated parts of a nightly report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Narrative {
    pub briefing: String,
    pub actions: String,
}

/// Renders a report for a run and returns where it was written.
pub trait ReportWriter: Send + Sync {
    fn write(&self, summary: &RunSummary, narrative: &Narrative, path: &Path) -> Result<PathBuf>;
}

/// Fire-and-forget spoken announcements.
pub trait VoiceNotifier: Send + Sync {
    fn announce(&self, text: &str);
}

/// The set of collaborators a nightly run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub narrator: Arc<dyn Narrator>,
    pub report_writer: Arc<dyn ReportWriter>,
    pub voice: Arc<dyn VoiceNotifier>,
}

impl Collaborators {
    /// Offline narration, text reports, log-only voice.
    pub fn offline() -> Self {
        Self {
            narrator: Arc::new(OfflineNarrator),
            report_writer: Arc::new(TextReportWriter),
            voice: Arc::new(LogVoice),
        }
    }

    /// Collaborators per configuration. An unusable remote narrator
    /// degrades to offline narration.
    pub fn from_config(config: &NarratorConfig) -> Self {
        let mut collaborators = Self::offline();
        if config.backend == NarratorBackend::OpenAi {
            match OpenAiNarrator::from_config(config) {
                Ok(n) => collaborators.narrator = Arc::new(n),
                Err(e) => warn!(error = %e, "remote narrator unavailable, using offline narration"),
            }
        }
        collaborators
    }

    /// Briefing and actions for `summary`. Each part falls back to offline
    /// narration if the narrator fails.
    pub async fn narrate(&self, summary: &RunSummary) -> Narrative {
        let briefing = match self.narrator.briefing(summary).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "narrator failed, using offline briefing");
                OfflineNarrator::briefing_text(summary)
            }
        };
        let actions = match self.narrator.actions(summary, &briefing).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "narrator failed, using offline actions");
                OfflineNarrator::actions_text(summary)
            }
        };
        Narrative { briefing, actions }
    }

    /// Answer `question`, falling back to offline narration.
    pub async fn answer(&self, question: &str, context: &QueryContext) -> String {
        match self.narrator.answer(question, context).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "narrator failed, using offline answer");
                OfflineNarrator::answer_text(question, context)
            }
        }
    }
}
