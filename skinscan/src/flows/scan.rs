use crate::analysis::{AnalysisError, AnalysisService, validate_image};
use crate::detection::{AnalysisOutcome, DetectionReport};
use crate::history::{HistoryStore, ScanCollection, StoreError};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePayload {
    pub image_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl RoutePayload {
    fn detected(image_uri: String, report: DetectionReport) -> Self {
        Self {
            image_uri,
            detection: Some(report),
            message: None,
            suggestion: None,
        }
    }

    fn no_detection(image_uri: String, message: String, suggestion: String) -> Self {
        Self {
            image_uri,
            detection: None,
            message: Some(message),
            suggestion: Some(suggestion),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanStage {
    Idle,
    CaptureOrUpload,
    Analyzing,
    Detected(RoutePayload),
    NoDetection(RoutePayload),
    Failed(AnalysisError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveState {
    NotSaved,
    Saving,
    Saved { id: String },
    SaveError(StoreError),
}

// Carries the epoch its analysis started under; a completion whose epoch is
// stale lands on a screen that already moved on and is dropped.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    epoch: u64,
    image: PathBuf,
}

impl AnalysisTicket {
    pub fn image(&self) -> &Path {
        &self.image
    }
}

pub struct ScanFlow<C: ScanCollection> {
    analysis: AnalysisService,
    history: HistoryStore<C>,
    stage: ScanStage,
    save_state: SaveState,
    image: Option<PathBuf>,
    epoch: u64,
}

impl<C: ScanCollection> ScanFlow<C> {
    pub fn new(analysis: AnalysisService, history: HistoryStore<C>) -> Self {
        Self {
            analysis,
            history,
            stage: ScanStage::Idle,
            save_state: SaveState::NotSaved,
            image: None,
            epoch: 0,
        }
    }

    pub fn stage(&self) -> &ScanStage {
        &self.stage
    }

    pub fn save_state(&self) -> &SaveState {
        &self.save_state
    }

    pub fn select_image(&mut self, path: PathBuf) {
        self.epoch += 1;
        self.image = Some(path);
        self.stage = ScanStage::CaptureOrUpload;
        self.save_state = SaveState::NotSaved;
    }

    pub fn retake(&mut self) {
        self.epoch += 1;
        self.image = None;
        self.stage = ScanStage::CaptureOrUpload;
        self.save_state = SaveState::NotSaved;
    }

    pub fn leave(&mut self) {
        self.epoch += 1;
        self.image = None;
        self.stage = ScanStage::Idle;
        self.save_state = SaveState::NotSaved;
    }

    pub fn begin_analysis(&mut self) -> Option<AnalysisTicket> {
        if !matches!(
            self.stage,
            ScanStage::CaptureOrUpload | ScanStage::Failed(_)
        ) {
            return None;
        }
        let image = self.image.clone()?;

        self.stage = ScanStage::Analyzing;
        Some(AnalysisTicket {
            epoch: self.epoch,
            image,
        })
    }

    pub fn apply_outcome(
        &mut self,
        ticket: AnalysisTicket,
        result: Result<AnalysisOutcome, AnalysisError>,
    ) {
        if ticket.epoch != self.epoch || !matches!(self.stage, ScanStage::Analyzing) {
            tracing::debug!("dropping analysis result for a screen no longer showing");
            return;
        }

        let image_uri = image_uri(&ticket.image);
        self.stage = match result {
            Ok(AnalysisOutcome::Detected(report)) => {
                ScanStage::Detected(RoutePayload::detected(image_uri, report))
            }
            Ok(AnalysisOutcome::NoDetection {
                message,
                suggestion,
            }) => ScanStage::NoDetection(RoutePayload::no_detection(
                image_uri, message, suggestion,
            )),
            Err(err) => ScanStage::Failed(err),
        };
    }

    pub async fn analyze(&mut self) -> &ScanStage {
        let Some(ticket) = self.begin_analysis() else {
            return &self.stage;
        };

        let result = run_attempt(&self.analysis, ticket.image()).await;
        self.apply_outcome(ticket, result);
        &self.stage
    }

    pub async fn save(&mut self) -> &SaveState {
        let ScanStage::Detected(payload) = &self.stage else {
            return &self.save_state;
        };
        if !matches!(self.save_state, SaveState::NotSaved | SaveState::SaveError(_)) {
            return &self.save_state;
        }
        let Some(report) = payload.detection.as_ref() else {
            return &self.save_state;
        };

        let disease = report.disease.clone();
        let image_uri = payload.image_uri.clone();
        self.save_state = SaveState::Saving;

        self.save_state = match self.history.create(&disease, &image_uri).await {
            Ok(id) => SaveState::Saved { id },
            Err(err) => {
                tracing::warn!(error = %err, "saving scan failed");
                SaveState::SaveError(err)
            }
        };

        &self.save_state
    }
}

async fn run_attempt(
    analysis: &AnalysisService,
    image: &Path,
) -> Result<AnalysisOutcome, AnalysisError> {
    // The file check must pass before any request goes out; the health gate
    // runs before the upload itself.
    validate_image(image)?;
    analysis.ensure_reachable().await?;
    analysis.analyze(image).await
}

fn image_uri(path: &Path) -> String {
    if path.is_absolute() {
        format!("file://{}", path.display())
    } else {
        path.display().to_string()
    }
}
