//! Session state for one user: the selected image, whether an analysis is
//! running and the latest result.
//!
//! All changes go through [`Session::dispatch`], which refuses transitions
//! that would break the single-analysis rule.

use thiserror::Error;
use tracing::{info, warn};

use crate::acquisition::{self, AcquisitionError, ImageFile, UploadedImage};
use crate::analysis::AnalysisResult;
use crate::client::{AnalysisClient, AnalysisError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no image selected")]
    NoImage,
    #[error("an analysis is already in progress")]
    AnalysisInFlight,
    #[error("no analysis is in progress")]
    NotAnalyzing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// User-facing notification (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub description: &'static str,
    pub variant: NoticeVariant,
}

impl Notice {
    pub const INVALID_FILE: Notice = Notice {
        title: "Invalid file type",
        description: "Please upload an image file",
        variant: NoticeVariant::Destructive,
    };
    pub const FILE_TOO_LARGE: Notice = Notice {
        title: "File too large",
        description: "Please upload an image under 10MB",
        variant: NoticeVariant::Destructive,
    };
    pub const UNREADABLE_FILE: Notice = Notice {
        title: "Could not read file",
        description: "Please select another image",
        variant: NoticeVariant::Destructive,
    };
    pub const ANALYSIS_COMPLETE: Notice = Notice {
        title: "Analysis Complete",
        description: "Detection finished successfully!",
        variant: NoticeVariant::Default,
    };
    pub const ANALYSIS_FAILED: Notice = Notice {
        title: "Analysis Failed",
        description: "Something went wrong. Try again.",
        variant: NoticeVariant::Destructive,
    };
}

impl From<&AcquisitionError> for Notice {
    fn from(err: &AcquisitionError) -> Self {
        match err {
            AcquisitionError::InvalidFileType { .. } => Notice::INVALID_FILE,
            AcquisitionError::FileTooLarge { .. } => Notice::FILE_TOO_LARGE,
            AcquisitionError::EmptyFile | AcquisitionError::Io(_) => Notice::UNREADABLE_FILE,
        }
    }
}

#[derive(Debug)]
pub enum Event {
    ImageSelected(UploadedImage),
    ImageCleared,
    AnalysisStarted,
    AnalysisCompleted(Result<AnalysisResult, AnalysisError>),
}

#[derive(Debug, Default)]
pub struct Session {
    image: Option<UploadedImage>,
    analyzing: bool,
    result: Option<AnalysisResult>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> Option<&UploadedImage> {
        self.image.as_ref()
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn can_analyze(&self) -> bool {
        self.image.is_some() && !self.analyzing
    }

    pub fn dispatch(&mut self, event: Event) -> Result<Option<Notice>, SessionError> {
        match event {
            Event::ImageSelected(image) => {
                self.ensure_idle()?;
                self.image = Some(image);
                self.result = None;
                Ok(None)
            }
            Event::ImageCleared => {
                self.ensure_idle()?;
                self.image = None;
                self.result = None;
                Ok(None)
            }
            Event::AnalysisStarted => {
                self.ensure_idle()?;
                if self.image.is_none() {
                    return Err(SessionError::NoImage);
                }
                self.analyzing = true;
                Ok(None)
            }
            Event::AnalysisCompleted(outcome) => {
                if !self.analyzing {
                    return Err(SessionError::NotAnalyzing);
                }
                self.analyzing = false;
                match outcome {
                    Ok(result) => {
                        self.result = Some(result);
                        Ok(Some(Notice::ANALYSIS_COMPLETE))
                    }
                    Err(err) => {
                        warn!("Analysis error: {}", err);
                        Ok(Some(Notice::ANALYSIS_FAILED))
                    }
                }
            }
        }
    }

    /// Validates `file` and makes it the current image. An invalid file leaves
    /// the session untouched and yields a notice.
    pub fn select_file(&mut self, file: ImageFile) -> Result<Option<Notice>, SessionError> {
        self.ensure_idle()?;
        match acquisition::select(file) {
            Ok(image) => self.dispatch(Event::ImageSelected(image)),
            Err(err) => {
                warn!("Rejected file: {}", err);
                Ok(Some(Notice::from(&err)))
            }
        }
    }

    /// Runs one analysis of the current image from start to completion.
    pub async fn analyze_with(
        &mut self,
        client: &AnalysisClient,
    ) -> Result<Option<Notice>, SessionError> {
        self.dispatch(Event::AnalysisStarted)?;
        let Some(image) = self.image.clone() else {
            self.analyzing = false;
            return Err(SessionError::NoImage);
        };
        info!("Analyzing {}", image.name);
        let outcome = client.analyze(&image).await;
        self.dispatch(Event::AnalysisCompleted(outcome))
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.analyzing {
            Err(SessionError::AnalysisInFlight)
        } else {
            Ok(())
        }
    }
}
